/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

// The address a memory-overlay symbol aliases: either another symbol,
// resolved by the downstream assembler, or a fixed numeric address.
#[derive(Debug, Clone, PartialEq)]
pub enum AtTarget {
    Name(String),
    Addr(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitValue {
    Number(u32),
    Ref(String),
}

// One entry of a symbol pool. Based and At variants consume no storage
// of their own; CodeBlock is a sealed run of generated instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Variable {
        name: String,
        addr: u32,
        size: u8,
        value: Option<InitValue>,
    },
    AtVariable {
        name: String,
        target: AtTarget,
        size: u8,
        offset: u32,
    },
    BasedVariable {
        name: String,
        base: String,
        size: u8,
    },
    Array {
        name: String,
        addr: u32,
        size: u32,
        elem_size: u8,
        value: Option<Vec<InitValue>>,
    },
    AtArray {
        name: String,
        target: AtTarget,
        size: u32,
        elem_size: u8,
    },
    BasedArray {
        name: String,
        base: String,
        size: u32,
        elem_size: u8,
    },
    BasedStruct {
        name: String,
        base: String,
        size: u32,
        fields: Vec<(String, (u32, u8))>,
    },
    Label {
        name: String,
        addr: u32,
    },
    CodeBlock {
        addr: u32,
        size: u32,
        lines: Vec<String>,
    },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Variable { name, .. }
            | Symbol::AtVariable { name, .. }
            | Symbol::BasedVariable { name, .. }
            | Symbol::Array { name, .. }
            | Symbol::AtArray { name, .. }
            | Symbol::BasedArray { name, .. }
            | Symbol::BasedStruct { name, .. }
            | Symbol::Label { name, .. } => name,
            Symbol::CodeBlock { .. } => "",
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Symbol::Label { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Symbol::Array { .. } | Symbol::AtArray { .. } | Symbol::BasedArray { .. }
        )
    }

    // True for symbols a value expression may name directly.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Symbol::Variable { .. } | Symbol::AtVariable { .. } | Symbol::BasedVariable { .. }
        )
    }

    pub fn elem_size(&self) -> Option<u8> {
        match self {
            Symbol::Array { elem_size, .. }
            | Symbol::AtArray { elem_size, .. }
            | Symbol::BasedArray { elem_size, .. } => Some(*elem_size),
            _ => None,
        }
    }

    pub fn array_size(&self) -> Option<u32> {
        match self {
            Symbol::Array { size, .. }
            | Symbol::AtArray { size, .. }
            | Symbol::BasedArray { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn scalar_size(&self) -> Option<u8> {
        match self {
            Symbol::Variable { size, .. }
            | Symbol::AtVariable { size, .. }
            | Symbol::BasedVariable { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn shift_addr(&mut self, delta: u32) {
        match self {
            Symbol::Variable { addr, .. }
            | Symbol::Array { addr, .. }
            | Symbol::Label { addr, .. }
            | Symbol::CodeBlock { addr, .. } => *addr += delta,
            _ => {}
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Builtin {
    Length,
    Last,
    Low,
    High,
    Double,
    Shr,
    Shl,
    Ror,
    Rol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcInfo {
    pub name: String,
    pub num_args: usize,
    pub ret_size: u8,
    pub arg_names: Vec<String>,
    // Patched as the matching argument declarations are seen in the body.
    pub arg_widths: Vec<Option<u8>>,
}

impl ProcInfo {
    pub fn new(name: String, arg_names: Vec<String>, ret_size: u8) -> Self {
        let num_args = arg_names.len();
        ProcInfo {
            name,
            num_args,
            ret_size,
            arg_names,
            arg_widths: vec![None; num_args],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Procedure {
    User(ProcInfo),
    External(ProcInfo),
    Builtin {
        name: String,
        num_args: usize,
        kind: Builtin,
    },
}

impl Procedure {
    pub fn name(&self) -> &str {
        match self {
            Procedure::User(info) | Procedure::External(info) => &info.name,
            Procedure::Builtin { name, .. } => name,
        }
    }

    pub fn num_args(&self) -> usize {
        match self {
            Procedure::User(info) | Procedure::External(info) => info.num_args,
            Procedure::Builtin { num_args, .. } => *num_args,
        }
    }

    pub fn ret_size(&self) -> u8 {
        match self {
            Procedure::User(info) | Procedure::External(info) => info.ret_size,
            Procedure::Builtin { .. } => 0,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Procedure::External(_))
    }

    pub fn info(&self) -> Option<&ProcInfo> {
        match self {
            Procedure::User(info) | Procedure::External(info) => Some(info),
            Procedure::Builtin { .. } => None,
        }
    }
}
