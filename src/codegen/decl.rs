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

use super::symbol::{AtTarget, InitValue, ProcInfo, Procedure, Symbol};
use super::{Codegen, Resolved};
use crate::ast::{AtSpec, Declaration, InitItem, VarType};
use crate::errors::CompileError;

impl Codegen {
    pub(crate) fn gen_declaration(&mut self, decl: &Declaration) -> Result<(), CompileError> {
        match decl {
            // LITERALLY declarations were expanded before the parse.
            Declaration::Literal { .. } => Ok(()),
            Declaration::Scalar { name, ty } => self.declare_scalar(name, *ty),
            Declaration::ScalarList { names, ty } => {
                for name in names {
                    self.declare_scalar(name, *ty)?;
                }
                Ok(())
            }
            Declaration::ScalarInit { name, ty, value } => self.declare_scalar_init(name, *ty, value),
            Declaration::ScalarAt { name, ty, at } => self.declare_scalar_at(name, *ty, at),
            Declaration::ScalarBased { name, base, ty } => self.declare_scalar_based(name, base, *ty),
            Declaration::ScalarExternal { name, ty } => self.declare_scalar_external(name, *ty),
            Declaration::Array { name, count, ty } => self.declare_array(name, *count, *ty),
            Declaration::ArrayInit {
                name,
                count,
                ty,
                values,
            } => self.declare_array_init(name, *count, *ty, values),
            Declaration::ArrayString { name, ty, values } => {
                self.declare_array_string(name, *ty, values)
            }
            Declaration::ArrayAt {
                name,
                count,
                ty,
                at,
            } => self.declare_array_at(name, *count, *ty, at),
            Declaration::ArrayBased {
                name,
                base,
                count,
                ty,
            } => self.declare_array_based(name, base, *count, *ty),
            Declaration::ArrayExternal { name, count, ty } => {
                self.declare_array_external(name, *count, *ty)
            }
            Declaration::StructBased { name, base, fields } => {
                self.declare_struct_based(name, base, fields)
            }
        }
    }

    fn check_redeclare(&self, name: &str) -> Result<(), CompileError> {
        if self.lookup(name).is_some() {
            return Err(self.err(format!("name {} already defined", name)));
        }
        Ok(())
    }

    // If this variable is an argument of the procedure being declared,
    // record its width on the procedure.
    fn check_args(&mut self, name: &str, size: u8) {
        let Some(current) = self.proc_stack.last().cloned() else {
            return;
        };
        if let Some(Procedure::User(info) | Procedure::External(info)) =
            self.find_proc_mut(&current)
        {
            for n in 0..info.num_args {
                if info.arg_names[n] == name {
                    info.arg_widths[n] = Some(size);
                }
            }
        }
    }

    fn inside_external_proc(&self) -> bool {
        match self.proc_stack.last() {
            Some(name) => matches!(self.find_proc(name), Some(Procedure::External(_))),
            None => false,
        }
    }

    // Resolve a .NAME initialiser to the (possibly mangled) symbol name
    // it denotes; unresolved names pass through for the assembler.
    fn resolve_ref_name(&self, name: &str) -> String {
        match self.lookup(name) {
            Some(Resolved::Sym(sym)) => sym.name().to_string(),
            Some(Resolved::Proc(proc)) => proc.name().to_string(),
            None => name.to_string(),
        }
    }

    fn init_value(&self, item: &InitItem) -> Option<InitValue> {
        match item {
            InitItem::Number(n) => Some(InitValue::Number(*n)),
            InitItem::Ref(name) => Some(InitValue::Ref(self.resolve_ref_name(name))),
            InitItem::Str(_) => None,
        }
    }

    fn declare_scalar(&mut self, name: &str, ty: VarType) -> Result<(), CompileError> {
        let size = ty.width();
        if !self.proc_stack.is_empty() {
            self.check_args(name, size);
        }
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        // arguments of EXTERNAL procedures describe the interface only
        if self.inside_external_proc() {
            return Ok(());
        }
        self.uni_list.push(Symbol::Variable {
            name,
            addr: 0,
            size,
            value: None,
        });
        Ok(())
    }

    fn declare_scalar_init(
        &mut self,
        name: &str,
        ty: VarType,
        value: &InitItem,
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        if ty == VarType::Byte && matches!(value, InitItem::Ref(_)) {
            return Err(self.err("BYTE variables cannot initialize with references"));
        }
        let size = ty.width();
        let value = self
            .init_value(value)
            .ok_or_else(|| self.err(format!("invalid initializer for {}", name)))?;
        self.sym_list.push(Symbol::Variable {
            name,
            addr: self.pc,
            size,
            value: Some(value),
        });
        self.pc += size as u32;
        Ok(())
    }

    fn declare_scalar_at(
        &mut self,
        name: &str,
        ty: VarType,
        at: &AtSpec,
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        let size = ty.width();
        let (target, offset) = match at {
            AtSpec::Number(n) => (AtTarget::Addr(*n), 0),
            AtSpec::Ref(r) => (AtTarget::Name(self.resolve_ref_name(r)), 0),
            AtSpec::Element(arr, index) => {
                let sym = self
                    .lookup_sym(arr)
                    .filter(|s| s.is_array())
                    .ok_or_else(|| self.err(format!("AT target {} not an array", arr)))?;
                let elem_size = sym.elem_size().unwrap_or(1);
                if size != elem_size {
                    self.warn(format!(
                        "AT target {} width different than variable, line {}",
                        arr, self.line
                    ));
                }
                (
                    AtTarget::Name(sym.name().to_string()),
                    *index * elem_size as u32,
                )
            }
        };
        self.sym_list.push(Symbol::AtVariable {
            name,
            target,
            size,
            offset,
        });
        Ok(())
    }

    // The pointer a BASED declaration names must already exist and be
    // an ADDRESS scalar.
    fn resolve_base(&self, base: &str) -> Result<String, CompileError> {
        let sym = match self.lookup(base) {
            Some(Resolved::Sym(sym)) => sym,
            Some(Resolved::Proc(_)) => {
                return Err(self.err(format!("target variable {} not ADDRESS", base)));
            }
            None => {
                return Err(self.err(format!("target variable {} does not exist", base)));
            }
        };
        if sym.scalar_size() != Some(2) {
            return Err(self.err(format!("target variable {} not ADDRESS", base)));
        }
        Ok(sym.name().to_string())
    }

    fn declare_scalar_based(
        &mut self,
        name: &str,
        base: &str,
        ty: VarType,
    ) -> Result<(), CompileError> {
        let size = ty.width();
        if !self.proc_stack.is_empty() {
            self.check_args(name, size);
        }
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        let base = self.resolve_base(base)?;
        self.sym_list.push(Symbol::BasedVariable { name, base, size });
        Ok(())
    }

    fn declare_scalar_external(&mut self, name: &str, ty: VarType) -> Result<(), CompileError> {
        self.check_redeclare(name)?;
        self.sym_list.push(Symbol::AtVariable {
            name: name.to_string(),
            target: AtTarget::Name(name.to_string()),
            size: ty.width(),
            offset: 0,
        });
        Ok(())
    }

    fn declare_array(&mut self, name: &str, count: u32, ty: VarType) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        if count > 0xFFFF {
            return Err(self.err(format!("array {} size too large", name)));
        }
        let elem_size = ty.width();
        self.uni_list.push(Symbol::Array {
            name,
            addr: 0,
            size: count * elem_size as u32,
            elem_size,
            value: None,
        });
        Ok(())
    }

    // Expand string items to one element per character and reject
    // reference initialisers in BYTE data.
    fn array_values(&self, ty: VarType, items: &[InitItem]) -> Result<Vec<InitValue>, CompileError> {
        let mut values = Vec::new();
        for item in items {
            match item {
                InitItem::Number(n) => values.push(InitValue::Number(*n)),
                InitItem::Ref(r) => {
                    if ty == VarType::Byte {
                        return Err(self.err("BYTE variables cannot initialize with references"));
                    }
                    values.push(InitValue::Ref(self.resolve_ref_name(r)));
                }
                InitItem::Str(s) => {
                    for c in s.chars() {
                        values.push(InitValue::Number(c as u32));
                    }
                }
            }
        }
        Ok(values)
    }

    fn declare_array_init(
        &mut self,
        name: &str,
        count: Option<u32>,
        ty: VarType,
        items: &[InitItem],
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        if let Some(count) = count
            && count > 0xFFFF
        {
            return Err(self.err(format!("array {} size too large", name)));
        }
        let elem_size = ty.width();
        let values = self.array_values(ty, items)?;
        let size = count.unwrap_or(values.len() as u32) * elem_size as u32;
        self.sym_list.push(Symbol::Array {
            name,
            addr: self.pc,
            size,
            elem_size,
            value: Some(values),
        });
        self.pc += size;
        Ok(())
    }

    // IDENT(*) TYPE DATA(...): the data sizes the array, characters one
    // byte each, numbers one element each.
    fn declare_array_string(
        &mut self,
        name: &str,
        ty: VarType,
        items: &[InitItem],
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        let elem_size = ty.width();
        let mut size = 0u32;
        let mut values = Vec::new();
        for item in items {
            match item {
                InitItem::Number(n) => {
                    values.push(InitValue::Number(*n));
                    size += elem_size as u32;
                }
                InitItem::Ref(r) => {
                    if ty == VarType::Byte {
                        return Err(self.err("BYTE variables cannot initialize with references"));
                    }
                    values.push(InitValue::Ref(self.resolve_ref_name(r)));
                    size += elem_size as u32;
                }
                InitItem::Str(s) => {
                    for c in s.chars() {
                        values.push(InitValue::Number(c as u32));
                        size += 1;
                    }
                }
            }
        }
        self.sym_list.push(Symbol::Array {
            name,
            addr: self.pc,
            size,
            elem_size,
            value: Some(values),
        });
        self.pc += size;
        Ok(())
    }

    fn declare_array_at(
        &mut self,
        name: &str,
        count: u32,
        ty: VarType,
        at: &AtSpec,
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        let elem_size = ty.width();
        let target = match at {
            AtSpec::Number(n) => AtTarget::Addr(*n),
            AtSpec::Ref(r) => AtTarget::Name(self.resolve_ref_name(r)),
            AtSpec::Element(..) => {
                return Err(self.err(format!("invalid AT target for array {}", name)));
            }
        };
        self.sym_list.push(Symbol::AtArray {
            name,
            target,
            size: count * elem_size as u32,
            elem_size,
        });
        Ok(())
    }

    fn declare_array_based(
        &mut self,
        name: &str,
        base: &str,
        count: u32,
        ty: VarType,
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        let elem_size = ty.width();
        let base = self.resolve_base(base)?;
        self.sym_list.push(Symbol::BasedArray {
            name,
            base,
            size: count * elem_size as u32,
            elem_size,
        });
        Ok(())
    }

    fn declare_array_external(
        &mut self,
        name: &str,
        count: u32,
        ty: VarType,
    ) -> Result<(), CompileError> {
        self.check_redeclare(name)?;
        let elem_size = ty.width();
        self.sym_list.push(Symbol::AtArray {
            name: name.to_string(),
            target: AtTarget::Name(name.to_string()),
            size: count * elem_size as u32,
            elem_size,
        });
        Ok(())
    }

    fn declare_struct_based(
        &mut self,
        name: &str,
        base: &str,
        fields: &[(String, VarType)],
    ) -> Result<(), CompileError> {
        let name = self.scoped_name(name);
        self.check_redeclare(&name)?;
        let base = self.resolve_base(base)?;
        let mut layout = Vec::new();
        let mut offset = 0u32;
        for (fname, fty) in fields {
            let width = fty.width();
            layout.push((fname.clone(), (offset, width)));
            offset += width as u32;
        }
        self.sym_list.push(Symbol::BasedStruct {
            name,
            base,
            size: offset,
            fields: layout,
        });
        Ok(())
    }

    pub(crate) fn gen_proc_decl(
        &mut self,
        name: &str,
        args: &[String],
        ret_size: u8,
        external: bool,
    ) -> Result<(), CompileError> {
        self.check_redeclare(name)?;
        let info = ProcInfo::new(name.to_string(), args.to_vec(), ret_size);
        self.proc_list.push(if external {
            Procedure::External(info)
        } else {
            Procedure::User(info)
        });
        self.proc_stack.push(name.to_string());
        Ok(())
    }
}
