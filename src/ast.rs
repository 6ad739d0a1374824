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

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum VarType {
    Byte,
    Address,
}

impl VarType {
    pub fn width(self) -> u8 {
        match self {
            VarType::Byte => 1,
            VarType::Address => 2,
        }
    }
}

// A single entry in a DATA(...) or .(...) initialiser list.
#[derive(Debug, Clone, PartialEq)]
pub enum InitItem {
    Number(u32),
    Ref(String),
    Str(String),
}

// The target of an AT(...) clause.
#[derive(Debug, Clone, PartialEq)]
pub enum AtSpec {
    Number(u32),
    Ref(String),
    Element(String, u32), // AT(.ARR(n))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Literal {
        name: String,
        text: String,
    },
    Scalar {
        name: String,
        ty: VarType,
    },
    ScalarList {
        names: Vec<String>,
        ty: VarType,
    },
    ScalarInit {
        name: String,
        ty: VarType,
        value: InitItem,
    },
    ScalarAt {
        name: String,
        ty: VarType,
        at: AtSpec,
    },
    ScalarBased {
        name: String,
        base: String,
        ty: VarType,
    },
    ScalarExternal {
        name: String,
        ty: VarType,
    },
    Array {
        name: String,
        count: u32,
        ty: VarType,
    },
    // count is None for the IDENT(v1,v2,...) TYPE form, where the
    // initialiser list itself fixes the element count.
    ArrayInit {
        name: String,
        count: Option<u32>,
        ty: VarType,
        values: Vec<InitItem>,
    },
    // IDENT(*) TYPE DATA(...): sized by its data, strings one byte per char.
    ArrayString {
        name: String,
        ty: VarType,
        values: Vec<InitItem>,
    },
    ArrayAt {
        name: String,
        count: u32,
        ty: VarType,
        at: AtSpec,
    },
    ArrayBased {
        name: String,
        base: String,
        count: u32,
        ty: VarType,
    },
    ArrayExternal {
        name: String,
        count: u32,
        ty: VarType,
    },
    StructBased {
        name: String,
        base: String,
        fields: Vec<(String, VarType)>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefTarget {
    Name(String),
    Inline(Vec<InitItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(u32),
    // A bare identifier: a scalar load, a flag pseudo-variable, or a
    // zero-argument procedure call, resolved against the symbol table.
    Name(String),
    // IDENT(expr): array element access or a one-argument call.
    NameParen(String, Box<Expr>),
    Call2(String, Box<Expr>, Box<Expr>),
    CallN(String, Vec<Expr>),
    Ref {
        target: RefTarget,
        index: Option<Box<Expr>>,
    },
    Field(String, String),
    Assign(String, Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Scalar(String),
    Element(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Declare(Vec<Declaration>),
    ProcDecl {
        name: String,
        args: Vec<String>,
        ret: Option<VarType>,
        external: bool,
    },
    EndProc {
        name: String,
    },
    Label(String),
    Do,
    DoWhile(Expr),
    DoCase(Expr),
    DoTo {
        var: String,
        from: Expr,
        to: Expr,
        by: Option<Expr>,
    },
    End,
    Goto(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Return(Option<Expr>),
    Assign {
        targets: Vec<AssignTarget>,
        value: Expr,
    },
    If {
        cond: Expr,
        body: Box<Statement>,
    },
    Else {
        body: Box<Statement>,
    },
}
