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

use crate::ast::*;
use crate::errors::CompileError;
use crate::parser::Rule;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use std::sync::LazyLock;

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    // Lowest precedence first, per the source language:
    // OR < AND < NOT < relationals < additive < multiplicative.
    PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op))
        .op(Op::infix(Rule::eq_op, Assoc::Left)
            | Op::infix(Rule::ne_op, Assoc::Left)
            | Op::infix(Rule::lt_op, Assoc::Left)
            | Op::infix(Rule::gt_op, Assoc::Left)
            | Op::infix(Rule::le_op, Assoc::Left)
            | Op::infix(Rule::ge_op, Assoc::Left))
        .op(Op::infix(Rule::add_op, Assoc::Left) | Op::infix(Rule::sub_op, Assoc::Left))
        .op(Op::infix(Rule::mul_op, Assoc::Left)
            | Op::infix(Rule::div_op, Assoc::Left)
            | Op::infix(Rule::mod_op, Assoc::Left))
});

// Identifiers are case-insensitive and may contain $ separators.
fn normalize(name: &str) -> String {
    name.replace('$', "").to_ascii_uppercase()
}

fn string_body(pair: &Pair<Rule>) -> String {
    let s = pair.as_str();
    s[1..s.len() - 1].to_string()
}

fn build_number(pair: Pair<Rule>) -> Result<u32, CompileError> {
    let line = pair.line_col().0;
    let inner = pair.into_inner().next().unwrap();
    let text = inner.as_str().replace('$', "");
    let parsed = match inner.as_rule() {
        Rule::hex_number => u32::from_str_radix(&text[..text.len() - 1], 16),
        Rule::bin_number => u32::from_str_radix(&text[..text.len() - 1], 2),
        Rule::dec_number => text.parse::<u32>(),
        _ => unreachable!(),
    };
    parsed.map_err(|_| CompileError::at(line, format!("invalid number {}", text)))
}

fn build_var_type(pair: Pair<Rule>) -> VarType {
    match pair.into_inner().next().unwrap().as_rule() {
        Rule::kw_byte => VarType::Byte,
        _ => VarType::Address,
    }
}

fn build_init_item(pair: Pair<Rule>) -> Result<InitItem, CompileError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::number => Ok(InitItem::Number(build_number(inner)?)),
        Rule::ref_literal => {
            let name = inner.into_inner().next().unwrap();
            Ok(InitItem::Ref(normalize(name.as_str())))
        }
        Rule::string => Ok(InitItem::Str(string_body(&inner))),
        _ => unreachable!(),
    }
}

fn build_init_list(pair: Pair<Rule>) -> Result<Vec<InitItem>, CompileError> {
    pair.into_inner().map(build_init_item).collect()
}

// A single scalar initialiser: a one-character string is its character
// code, longer strings are not scalar data.
fn scalar_init_item(item: InitItem, line: usize) -> Result<InitItem, CompileError> {
    match item {
        InitItem::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(InitItem::Number(c as u32)),
                _ => Err(CompileError::at(line, "invalid scalar initializer")),
            }
        }
        other => Ok(other),
    }
}

fn build_at_spec(pair: Pair<Rule>, line: usize) -> Result<AtSpec, CompileError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::at_element => {
            let mut parts = inner.into_inner();
            let name = normalize(parts.next().unwrap().as_str());
            let index = build_number(parts.next().unwrap())?;
            Ok(AtSpec::Element(name, index))
        }
        Rule::init_item => match scalar_init_item(build_init_item(inner)?, line)? {
            InitItem::Number(n) => Ok(AtSpec::Number(n)),
            InitItem::Ref(name) => Ok(AtSpec::Ref(name)),
            InitItem::Str(_) => Err(CompileError::at(line, "invalid AT target")),
        },
        _ => unreachable!(),
    }
}

enum DeclSuffix {
    Data(Vec<InitItem>),
    At(AtSpec),
    External,
}

fn build_decl_suffix(pair: Pair<Rule>, line: usize) -> Result<DeclSuffix, CompileError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::data_suffix => {
            let list = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::init_list)
                .unwrap();
            Ok(DeclSuffix::Data(build_init_list(list)?))
        }
        Rule::at_suffix => {
            let spec = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::at_spec)
                .unwrap();
            Ok(DeclSuffix::At(build_at_spec(spec, line)?))
        }
        Rule::ext_suffix => Ok(DeclSuffix::External),
        _ => unreachable!(),
    }
}

fn build_declaration(pair: Pair<Rule>) -> Result<Declaration, CompileError> {
    let line = pair.line_col().0;
    let item = pair.into_inner().next().unwrap();
    let rule = item.as_rule();
    let parts: Vec<Pair<Rule>> = item.into_inner().collect();

    match rule {
        Rule::lit_decl => Ok(Declaration::Literal {
            name: normalize(parts[0].as_str()),
            text: string_body(&parts[2]),
        }),
        Rule::struct_based_decl => {
            let name = normalize(parts[0].as_str());
            let base = normalize(parts[2].as_str());
            let mut fields = Vec::new();
            for field in parts.into_iter().filter(|p| p.as_rule() == Rule::struct_field) {
                let mut inner = field.into_inner();
                let fname = normalize(inner.next().unwrap().as_str());
                let fty = build_var_type(inner.next().unwrap());
                fields.push((fname, fty));
            }
            Ok(Declaration::StructBased { name, base, fields })
        }
        Rule::array_based_decl => Ok(Declaration::ArrayBased {
            name: normalize(parts[0].as_str()),
            base: normalize(parts[2].as_str()),
            count: build_number(parts[3].clone())?,
            ty: build_var_type(parts[4].clone()),
        }),
        Rule::scalar_based_decl => Ok(Declaration::ScalarBased {
            name: normalize(parts[0].as_str()),
            base: normalize(parts[2].as_str()),
            ty: build_var_type(parts[3].clone()),
        }),
        Rule::scalar_list_decl => {
            let ty = build_var_type(parts.last().unwrap().clone());
            let names = parts
                .iter()
                .filter(|p| p.as_rule() == Rule::ident)
                .map(|p| normalize(p.as_str()))
                .collect();
            Ok(Declaration::ScalarList { names, ty })
        }
        Rule::string_decl => {
            let name = normalize(parts[0].as_str());
            let ty = parts
                .iter()
                .find(|p| p.as_rule() == Rule::var_type)
                .unwrap()
                .clone();
            let list = parts
                .iter()
                .find(|p| p.as_rule() == Rule::init_list)
                .unwrap()
                .clone();
            Ok(Declaration::ArrayString {
                name,
                ty: build_var_type(ty),
                values: build_init_list(list)?,
            })
        }
        Rule::array_decl => build_array_decl(parts, line),
        Rule::scalar_decl => build_scalar_decl(parts, line),
        _ => unreachable!(),
    }
}

fn build_array_decl(parts: Vec<Pair<Rule>>, line: usize) -> Result<Declaration, CompileError> {
    let name = normalize(parts[0].as_str());
    let items = build_init_list(parts[1].clone())?;
    let ty = build_var_type(parts[2].clone());
    let suffix = match parts.get(3) {
        Some(p) => Some(build_decl_suffix(p.clone(), line)?),
        None => None,
    };

    // A lone number inside the parentheses is an element count;
    // anything else is inline initialiser data.
    let lone_count = match items.as_slice() {
        [InitItem::Number(n)] => Some(*n),
        _ => None,
    };

    match suffix {
        None => match lone_count {
            Some(count) => Ok(Declaration::Array { name, count, ty }),
            None => Ok(Declaration::ArrayInit {
                name,
                count: None,
                ty,
                values: items,
            }),
        },
        Some(DeclSuffix::Data(values)) => {
            let count = lone_count
                .ok_or_else(|| CompileError::at(line, format!("invalid declaration of {}", name)))?;
            Ok(Declaration::ArrayInit {
                name,
                count: Some(count),
                ty,
                values,
            })
        }
        Some(DeclSuffix::At(at)) => {
            let count = lone_count
                .ok_or_else(|| CompileError::at(line, format!("invalid declaration of {}", name)))?;
            Ok(Declaration::ArrayAt {
                name,
                count,
                ty,
                at,
            })
        }
        Some(DeclSuffix::External) => {
            let count = lone_count
                .ok_or_else(|| CompileError::at(line, format!("invalid declaration of {}", name)))?;
            Ok(Declaration::ArrayExternal { name, count, ty })
        }
    }
}

fn build_scalar_decl(parts: Vec<Pair<Rule>>, line: usize) -> Result<Declaration, CompileError> {
    let name = normalize(parts[0].as_str());
    let ty = build_var_type(parts[1].clone());
    let suffix = match parts.get(2) {
        Some(p) => Some(build_decl_suffix(p.clone(), line)?),
        None => None,
    };

    match suffix {
        None => Ok(Declaration::Scalar { name, ty }),
        Some(DeclSuffix::Data(mut values)) => {
            if values.len() != 1 {
                return Err(CompileError::at(
                    line,
                    format!("invalid initializer for {}", name),
                ));
            }
            let value = scalar_init_item(values.remove(0), line)?;
            Ok(Declaration::ScalarInit { name, ty, value })
        }
        Some(DeclSuffix::At(at)) => Ok(Declaration::ScalarAt { name, ty, at }),
        Some(DeclSuffix::External) => Ok(Declaration::ScalarExternal { name, ty }),
    }
}

// ------------- expressions -------------

pub fn build_expr(pair: Pair<Rule>) -> Result<Expr, CompileError> {
    PRATT
        .map_primary(build_primary)
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not_op => Ok(Expr::Not(Box::new(rhs?))),
            _ => unreachable!(),
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or_op => BinOp::Or,
                Rule::and_op => BinOp::And,
                Rule::eq_op => BinOp::Eq,
                Rule::ne_op => BinOp::Ne,
                Rule::lt_op => BinOp::Lt,
                Rule::gt_op => BinOp::Gt,
                Rule::le_op => BinOp::Le,
                Rule::ge_op => BinOp::Ge,
                Rule::add_op => BinOp::Add,
                Rule::sub_op => BinOp::Sub,
                Rule::mul_op => BinOp::Mul,
                Rule::div_op => BinOp::Div,
                Rule::mod_op => BinOp::Mod,
                _ => unreachable!(),
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pair.into_inner())
}

fn build_primary(pair: Pair<Rule>) -> Result<Expr, CompileError> {
    let line = pair.line_col().0;
    match pair.as_rule() {
        Rule::number => Ok(Expr::Number(build_number(pair)?)),
        Rule::string => {
            let body = string_body(&pair);
            let mut chars = body.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Expr::Number(c as u32)),
                _ => Err(CompileError::at(
                    line,
                    "string literal not allowed in expression",
                )),
            }
        }
        Rule::ident => Ok(Expr::Name(normalize(pair.as_str()))),
        Rule::inplace_assign => {
            let mut inner = pair.into_inner();
            let name = normalize(inner.next().unwrap().as_str());
            let value = build_expr(inner.next().unwrap())?;
            Ok(Expr::Assign(name, Box::new(value)))
        }
        Rule::call_expr => {
            let mut inner = pair.into_inner();
            let name = normalize(inner.next().unwrap().as_str());
            let args: Vec<Expr> = inner.map(build_expr).collect::<Result<_, _>>()?;
            match args.len() {
                1 => Ok(Expr::NameParen(
                    name,
                    Box::new(args.into_iter().next().unwrap()),
                )),
                2 => {
                    let mut it = args.into_iter();
                    Ok(Expr::Call2(
                        name,
                        Box::new(it.next().unwrap()),
                        Box::new(it.next().unwrap()),
                    ))
                }
                _ => Ok(Expr::CallN(name, args)),
            }
        }
        Rule::struct_access => {
            let mut inner = pair.into_inner();
            let name = normalize(inner.next().unwrap().as_str());
            let field = normalize(inner.next().unwrap().as_str());
            Ok(Expr::Field(name, field))
        }
        Rule::reference => {
            let mut target = None;
            let mut index = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::ident => target = Some(RefTarget::Name(normalize(p.as_str()))),
                    Rule::ref_inline => {
                        let items: Vec<InitItem> = p
                            .into_inner()
                            .map(|item| {
                                let inner = item.into_inner().next().unwrap();
                                match inner.as_rule() {
                                    Rule::number => Ok(InitItem::Number(build_number(inner)?)),
                                    Rule::string => Ok(InitItem::Str(string_body(&inner))),
                                    _ => unreachable!(),
                                }
                            })
                            .collect::<Result<_, CompileError>>()?;
                        target = Some(RefTarget::Inline(items));
                    }
                    Rule::ref_index => {
                        index = Some(Box::new(build_expr(p.into_inner().next().unwrap())?));
                    }
                    _ => {}
                }
            }
            Ok(Expr::Ref {
                target: target.unwrap(),
                index,
            })
        }
        Rule::paren_expr => build_expr(pair.into_inner().next().unwrap()),
        _ => unreachable!(),
    }
}

// ------------- statements -------------

pub fn build_statement(pair: Pair<Rule>) -> Result<Statement, CompileError> {
    let line = pair.line_col().0;
    let rule = pair.as_rule();

    let kind = match rule {
        Rule::declare_statement => {
            let items: Vec<Declaration> = pair
                .into_inner()
                .filter(|p| p.as_rule() == Rule::declare_item)
                .map(build_declaration)
                .collect::<Result<_, _>>()?;
            StmtKind::Declare(items)
        }
        Rule::proc_decl => {
            let mut name = String::new();
            let mut args = Vec::new();
            let mut ret = None;
            let mut external = false;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::ident => name = normalize(p.as_str()),
                    Rule::proc_args => {
                        args = p.into_inner().map(|a| normalize(a.as_str())).collect();
                    }
                    Rule::var_type => ret = Some(build_var_type(p)),
                    Rule::kw_external => external = true,
                    _ => {}
                }
            }
            if args.len() > 3 {
                return Err(CompileError::at(
                    line,
                    format!("procedure {} takes too many arguments", name),
                ));
            }
            StmtKind::ProcDecl {
                name,
                args,
                ret,
                external,
            }
        }
        Rule::end_proc => {
            let name = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::ident)
                .unwrap();
            StmtKind::EndProc {
                name: normalize(name.as_str()),
            }
        }
        Rule::label_statement => {
            let name = pair.into_inner().next().unwrap();
            StmtKind::Label(normalize(name.as_str()))
        }
        Rule::end_statement => StmtKind::End,
        Rule::goto_statement => {
            let name = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::ident)
                .unwrap();
            StmtKind::Goto(normalize(name.as_str()))
        }
        Rule::call_statement => {
            let mut name = String::new();
            let mut args = Vec::new();
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::ident => name = normalize(p.as_str()),
                    Rule::call_args => {
                        args = p.into_inner().map(build_expr).collect::<Result<_, _>>()?;
                    }
                    _ => {}
                }
            }
            StmtKind::Call { name, args }
        }
        Rule::return_statement => {
            let value = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::expr)
                .map(build_expr)
                .transpose()?;
            StmtKind::Return(value)
        }
        Rule::do_statement => StmtKind::Do,
        Rule::do_while_statement => {
            let cond = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::expr)
                .unwrap();
            StmtKind::DoWhile(build_expr(cond)?)
        }
        Rule::do_case_statement => {
            let selector = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::expr)
                .unwrap();
            StmtKind::DoCase(build_expr(selector)?)
        }
        Rule::do_to_statement => {
            let mut var = String::new();
            let mut exprs = Vec::new();
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::ident => var = normalize(p.as_str()),
                    Rule::expr => exprs.push(build_expr(p)?),
                    _ => {}
                }
            }
            let mut it = exprs.into_iter();
            let from = it.next().unwrap();
            let to = it.next().unwrap();
            StmtKind::DoTo {
                var,
                from,
                to,
                by: it.next(),
            }
        }
        Rule::if_statement => {
            let mut cond = None;
            let mut body = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::expr => cond = Some(build_expr(p)?),
                    Rule::code_statement => {
                        body = Some(build_statement(p.into_inner().next().unwrap())?);
                    }
                    _ => {}
                }
            }
            StmtKind::If {
                cond: cond.unwrap(),
                body: Box::new(body.unwrap()),
            }
        }
        Rule::else_statement => {
            let body = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::code_statement)
                .unwrap();
            StmtKind::Else {
                body: Box::new(build_statement(body.into_inner().next().unwrap())?),
            }
        }
        Rule::assign_statement => {
            let mut targets = Vec::new();
            let mut value = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::assign_target => {
                        let mut inner = p.into_inner();
                        let name = normalize(inner.next().unwrap().as_str());
                        match inner.next() {
                            Some(idx) => {
                                targets.push(AssignTarget::Element(name, build_expr(idx)?));
                            }
                            None => targets.push(AssignTarget::Scalar(name)),
                        }
                    }
                    Rule::expr => value = Some(build_expr(p)?),
                    _ => {}
                }
            }
            StmtKind::Assign {
                targets,
                value: value.unwrap(),
            }
        }
        _ => unreachable!(),
    };

    Ok(Statement { line, kind })
}
