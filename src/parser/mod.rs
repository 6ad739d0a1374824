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

mod builder;
mod literals;

use crate::ast::Statement;
use crate::errors::CompileError;
use pest::Parser;
use pest_derive::Parser;

pub use literals::expand_literals;

// Derive the parser from our grammar file.
#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct PlmParser;

// Main parsing function that takes the entire source code string and
// produces the flat statement stream consumed by the code generator.
pub fn parse_source(source: &str) -> Result<Vec<Statement>, CompileError> {
    let pairs = PlmParser::parse(Rule::program, source).map_err(Box::new)?;
    let mut stmts = Vec::new();

    for pair in pairs {
        if pair.as_rule() != Rule::program {
            continue;
        }
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::statement {
                let stmt_pair = inner.into_inner().next().unwrap();
                stmts.push(builder::build_statement(stmt_pair)?);
            }
        }
    }

    Ok(stmts)
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn parse_one(source: &str) -> Statement {
        let stmts = parse_source(source).unwrap();
        assert_eq!(stmts.len(), 1);
        stmts.into_iter().next().unwrap()
    }

    #[test]
    fn test_parse_declare_scalar() {
        let stmt = parse_one("DECLARE X BYTE;\n");
        assert_eq!(
            stmt.kind,
            StmtKind::Declare(vec![Declaration::Scalar {
                name: "X".to_string(),
                ty: VarType::Byte,
            }])
        );
    }

    #[test]
    fn test_parse_declare_list() {
        let stmt = parse_one("DECLARE (A, B, C) ADDRESS;\n");
        assert_eq!(
            stmt.kind,
            StmtKind::Declare(vec![Declaration::ScalarList {
                names: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                ty: VarType::Address,
            }])
        );
    }

    #[test]
    fn test_parse_array_data() {
        let stmt = parse_one("DECLARE P(4) BYTE DATA(1,2,3,4);\n");
        assert_eq!(
            stmt.kind,
            StmtKind::Declare(vec![Declaration::ArrayInit {
                name: "P".to_string(),
                count: Some(4),
                ty: VarType::Byte,
                values: vec![
                    InitItem::Number(1),
                    InitItem::Number(2),
                    InitItem::Number(3),
                    InitItem::Number(4),
                ],
            }])
        );
    }

    #[test]
    fn test_parse_uninit_array_single_count() {
        // A single number in parentheses is an element count, not data.
        let stmt = parse_one("DECLARE BUF(5) BYTE;\n");
        assert_eq!(
            stmt.kind,
            StmtKind::Declare(vec![Declaration::Array {
                name: "BUF".to_string(),
                count: 5,
                ty: VarType::Byte,
            }])
        );
    }

    #[test]
    fn test_parse_assignment_expr() {
        let stmt = parse_one("X = A + B * 2;\n");
        match stmt.kind {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets, vec![AssignTarget::Scalar("X".to_string())]);
                assert_eq!(
                    value,
                    Expr::Binary(
                        BinOp::Add,
                        Box::new(Expr::Name("A".to_string())),
                        Box::new(Expr::Binary(
                            BinOp::Mul,
                            Box::new(Expr::Name("B".to_string())),
                            Box::new(Expr::Number(2)),
                        )),
                    )
                );
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_numbers() {
        let stmt = parse_one("X = 0FFH + 101B + 10;\n");
        match stmt.kind {
            StmtKind::Assign { value, .. } => {
                assert_eq!(
                    value,
                    Expr::Binary(
                        BinOp::Add,
                        Box::new(Expr::Binary(
                            BinOp::Add,
                            Box::new(Expr::Number(0xFF)),
                            Box::new(Expr::Number(0b101)),
                        )),
                        Box::new(Expr::Number(10)),
                    )
                );
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_dollar_stripped() {
        let stmt = parse_one("DECLARE IN$BUF(10) BYTE;\n");
        assert_eq!(
            stmt.kind,
            StmtKind::Declare(vec![Declaration::Array {
                name: "INBUF".to_string(),
                count: 10,
                ty: VarType::Byte,
            }])
        );
    }

    #[test]
    fn test_keyword_prefix_identifier() {
        // DOI must lex as one identifier, not DO followed by I.
        let stmt = parse_one("DOI = 1;\n");
        match stmt.kind {
            StmtKind::Assign { targets, .. } => {
                assert_eq!(targets, vec![AssignTarget::Scalar("DOI".to_string())]);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_do_to_by() {
        let stmt = parse_one("DO I = 1 TO 10 BY 2;\n");
        assert_eq!(
            stmt.kind,
            StmtKind::DoTo {
                var: "I".to_string(),
                from: Expr::Number(1),
                to: Expr::Number(10),
                by: Some(Expr::Number(2)),
            }
        );
    }

    #[test]
    fn test_parse_if_then_nested() {
        let stmt = parse_one("IF X < 2 THEN CALL F(X);\n");
        match stmt.kind {
            StmtKind::If { cond, body } => {
                assert_eq!(
                    cond,
                    Expr::Binary(
                        BinOp::Lt,
                        Box::new(Expr::Name("X".to_string())),
                        Box::new(Expr::Number(2)),
                    )
                );
                assert_eq!(
                    body.kind,
                    StmtKind::Call {
                        name: "F".to_string(),
                        args: vec![Expr::Name("X".to_string())],
                    }
                );
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_procedure_decl() {
        let stmt = parse_one("SUM: PROCEDURE (A, B) ADDRESS;\n");
        assert_eq!(
            stmt.kind,
            StmtKind::ProcDecl {
                name: "SUM".to_string(),
                args: vec!["A".to_string(), "B".to_string()],
                ret: Some(VarType::Address),
                external: false,
            }
        );
    }

    #[test]
    fn test_parse_reference_inline() {
        let stmt = parse_one("P = .('ABC', 0DH);\n");
        match stmt.kind {
            StmtKind::Assign { value, .. } => {
                assert_eq!(
                    value,
                    Expr::Ref {
                        target: RefTarget::Inline(vec![
                            InitItem::Str("ABC".to_string()),
                            InitItem::Number(0x0D),
                        ]),
                        index: None,
                    }
                );
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_char_literal_as_number() {
        let stmt = parse_one("X = 'A';\n");
        match stmt.kind {
            StmtKind::Assign { value, .. } => assert_eq!(value, Expr::Number(0x41)),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_comment_skipped() {
        let stmt = parse_one("/* set the flag */ X = 1;\n");
        assert!(matches!(stmt.kind, StmtKind::Assign { .. }));
    }
}
