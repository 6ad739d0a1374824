use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    #[error("Syntax Error: {0}")]
    PestError(#[from] Box<pest::error::Error<crate::parser::Rule>>),

    #[error("Semantic Error on line {line}: {reason}")]
    SemanticError { line: usize, reason: String },

    #[error("Semantic Error: {reason}")]
    SemanticErrorNoLine { reason: String },
}

impl CompileError {
    pub fn at(line: usize, reason: impl Into<String>) -> Self {
        CompileError::SemanticError {
            line,
            reason: reason.into(),
        }
    }

    pub fn nowhere(reason: impl Into<String>) -> Self {
        CompileError::SemanticErrorNoLine {
            reason: reason.into(),
        }
    }
}
