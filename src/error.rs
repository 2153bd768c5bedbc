// src/error.rs

use thiserror::Error;

/// Errors raised while evaluating a syntax-tree query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("tree is deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Errors surfaced by the analyses and their collaborators.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("change #{index} has neither a source nor a destination")]
    MalformedChange { index: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to encode result: {0}")]
    Encode(String),

    #[error("malformed report: {0}")]
    Decode(String),

    #[error("{0} results cannot be combined")]
    NotMergeable(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
