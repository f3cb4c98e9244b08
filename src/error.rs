//! Error types for the Symna analysis engine.
//!
//! This module provides a unified error type [`SymnaError`] that covers
//! netlist parsing, circuit construction, instruction validation and the
//! symbolic computations themselves. Failures of the external computer
//! algebra system have their own type ([`crate::cas::CasError`]) because
//! callers always convert them into an explicit fallback or an
//! "unavailable" result instead of propagating them.

use thiserror::Error;

use crate::cas::CasError;

/// Result type alias using [`SymnaError`].
pub type Result<T> = std::result::Result<T, SymnaError>;

/// Unified error type for all Symna operations.
#[derive(Error, Debug)]
pub enum SymnaError {
    // ============ Netlist Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Malformed symbolic expression
    #[error("Invalid expression '{text}': {message}")]
    ExpressionError { text: String, message: String },

    // ============ Circuit Errors ============
    /// The circuit carries structural errors and cannot be analysed
    #[error("Circuit has {count} error(s); analysis skipped")]
    CircuitErrors { count: usize },

    /// Element not found in circuit
    #[error("Element '{name}' not found in circuit")]
    ElementNotFound { name: String },

    /// Dependent variable (node voltage or branch current) not found
    #[error("Unknown dependent variable '{name}'")]
    UnknownVariable { name: String },

    /// Independent source not found or not usable as excitation
    #[error("Unknown independent source '{name}'")]
    UnknownSource { name: String },

    // ============ Instruction Errors ============
    /// The requested combination of data type, gain type, source and
    /// detector cannot be computed
    #[error("Invalid instruction: {message}")]
    InvalidInstruction { message: String },

    /// Stepping specification is inconsistent
    #[error("Invalid step specification: {message}")]
    InvalidStep { message: String },

    /// The element selected as loop-gain reference is not a controlled source
    #[error("Element '{name}' cannot be used as loop-gain reference (model {model})")]
    InvalidLoopGainReference { name: String, model: String },

    // ============ Computation Errors ============
    /// Expression still contains symbols where a number was required
    #[error("Expression '{expr}' is not numeric")]
    NotNumeric { expr: String },

    /// Expression is not a polynomial in the requested variable
    #[error("Expression is not a polynomial in '{var}': {expr}")]
    NotPolynomial { var: String, expr: String },

    /// Matrix is singular
    #[error("Singular matrix - the network has no unique solution")]
    SingularMatrix,

    /// Failure reported by the symbolic backend
    #[error(transparent)]
    Cas(#[from] CasError),

    // ============ I/O Errors ============
    /// Error reading netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SymnaError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create an expression error
    pub fn expression(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExpressionError {
            text: text.into(),
            message: message.into(),
        }
    }

    /// Create an invalid instruction error
    pub fn invalid_instruction(message: impl Into<String>) -> Self {
        Self::InvalidInstruction {
            message: message.into(),
        }
    }

    /// Create an invalid step error
    pub fn invalid_step(message: impl Into<String>) -> Self {
        Self::InvalidStep {
            message: message.into(),
        }
    }
}
