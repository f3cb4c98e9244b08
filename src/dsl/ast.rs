//! Abstract Syntax Tree types for the netlist language.

use crate::circuit::Model;

/// Complete AST representation of a parsed netlist.
#[derive(Debug, Clone, Default)]
pub struct CircuitAst {
    /// Title from `.title`
    pub title: Option<String>,
    /// Element lines in netlist order
    pub elements: Vec<ElementDef>,
    /// `.param` definitions in netlist order
    pub params: Vec<ParamDef>,
}

impl CircuitAst {
    /// Create a new empty AST.
    pub fn new() -> Self {
        Self::default()
    }
}

/// An element line.
///
/// Values are kept as text; they are converted to expressions when the
/// circuit is built so that a malformed value becomes a circuit error
/// instead of a parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDef {
    /// Reference designator
    pub refdes: String,
    /// Model, explicit or derived from the designator prefix
    pub model: Model,
    /// Connected node names
    pub nodes: Vec<String>,
    /// Referenced elements (`K` only)
    pub refs: Vec<String>,
    /// Positional value text
    pub value: Option<String>,
    /// `key=value` parameters
    pub params: Vec<(String, String)>,
    /// Source line number for error reporting
    pub line: usize,
}

/// A `.param name=value` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Value text
    pub value: String,
    /// Source line number
    pub line: usize,
}
