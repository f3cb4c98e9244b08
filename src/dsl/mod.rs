//! Netlist language for circuit descriptions.
//!
//! This module provides a small SPICE-like, line-oriented language that
//! produces an already-expanded circuit.
//!
//! # Grammar Overview
//!
//! ```text
//! netlist     = { line }
//! line        = comment | directive | element | empty
//! comment     = ('#' | ';') { any_char } | '*' (at column 1) { any_char }
//! directive   = ".title" text | ".param" { name '=' value } | ".end"
//! element     = refdes connection+ [model] [value] { key '=' value }
//!
//! connection  = node | refdes          (K elements reference inductors)
//! model       = "C" | "L" | "R" | "r" | "V" | "I" | "E" | "EZ" | "F" | "G"
//!             | "g" | "H" | "HZ" | "T" | "W" | "K" | "N"
//! value       = number [unit_suffix] | identifier | '{' expression '}'
//! unit_suffix = 'f' | 'p' | 'n' | 'u' | 'm' | 'k' | "meg" | 'M' | 'G' | 'T'
//! ```
//!
//! Model keywords are case-sensitive. Without an explicit model the first
//! letter of the designator selects it (`R` → conductance resistor).
//! Elements without a value take the symbol named after their designator.
//! Node `0` (or `GND`) is ground.
//!
//! # Node order
//!
//! | Model | Nodes |
//! |-------|-------|
//! | C, L, R, r, V, I | `n+ n-` |
//! | E, EZ, F, G, g, H, HZ, T, W, N | `out+ out- in+ in-` |
//! | K | `L_a L_b` (element references) |
//!
//! # Example
//!
//! ```text
//! .title Non-inverting amplifier
//! .param Rf=9k Rg=1k
//! V1  in  0    1 dc=1 noise=4e-18
//! E1  out 0    in fb  {A0/(1+s/wp)}
//! R1  out fb   Rf
//! R2  fb  0    Rg dcvar=1e-4
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

use crate::circuit::Circuit;
use crate::error::Result;

/// Parse a netlist string into an AST.
pub fn parse(input: &str) -> Result<CircuitAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer);
    parser.parse()
}

/// Parse a netlist string and build the circuit.
///
/// Malformed element values do not fail here; they are counted in the
/// circuit's error list.
pub fn load(input: &str) -> Result<Circuit> {
    Ok(Circuit::from_ast(parse(input)?))
}

/// Parse a netlist file.
#[cfg(feature = "cli")]
pub fn parse_file(path: &std::path::Path) -> Result<CircuitAst> {
    let content = std::fs::read_to_string(path).map_err(|e| crate::error::SymnaError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::Expr;

    #[test]
    fn test_load_builds_circuit() {
        let input = "\
.title amp
.param Rf=9k
V1 in 0 1 dc=1
E1 out 0 in fb {A0/(1+s/wp)}
R1 out fb Rf
R2 fb GND 1k dcvar=1e-4
";
        let circuit = load(input).unwrap();
        assert_eq!(circuit.title, "amp");
        assert_eq!(circuit.error_count(), 0);
        assert_eq!(circuit.nodes, vec!["0", "in", "out", "fb"]);
        assert_eq!(circuit.params["Rf"].as_f64(), Some(9e3));
        let r2 = circuit.element("R2").unwrap();
        assert_eq!(r2.nodes, vec!["fb", "0"]);
        assert_eq!(r2.value().as_f64(), Some(1e3));
        assert_eq!(circuit.element("R1").unwrap().value(), Expr::symbol("Rf"));
        assert!(circuit.element("E1").unwrap().value().depends_on("s"));
    }

    #[test]
    fn test_load_accumulates_value_errors() {
        let circuit = load("R1 1 0 {1+}\nR2 1 0 1k\nR2 1 0 2k").unwrap();
        assert_eq!(circuit.error_count(), 2);
        assert_eq!(circuit.elements.len(), 1);
    }
}
