//! Symbolic algebra primitives.
//!
//! - [`Poly`]: sparse multivariate Laurent polynomial
//! - [`Expr`]: rational function of two polynomials, the value type of
//!   every matrix entry and transfer function
//! - [`Node`]: general expression tree for netlist input, CAS output and
//!   time-domain results
//! - [`SymMatrix`]: dense matrix of `Expr`

mod expr;
mod matrix;
mod poly;
pub mod syntax;

pub use expr::{Expr, Substituted};
pub use matrix::SymMatrix;
pub use poly::{format_number, Monomial, Poly, PRUNE_TOLERANCE};
pub use syntax::{parse_value, Node};
