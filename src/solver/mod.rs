//! MNA (Modified Nodal Analysis) engine.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations `M · Dv = Iv` where:
//! - `Dv` contains node voltages and branch currents
//! - `M` is the symbolic coefficient matrix
//! - `Iv` is the independent-source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G holds admittances (node equations)
//! - B, C connect branch currents to nodes
//! - D holds branch impedances and controlled-source terms
//! - v is the vector of node voltages
//! - j is the vector of branch currents
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! Entries are rational functions of the circuit parameters and the
//! Laplace variable; transfer functions follow from determinants and
//! cofactors of `M` instead of a numeric factorisation.

pub mod determinant;
mod mna;
pub mod roots;
pub mod servo;

pub use determinant::{cofactor, cramer_substitute, determinant, determinant_with, minor};
pub use mna::{loop_gain_reference, MatrixBuilder, MnaSystem, SourceParam};
pub use roots::{cancel_pole_zero, polynomial_coefficients, roots};
pub use servo::{servo_bandwidth, Crossing, MidBand, ServoBandwidth};
