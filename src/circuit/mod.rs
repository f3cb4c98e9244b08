//! Circuit representation and validation.
//!
//! A [`Circuit`] is a flat set of [`Element`]s with parameter definitions.
//! Node voltages and branch currents are named `V_<node>`, `I_<ref>`,
//! `Io_<ref>` and `Ii_<ref>`; the ground voltage `V_0` is always the first
//! dependent variable and has no matrix row.

mod elements;
mod graph;
mod types;
mod validate;

pub use elements::Element;
pub use graph::{dependent_vars, normalize_node, var_index, Circuit};
pub use types::*;
pub use validate::validate_circuit;
