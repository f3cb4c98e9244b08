//! Circuit validation.

use super::types::{param, Model, GROUND};
use super::Circuit;
use crate::config::AnalysisConfig;

/// Check a circuit for analysis and return the problems found.
///
/// Checks:
/// - The circuit has at least one element
/// - `K` elements reference two existing inductors
/// - `dc`, `dcvar` and `noise` values do not contain the Laplace variable
/// - Every element is connected to something other than ground alone
pub fn validate_circuit(circuit: &Circuit, config: &AnalysisConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if circuit.elements.is_empty() {
        problems.push("circuit has no elements".to_string());
    }

    for element in circuit.elements.values() {
        if element.model == Model::Coupling {
            for target in &element.refs {
                match circuit.elements.get(target) {
                    Some(l) if l.model == Model::Inductor => {}
                    Some(other) => problems.push(format!(
                        "{}: referenced element '{}' is a {}, not an inductor",
                        element.refdes, target, other.model
                    )),
                    None => problems.push(format!(
                        "{}: referenced element '{}' does not exist",
                        element.refdes, target
                    )),
                }
            }
        }

        for key in [param::DC, param::DCVAR, param::NOISE] {
            if let Some(value) = element.param(key) {
                if value.depends_on(&config.laplace) {
                    problems.push(format!(
                        "{}: parameter '{}' must not depend on '{}'",
                        element.refdes, key, config.laplace
                    ));
                }
            }
        }

        if !element.nodes.is_empty() && element.nodes.iter().all(|n| n == GROUND) {
            problems.push(format!("{}: all nodes are grounded", element.refdes));
        }
    }

    problems
}
