//! Circuit structure.

use std::collections::BTreeMap;

use tracing::debug;

use super::elements::Element;
use super::types::{node_var, Model, GROUND, GROUND_VAR};
use crate::dsl::CircuitAst;
use crate::error::{Result, SymnaError};
use crate::symbolic::{Expr, Node};

/// A flat (already expanded) circuit.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    /// Circuit title
    pub title: String,

    /// Node names in order of first use; ground (`"0"`) is always first
    pub nodes: Vec<String>,

    /// Elements by reference designator
    pub elements: BTreeMap<String, Element>,

    /// Parameter definitions; values may reference other parameters
    pub params: BTreeMap<String, Expr>,

    /// Structural errors found while building the circuit
    pub errors: Vec<String>,
}

/// Normalise ground aliases to `"0"`.
pub fn normalize_node(name: &str) -> String {
    if name.eq_ignore_ascii_case("gnd") {
        GROUND.to_string()
    } else {
        name.to_string()
    }
}

/// Dependent variables of a set of elements: the ground voltage first,
/// then the node voltages, then the branch currents in element order.
pub fn dependent_vars<'a>(nodes: &[String], elements: impl Iterator<Item = &'a Element>) -> Vec<String> {
    let mut vars = vec![GROUND_VAR.to_string()];
    vars.extend(nodes.iter().filter(|n| n.as_str() != GROUND).map(|n| node_var(n)));
    for element in elements {
        vars.extend(element.branch_vars());
    }
    vars
}

/// Matrix row/column of each dependent variable, ground excluded.
pub fn var_index(dependent: &[String]) -> BTreeMap<String, usize> {
    dependent
        .iter()
        .skip(1)
        .enumerate()
        .map(|(idx, name)| (name.clone(), idx))
        .collect()
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            nodes: vec![GROUND.to_string()],
            ..Default::default()
        }
    }

    /// Build a circuit from a parsed netlist.
    ///
    /// Malformed values and element definitions are recorded in
    /// [`Circuit::errors`] instead of aborting the build.
    pub fn from_ast(ast: CircuitAst) -> Self {
        let mut circuit = Circuit::new(ast.title.unwrap_or_default());

        for def in ast.params {
            match Node::parse(&def.value).and_then(|n| n.to_expr()) {
                Ok(value) => circuit.define_param(&def.name, value),
                Err(err) => circuit
                    .errors
                    .push(format!("line {}: parameter '{}': {}", def.line, def.name, err)),
            }
        }

        for def in ast.elements {
            let nodes: Vec<&str> = def.nodes.iter().map(String::as_str).collect();
            let refs: Vec<&str> = def.refs.iter().map(String::as_str).collect();
            let mut element = Element::new(&def.refdes, def.model, &nodes).with_refs(&refs);
            let values = def
                .value
                .iter()
                .map(|v| (crate::circuit::param::VALUE.to_string(), v.clone()))
                .chain(def.params.iter().cloned());
            let mut ok = true;
            for (key, text) in values {
                match Node::parse(&text).and_then(|n| n.to_expr()) {
                    Ok(value) => {
                        element.params.insert(key.to_lowercase(), value);
                    }
                    Err(err) => {
                        circuit
                            .errors
                            .push(format!("line {}: {} {}: {}", def.line, def.refdes, key, err));
                        ok = false;
                    }
                }
            }
            if ok {
                circuit.add_element(element);
            }
        }
        debug!(
            elements = circuit.elements.len(),
            nodes = circuit.nodes.len(),
            errors = circuit.errors.len(),
            "circuit built"
        );
        circuit
    }

    /// Add an element; structural problems are recorded as errors and the
    /// element is not added.
    pub fn add_element(&mut self, mut element: Element) {
        if self.elements.contains_key(&element.refdes) {
            self.errors
                .push(format!("duplicate reference designator '{}'", element.refdes));
            return;
        }
        if element.nodes.len() != element.model.node_count() {
            self.errors.push(format!(
                "{}: model {} needs {} nodes, got {}",
                element.refdes,
                element.model,
                element.model.node_count(),
                element.nodes.len()
            ));
            return;
        }
        if element.refs.len() != element.model.ref_count() {
            self.errors.push(format!(
                "{}: model {} needs {} element references, got {}",
                element.refdes,
                element.model,
                element.model.ref_count(),
                element.refs.len()
            ));
            return;
        }
        element.nodes = element.nodes.iter().map(|n| normalize_node(n)).collect();
        for node in &element.nodes {
            if !self.nodes.contains(node) {
                self.nodes.push(node.clone());
            }
        }
        self.elements.insert(element.refdes.clone(), element);
    }

    /// Remove an element by designator.
    pub fn remove_element(&mut self, refdes: &str) -> Option<Element> {
        self.elements.remove(refdes)
    }

    /// Define (or redefine) a parameter.
    pub fn define_param(&mut self, name: &str, value: Expr) {
        self.params.insert(name.to_string(), value);
    }

    /// Element by designator.
    pub fn element(&self, refdes: &str) -> Result<&Element> {
        self.elements
            .get(refdes)
            .ok_or_else(|| SymnaError::ElementNotFound {
                name: refdes.to_string(),
            })
    }

    /// Number of structural errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Designators of the independent sources.
    pub fn independent_vars(&self) -> Vec<String> {
        self.elements
            .values()
            .filter(|e| e.model.is_independent_source())
            .map(|e| e.refdes.clone())
            .collect()
    }

    /// Dependent variables of the circuit as defined.
    pub fn dependent_vars(&self) -> Vec<String> {
        dependent_vars(&self.nodes, self.elements.values())
    }

    /// Matrix index of each dependent variable, ground excluded.
    pub fn var_index(&self) -> BTreeMap<String, usize> {
        var_index(&self.dependent_vars())
    }

    /// Elements of one model.
    pub fn elements_of(&self, model: Model) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(move |e| e.model == model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divider() -> Circuit {
        let mut c = Circuit::new("divider");
        c.add_element(Element::new("V1", Model::VoltageSource, &["in", "0"]).with_value(Expr::constant(1.0)));
        c.add_element(Element::new("R1", Model::Resistor, &["in", "out"]));
        c.add_element(Element::new("R2", Model::Resistor, &["out", "GND"]));
        c
    }

    #[test]
    fn test_dependent_vars_and_index() {
        let c = divider();
        assert_eq!(c.nodes, vec!["0", "in", "out"]);
        assert_eq!(c.dependent_vars(), vec!["V_0", "V_in", "V_out", "I_V1"]);
        let index = c.var_index();
        assert_eq!(index["V_in"], 0);
        assert_eq!(index["I_V1"], 2);
        assert!(!index.contains_key("V_0"));
        assert_eq!(c.independent_vars(), vec!["V1"]);
    }

    #[test]
    fn test_structural_errors_accumulate() {
        let mut c = divider();
        c.add_element(Element::new("R1", Model::Resistor, &["a", "b"]));
        c.add_element(Element::new("E1", Model::Vcvs, &["a", "b"]));
        c.add_element(Element::new("K1", Model::Coupling, &[]).with_refs(&["L1"]));
        assert_eq!(c.error_count(), 3);
        assert_eq!(c.elements.len(), 3);
        assert!(c.element("E1").is_err());
    }
}
