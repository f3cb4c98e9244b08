//! Circuit elements.

use std::collections::BTreeMap;

use super::types::{branch_var, param, Model};
use crate::symbolic::Expr;

/// One element instance of an expanded circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Reference designator (unique within the circuit)
    pub refdes: String,
    /// Element model
    pub model: Model,
    /// Connected nodes, output port first
    pub nodes: Vec<String>,
    /// Referenced elements (coupled inductors of `K`)
    pub refs: Vec<String>,
    /// Parameters by key (`value`, `dc`, `dcvar`, `noise`, `zo`, ...)
    pub params: BTreeMap<String, Expr>,
}

impl Element {
    /// Create an element without parameters.
    pub fn new(refdes: impl Into<String>, model: Model, nodes: &[&str]) -> Self {
        Self {
            refdes: refdes.into(),
            model,
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            refs: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter setter.
    pub fn with_param(mut self, key: &str, value: Expr) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Builder-style setter of the primary value.
    pub fn with_value(self, value: Expr) -> Self {
        self.with_param(param::VALUE, value)
    }

    /// Builder-style setter of element references.
    pub fn with_refs(mut self, refs: &[&str]) -> Self {
        self.refs = refs.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Parameter by key.
    pub fn param(&self, key: &str) -> Option<&Expr> {
        self.params.get(key)
    }

    /// Primary value; an element without one takes the symbol named after
    /// its reference designator.
    pub fn value(&self) -> Expr {
        self.params
            .get(param::VALUE)
            .cloned()
            .unwrap_or_else(|| Expr::symbol(&self.refdes))
    }

    /// Parameter by key, zero when absent.
    pub fn param_or_zero(&self, key: &str) -> Expr {
        self.params.get(key).cloned().unwrap_or_else(Expr::zero)
    }

    /// Names of the branch current variables this element introduces.
    pub fn branch_vars(&self) -> Vec<String> {
        self.model
            .branches()
            .iter()
            .map(|b| branch_var(*b, &self.refdes))
            .collect()
    }

    /// The same element with its primary value forced to zero.
    pub fn zeroed(&self) -> Element {
        let mut out = self.clone();
        out.params.insert(param::VALUE.to_string(), Expr::zero());
        out
    }

    /// A nullor on the same four nodes, carrying the same designator.
    pub fn as_nullor(&self) -> Element {
        Element {
            refdes: self.refdes.clone(),
            model: Model::Nullor,
            nodes: self.nodes.clone(),
            refs: Vec::new(),
            params: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value_is_refdes_symbol() {
        let r = Element::new("R1", Model::Resistor, &["in", "out"]);
        assert_eq!(r.value(), Expr::symbol("R1"));
        let r = r.with_value(Expr::constant(1e3));
        assert_eq!(r.value().as_f64(), Some(1e3));
        assert!(r.param_or_zero(param::DCVAR).is_zero());
    }

    #[test]
    fn test_override_helpers() {
        let e = Element::new("E1", Model::Vcvs, &["out", "0", "in", "0"]).with_value(Expr::symbol("A"));
        assert!(e.zeroed().value().is_zero());
        assert_eq!(e.value(), Expr::symbol("A"));
        let n = e.as_nullor();
        assert_eq!(n.model, Model::Nullor);
        assert_eq!(n.nodes, e.nodes);
        assert_eq!(e.branch_vars(), vec!["I_E1".to_string()]);
        assert_eq!(n.branch_vars(), vec!["Io_E1".to_string()]);
    }
}
