//! Core types for circuit representation.

use std::fmt;

/// Name of the ground node.
pub const GROUND: &str = "0";

/// Name of the ground node voltage; always the first dependent variable.
pub const GROUND_VAR: &str = "V_0";

/// Element parameter keys.
pub mod param {
    /// Primary value (resistance, capacitance, gain, source value, ...)
    pub const VALUE: &str = "value";
    /// DC value of an independent source
    pub const DC: &str = "dc";
    /// DC variance of a source or resistor
    pub const DCVAR: &str = "dcvar";
    /// Noise spectral density of an independent source
    pub const NOISE: &str = "noise";
    /// Series output impedance of EZ and HZ elements
    pub const ZO: &str = "zo";
}

/// Element models.
///
/// Node order for four-terminal elements is output port first
/// (`out+ out-`), then control port (`in+ in-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// `C`: capacitor, admittance `s*C`
    Capacitor,
    /// `L`: inductor with branch current, impedance `s*L`
    Inductor,
    /// `R`: resistor stamped as conductance `1/R`
    Resistor,
    /// `r`: resistor with branch current, stamped as resistance
    ResistorBranch,
    /// `V`: independent voltage source
    VoltageSource,
    /// `I`: independent current source
    CurrentSource,
    /// `E`: voltage-controlled voltage source
    Vcvs,
    /// `EZ`: voltage-controlled voltage source with series output impedance
    VcvsZo,
    /// `F`: current-controlled current source
    Cccs,
    /// `G`: voltage-controlled current source
    Vccs,
    /// `g`: voltage-controlled current source with output current variable
    VccsBranch,
    /// `H`: current-controlled voltage source
    Ccvs,
    /// `HZ`: current-controlled voltage source with series output impedance
    CcvsZo,
    /// `T`: ideal transformer with turns ratio `n`
    Transformer,
    /// `W`: gyrator with gyration conductance
    Gyrator,
    /// `K`: coupling factor between two inductors
    Coupling,
    /// `N`: nullor (norator at the output, nullator at the input)
    Nullor,
}

/// Branch current variable introduced by an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// `I_<ref>`: current through a two-terminal branch
    Through,
    /// `Io_<ref>`: output current
    Output,
    /// `Ii_<ref>`: input (control) current
    Input,
}

impl Branch {
    /// Prefix of the variable name.
    pub fn prefix(&self) -> &'static str {
        match self {
            Branch::Through => "I",
            Branch::Output => "Io",
            Branch::Input => "Ii",
        }
    }
}

/// Name of the node voltage variable of `node`.
pub fn node_var(node: &str) -> String {
    format!("V_{}", node)
}

/// Name of a branch current variable of element `refdes`.
pub fn branch_var(branch: Branch, refdes: &str) -> String {
    format!("{}_{}", branch.prefix(), refdes)
}

impl Model {
    /// Every model, in catalogue order.
    pub const ALL: [Model; 17] = [
        Model::Capacitor,
        Model::Inductor,
        Model::Resistor,
        Model::ResistorBranch,
        Model::VoltageSource,
        Model::CurrentSource,
        Model::Vcvs,
        Model::VcvsZo,
        Model::Cccs,
        Model::Vccs,
        Model::VccsBranch,
        Model::Ccvs,
        Model::CcvsZo,
        Model::Transformer,
        Model::Gyrator,
        Model::Coupling,
        Model::Nullor,
    ];

    /// Netlist keyword (case-sensitive).
    pub fn keyword(&self) -> &'static str {
        match self {
            Model::Capacitor => "C",
            Model::Inductor => "L",
            Model::Resistor => "R",
            Model::ResistorBranch => "r",
            Model::VoltageSource => "V",
            Model::CurrentSource => "I",
            Model::Vcvs => "E",
            Model::VcvsZo => "EZ",
            Model::Cccs => "F",
            Model::Vccs => "G",
            Model::VccsBranch => "g",
            Model::Ccvs => "H",
            Model::CcvsZo => "HZ",
            Model::Transformer => "T",
            Model::Gyrator => "W",
            Model::Coupling => "K",
            Model::Nullor => "N",
        }
    }

    /// Parse a model keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.keyword() == keyword)
    }

    /// Default model for a reference designator, from its first letter.
    pub fn from_prefix(refdes: &str) -> Option<Self> {
        let first = refdes.chars().next()?;
        Self::from_keyword(&first.to_ascii_uppercase().to_string())
    }

    /// Number of nodes the element connects (zero for `K`, which
    /// references elements instead).
    pub fn node_count(&self) -> usize {
        match self {
            Model::Capacitor
            | Model::Inductor
            | Model::Resistor
            | Model::ResistorBranch
            | Model::VoltageSource
            | Model::CurrentSource => 2,
            Model::Coupling => 0,
            _ => 4,
        }
    }

    /// Number of element references (`K` only).
    pub fn ref_count(&self) -> usize {
        if *self == Model::Coupling {
            2
        } else {
            0
        }
    }

    /// Branch current variables introduced by the stamp, in order.
    pub fn branches(&self) -> &'static [Branch] {
        match self {
            Model::Inductor | Model::ResistorBranch | Model::VoltageSource | Model::Vcvs | Model::VcvsZo => {
                &[Branch::Through]
            }
            Model::Cccs => &[Branch::Input],
            Model::VccsBranch | Model::Transformer | Model::Nullor => &[Branch::Output],
            Model::Ccvs | Model::CcvsZo => &[Branch::Output, Branch::Input],
            _ => &[],
        }
    }

    /// True for independent sources.
    pub fn is_independent_source(&self) -> bool {
        matches!(self, Model::VoltageSource | Model::CurrentSource)
    }

    /// True for the controlled sources usable as loop-gain reference.
    pub fn is_controlled_source(&self) -> bool {
        matches!(
            self,
            Model::Vcvs | Model::VcvsZo | Model::Cccs | Model::Vccs | Model::VccsBranch | Model::Ccvs | Model::CcvsZo
        )
    }

    /// True when `value` may hold a Laplace-rational function that is
    /// stamped as separate numerator and denominator.
    pub fn separates_laplace_value(&self) -> bool {
        matches!(
            self,
            Model::Vcvs | Model::VcvsZo | Model::VccsBranch | Model::Ccvs | Model::CcvsZo
        )
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(Model::from_keyword("R"), Some(Model::Resistor));
        assert_eq!(Model::from_keyword("r"), Some(Model::ResistorBranch));
        assert_eq!(Model::from_keyword("g"), Some(Model::VccsBranch));
        assert_eq!(Model::from_keyword("HZ"), Some(Model::CcvsZo));
        assert_eq!(Model::from_keyword("x"), None);
        for model in Model::ALL {
            assert_eq!(Model::from_keyword(model.keyword()), Some(model));
        }
    }

    #[test]
    fn test_prefix_and_branches() {
        assert_eq!(Model::from_prefix("Rload"), Some(Model::Resistor));
        assert_eq!(Model::from_prefix("e1"), Some(Model::Vcvs));
        assert_eq!(Model::from_prefix("Xamp"), None);
        assert_eq!(Model::Ccvs.branches(), &[Branch::Output, Branch::Input]);
        assert_eq!(branch_var(Branch::Input, "H1"), "Ii_H1");
        assert_eq!(node_var("out"), "V_out");
    }
}
