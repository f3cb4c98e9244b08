//! MNA matrix assembly.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::analysis::GainType;
use crate::circuit::{dependent_vars, node_var, param, var_index, Branch, Circuit, Element, Model, GROUND};
use crate::config::AnalysisConfig;
use crate::error::{Result, SymnaError};
use crate::symbolic::{Expr, SymMatrix};

/// Element parameter that fills the independent-source vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceParam {
    /// `value`: AC / Laplace excitation
    #[default]
    Value,
    /// `dc`: DC excitation (zero when absent)
    Dc,
}

impl SourceParam {
    fn key(&self) -> &'static str {
        match self {
            SourceParam::Value => param::VALUE,
            SourceParam::Dc => param::DC,
        }
    }
}

/// MNA system `M · Dv = Iv` of one circuit.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// System matrix
    pub matrix: SymMatrix,
    /// Dependent variables in row/column order (ground excluded)
    pub dv: Vec<String>,
    /// Independent-source vector
    pub iv: Vec<Expr>,
    /// Row/column of each dependent variable
    pub var_index: BTreeMap<String, usize>,
    /// Problems found while stamping
    pub warnings: Vec<String>,
}

impl MnaSystem {
    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.dv.len()
    }

    /// Row/column of a dependent variable; `None` for the ground voltage.
    pub fn position(&self, var: &str) -> Result<Option<usize>> {
        if var == node_var(GROUND) {
            return Ok(None);
        }
        self.var_index
            .get(var)
            .copied()
            .map(Some)
            .ok_or_else(|| SymnaError::UnknownVariable { name: var.to_string() })
    }
}

/// Assembles the MNA system of a circuit.
///
/// Loop-gain reference handling never touches the circuit: the modified
/// reference element lives in an override map consulted while stamping.
pub struct MatrixBuilder<'a> {
    circuit: &'a Circuit,
    config: &'a AnalysisConfig,
    params: &'a BTreeMap<String, Expr>,
    numeric: bool,
    sources: SourceParam,
    overrides: BTreeMap<String, Element>,
}

impl<'a> MatrixBuilder<'a> {
    /// Builder for `circuit` with its own parameter definitions.
    pub fn new(circuit: &'a Circuit, config: &'a AnalysisConfig) -> Self {
        Self {
            circuit,
            config,
            params: &circuit.params,
            numeric: false,
            sources: SourceParam::Value,
            overrides: BTreeMap::new(),
        }
    }

    /// Use other parameter definitions (stepping).
    pub fn with_params(mut self, params: &'a BTreeMap<String, Expr>) -> Self {
        self.params = params;
        self
    }

    /// Substitute parameter definitions into every element value.
    pub fn numeric(mut self, numeric: bool) -> Self {
        self.numeric = numeric;
        self
    }

    /// Select the source parameter that fills `Iv`.
    pub fn with_sources(mut self, sources: SourceParam) -> Self {
        self.sources = sources;
        self
    }

    /// Apply the loop-gain reference modification of a gain type.
    pub fn with_gain_type(mut self, gain_type: GainType, lg_ref: Option<&str>) -> Result<Self> {
        if !gain_type.uses_loop_gain_reference() {
            return Ok(self);
        }
        let reference = loop_gain_reference(self.circuit, lg_ref)?;
        let replaced = if gain_type == GainType::Asymptotic {
            reference.as_nullor()
        } else {
            reference.zeroed()
        };
        debug!(reference = %reference.refdes, %gain_type, "overriding loop-gain reference");
        self.overrides.insert(replaced.refdes.clone(), replaced);
        Ok(self)
    }

    /// Numerator and denominator of an element's (resolved) value.
    pub fn value_parts(&self, element: &Element) -> (Expr, Expr) {
        let mut scratch = Vec::new();
        self.resolve(element, &element.value(), &mut scratch).as_numer_denom()
    }

    /// An element parameter, zero when absent, with definitions
    /// substituted in numeric mode.
    pub fn resolved_param(&self, element: &Element, key: &str, warnings: &mut Vec<String>) -> Expr {
        self.resolve(element, &element.param_or_zero(key), warnings)
    }

    /// Elements as they are stamped.
    pub fn effective_elements(&self) -> impl Iterator<Item = &Element> {
        self.circuit
            .elements
            .values()
            .map(move |e| self.overrides.get(&e.refdes).unwrap_or(e))
    }

    /// Assemble `M`, `Dv` and `Iv`.
    pub fn build(&self) -> Result<MnaSystem> {
        let dependent = dependent_vars(&self.circuit.nodes, self.effective_elements());
        let index = var_index(&dependent);
        let dim = dependent.len() - 1;

        let mut stamper = Stamper {
            matrix: SymMatrix::zeros(dim, dim),
            iv: vec![Expr::zero(); dim],
            index: &index,
        };
        let mut warnings = Vec::new();

        for element in self.effective_elements() {
            self.stamp(&mut stamper, element, &mut warnings);
        }

        debug!(
            dim,
            nonzeros = stamper.matrix.nonzeros(),
            numeric = self.numeric,
            "MNA matrix assembled"
        );

        Ok(MnaSystem {
            matrix: stamper.matrix,
            dv: dependent.into_iter().skip(1).collect(),
            iv: stamper.iv,
            var_index: index,
            warnings,
        })
    }

    pub(crate) fn resolve(&self, element: &Element, value: &Expr, warnings: &mut Vec<String>) -> Expr {
        if !self.numeric {
            return value.clone();
        }
        let out = value.substitute_recursive(self.params, self.config.max_recursion_depth);
        if !out.converged {
            let msg = format!(
                "{}: parameter substitution did not converge after {} passes",
                element.refdes, self.config.max_recursion_depth
            );
            warn!("{}", msg);
            warnings.push(msg);
        }
        out.expr
    }

    fn stamp(&self, st: &mut Stamper<'_>, el: &Element, warnings: &mut Vec<String>) {
        let value = self.resolve(el, &el.value(), warnings);
        let s = Expr::symbol(&self.config.laplace);
        let n = |k: usize| st.node(&el.nodes[k]);

        match el.model {
            Model::Resistor => {
                let (p, m) = (n(0), n(1));
                st.conductance(p, m, &value.recip());
            }
            Model::Capacitor => {
                let (p, m) = (n(0), n(1));
                st.conductance(p, m, &(&s * &value));
            }
            Model::Inductor | Model::ResistorBranch => {
                let (p, m) = (n(0), n(1));
                let br = st.branch(el, Branch::Through);
                st.kcl(p, m, br);
                st.branch_voltage(br, p, m, &Expr::one());
                let impedance = if el.model == Model::Inductor { &s * &value } else { value };
                st.add(br, br, &-impedance);
            }
            Model::VoltageSource => {
                let (p, m) = (n(0), n(1));
                let br = st.branch(el, Branch::Through);
                st.kcl(p, m, br);
                st.branch_voltage(br, p, m, &Expr::one());
                if let Some(row) = br {
                    st.iv[row] = self.source_value(el, warnings);
                }
            }
            Model::CurrentSource => {
                let (p, m) = (n(0), n(1));
                let current = self.source_value(el, warnings);
                if let Some(row) = p {
                    st.iv[row] = &st.iv[row] - &current;
                }
                if let Some(row) = m {
                    st.iv[row] = &st.iv[row] + &current;
                }
            }
            Model::Vcvs | Model::VcvsZo => {
                let (op, om, cp, cm) = (n(0), n(1), n(2), n(3));
                let (num, den) = value.as_numer_denom();
                let br = st.branch(el, Branch::Through);
                st.kcl(op, om, br);
                st.branch_voltage(br, op, om, &den);
                st.branch_voltage(br, cp, cm, &-&num);
                if el.model == Model::VcvsZo {
                    let zo = self.resolve(el, &el.param_or_zero(param::ZO), warnings);
                    st.add(br, br, &-(&den * &zo));
                }
            }
            Model::Cccs => {
                let (op, om, ip, im) = (n(0), n(1), n(2), n(3));
                let ii = st.branch(el, Branch::Input);
                st.kcl(ip, im, ii);
                st.branch_voltage(ii, ip, im, &Expr::one());
                st.add(op, ii, &value);
                st.add(om, ii, &-&value);
            }
            Model::Vccs => {
                let (op, om, cp, cm) = (n(0), n(1), n(2), n(3));
                st.transconductance(op, om, cp, cm, &value);
            }
            Model::VccsBranch => {
                let (op, om, cp, cm) = (n(0), n(1), n(2), n(3));
                let (num, den) = value.as_numer_denom();
                let io = st.branch(el, Branch::Output);
                st.kcl(op, om, io);
                st.add(io, io, &den);
                st.branch_voltage(io, cp, cm, &-&num);
            }
            Model::Ccvs | Model::CcvsZo => {
                let (op, om, ip, im) = (n(0), n(1), n(2), n(3));
                let (num, den) = value.as_numer_denom();
                let io = st.branch(el, Branch::Output);
                let ii = st.branch(el, Branch::Input);
                st.kcl(ip, im, ii);
                st.branch_voltage(ii, ip, im, &Expr::one());
                st.kcl(op, om, io);
                st.branch_voltage(io, op, om, &den);
                st.add(io, ii, &-&num);
                if el.model == Model::CcvsZo {
                    let zo = self.resolve(el, &el.param_or_zero(param::ZO), warnings);
                    st.add(io, io, &-(&den * &zo));
                }
            }
            Model::Transformer => {
                let (op, om, ip, im) = (n(0), n(1), n(2), n(3));
                let io = st.branch(el, Branch::Output);
                st.kcl(op, om, io);
                st.add(ip, io, &-&value);
                st.add(im, io, &value);
                st.branch_voltage(io, op, om, &Expr::one());
                st.branch_voltage(io, ip, im, &-&value);
            }
            Model::Gyrator => {
                let (op, om, ip, im) = (n(0), n(1), n(2), n(3));
                st.transconductance(op, om, ip, im, &value);
                st.transconductance(ip, im, op, om, &-&value);
            }
            Model::Nullor => {
                let (op, om, ip, im) = (n(0), n(1), n(2), n(3));
                let io = st.branch(el, Branch::Output);
                st.kcl(op, om, io);
                st.branch_voltage(io, ip, im, &Expr::one());
            }
            Model::Coupling => {
                let msg = format!("{}: inductive coupling is not stamped", el.refdes);
                warn!("{}", msg);
                warnings.push(msg);
            }
        }
    }

    fn source_value(&self, el: &Element, warnings: &mut Vec<String>) -> Expr {
        let raw = match self.sources {
            SourceParam::Value => el.value(),
            SourceParam::Dc => el.param_or_zero(self.sources.key()),
        };
        self.resolve(el, &raw, warnings)
    }
}

/// Validate and fetch the loop-gain reference element.
pub fn loop_gain_reference<'c>(circuit: &'c Circuit, lg_ref: Option<&str>) -> Result<&'c Element> {
    let name = lg_ref.ok_or_else(|| SymnaError::invalid_instruction("gain type requires a loop-gain reference"))?;
    let element = circuit.element(name)?;
    if !element.model.is_controlled_source() {
        return Err(SymnaError::InvalidLoopGainReference {
            name: name.to_string(),
            model: element.model.to_string(),
        });
    }
    Ok(element)
}

/// Stamp helpers; `None` positions are ground and are skipped.
struct Stamper<'i> {
    matrix: SymMatrix,
    iv: Vec<Expr>,
    index: &'i BTreeMap<String, usize>,
}

impl Stamper<'_> {
    fn node(&self, node: &str) -> Option<usize> {
        self.index.get(&node_var(node)).copied()
    }

    fn branch(&self, el: &Element, branch: Branch) -> Option<usize> {
        self.index.get(&crate::circuit::branch_var(branch, &el.refdes)).copied()
    }

    fn add(&mut self, row: Option<usize>, col: Option<usize>, value: &Expr) {
        if let (Some(r), Some(c)) = (row, col) {
            self.matrix.add_at(r, c, value);
        }
    }

    /// Conductance `g` between two nodes.
    fn conductance(&mut self, n1: Option<usize>, n2: Option<usize>, g: &Expr) {
        let minus = -g;
        self.add(n1, n1, g);
        self.add(n2, n2, g);
        self.add(n1, n2, &minus);
        self.add(n2, n1, &minus);
    }

    /// Branch current leaving `n_pos` and entering `n_neg`.
    fn kcl(&mut self, n_pos: Option<usize>, n_neg: Option<usize>, br: Option<usize>) {
        self.add(n_pos, br, &Expr::one());
        self.add(n_neg, br, &Expr::constant(-1.0));
    }

    /// `scale · (V[n_pos] - V[n_neg])` in branch row `br`.
    fn branch_voltage(&mut self, br: Option<usize>, n_pos: Option<usize>, n_neg: Option<usize>, scale: &Expr) {
        self.add(br, n_pos, scale);
        self.add(br, n_neg, &-scale);
    }

    /// Current `gm · (V[c_pos] - V[c_neg])` from `o_pos` to `o_neg`.
    fn transconductance(
        &mut self,
        o_pos: Option<usize>,
        o_neg: Option<usize>,
        c_pos: Option<usize>,
        c_neg: Option<usize>,
        gm: &Expr,
    ) {
        let minus = -gm;
        self.add(o_pos, c_pos, gm);
        self.add(o_pos, c_neg, &minus);
        self.add(o_neg, c_pos, &minus);
        self.add(o_neg, c_neg, gm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::determinant;

    fn amplifier() -> Circuit {
        let mut c = Circuit::new("amp");
        c.add_element(Element::new("V1", Model::VoltageSource, &["in", "0"]).with_value(Expr::one()));
        c.add_element(Element::new("E1", Model::Vcvs, &["out", "0", "in", "fb"]).with_value(Expr::symbol("A")));
        c.add_element(Element::new("R1", Model::Resistor, &["out", "fb"]));
        c.add_element(Element::new("R2", Model::Resistor, &["fb", "0"]));
        c
    }

    #[test]
    fn test_divider_matrix() {
        let mut c = Circuit::new("divider");
        c.add_element(Element::new("V1", Model::VoltageSource, &["in", "0"]).with_value(Expr::constant(2.0)));
        c.add_element(Element::new("R1", Model::Resistor, &["in", "out"]).with_value(Expr::constant(1.0)));
        c.add_element(Element::new("R2", Model::Resistor, &["out", "0"]).with_value(Expr::constant(1.0)));
        let config = AnalysisConfig::default();
        let sys = MatrixBuilder::new(&c, &config).build().unwrap();
        assert_eq!(sys.dv, vec!["V_in", "V_out", "I_V1"]);
        assert_eq!(sys.dim(), 3);
        assert_eq!(sys.matrix.get(0, 0).as_f64(), Some(1.0));
        assert_eq!(sys.matrix.get(1, 1).as_f64(), Some(2.0));
        assert_eq!(sys.matrix.get(0, 2).as_f64(), Some(1.0));
        assert_eq!(sys.matrix.get(2, 0).as_f64(), Some(1.0));
        assert_eq!(sys.iv[2].as_f64(), Some(2.0));
        assert_eq!(sys.position("V_0").unwrap(), None);
        assert!(sys.position("V_x").is_err());
    }

    #[test]
    fn test_numeric_substitution() {
        let mut c = Circuit::new("rc");
        c.add_element(Element::new("R1", Model::Resistor, &["1", "0"]).with_value(Expr::symbol("R")));
        c.define_param("R", Expr::parse("2*k").unwrap());
        c.define_param("k", Expr::constant(500.0));
        let config = AnalysisConfig::default();
        let symbolic = MatrixBuilder::new(&c, &config).build().unwrap();
        assert_eq!(*symbolic.matrix.get(0, 0), Expr::symbol("R").recip());
        let numeric = MatrixBuilder::new(&c, &config).numeric(true).build().unwrap();
        assert_eq!(numeric.matrix.get(0, 0).as_f64(), Some(1e-3));
        assert!(numeric.warnings.is_empty());
    }

    #[test]
    fn test_loop_gain_override_leaves_circuit_untouched() {
        let c = amplifier();
        let before = c.element("E1").unwrap().clone();
        let config = AnalysisConfig::default();

        let sys = MatrixBuilder::new(&c, &config)
            .with_gain_type(GainType::LoopGain, Some("E1"))
            .unwrap()
            .build()
            .unwrap();
        let row = sys.var_index["I_E1"];
        let fb = sys.var_index["V_fb"];
        assert!(sys.matrix.get(row, fb).is_zero());

        let asym = MatrixBuilder::new(&c, &config)
            .with_gain_type(GainType::Asymptotic, Some("E1"))
            .unwrap()
            .build()
            .unwrap();
        assert!(asym.var_index.contains_key("Io_E1"));
        assert!(!asym.var_index.contains_key("I_E1"));

        assert!(MatrixBuilder::new(&c, &config)
            .with_gain_type(GainType::Servo, Some("R1"))
            .is_err());
        assert!(MatrixBuilder::new(&c, &config)
            .with_gain_type(GainType::Direct, None)
            .is_err());
        assert_eq!(c.element("E1").unwrap(), &before);
    }

    #[test]
    fn test_vcvs_gain_from_determinants() {
        // Vout = A/(1 + A*R2/(R1+R2)) with the numbers below: 9.0
        let mut c = amplifier();
        c.add_element(Element::new("Rl", Model::Resistor, &["out", "0"]).with_value(Expr::constant(1e3)));
        c.define_param("A", Expr::constant(1e12));
        c.define_param("R1", Expr::constant(8e3));
        c.define_param("R2", Expr::constant(1e3));
        let config = AnalysisConfig::default();
        let sys = MatrixBuilder::new(&c, &config).numeric(true).build().unwrap();
        let out = sys.var_index["V_out"];
        let det = determinant::determinant(&sys.matrix);
        let num = determinant::determinant(&determinant::cramer_substitute(&sys.matrix, &sys.iv, out));
        let gain = (num / det).as_f64().unwrap();
        approx::assert_relative_eq!(gain, 9.0, max_relative = 1e-9);
    }
}
