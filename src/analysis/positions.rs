//! Source and detector positions in the MNA matrix.
//!
//! A transfer numerator is the signed sum of four cofactors: source rows
//! (positive, negative) against detector columns (positive, negative).
//! Missing positions (ground, single-ended ports) drop their terms.

use super::instruction::{Detector, GainType, Instruction};
use crate::circuit::{branch_var, node_var, Branch, Circuit, Element, Model};
use crate::error::{Result, SymnaError};
use crate::solver::{loop_gain_reference, MnaSystem};

/// Matrix rows of the excitation and columns of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Positions {
    /// Row receiving `+excitation`
    pub src_pos: Option<usize>,
    /// Row receiving `-excitation`
    pub src_neg: Option<usize>,
    /// Column of the positive detector variable
    pub det_pos: Option<usize>,
    /// Column of the negative detector variable
    pub det_neg: Option<usize>,
}

impl Positions {
    /// The (row, column, sign) triples of the four-term cofactor sum.
    pub fn terms(&self) -> Vec<(usize, usize, f64)> {
        let rows = [(self.src_pos, 1.0), (self.src_neg, -1.0)];
        let cols = [(self.det_pos, 1.0), (self.det_neg, -1.0)];
        let mut out = Vec::with_capacity(4);
        for (row, rs) in rows {
            for (col, cs) in cols {
                if let (Some(r), Some(c)) = (row, col) {
                    out.push((r, c, rs * cs));
                }
            }
        }
        out
    }
}

fn node(sys: &MnaSystem, el: &Element, k: usize) -> Result<Option<usize>> {
    sys.position(&node_var(&el.nodes[k]))
}

fn branch(sys: &MnaSystem, el: &Element, b: Branch) -> Result<Option<usize>> {
    sys.position(&branch_var(b, &el.refdes))
}

/// Rows excited by an independent source.
///
/// A current source from `n+` to `n-` adds `-I` to row `n+` and `+I` to
/// row `n-`; a voltage source drives its branch row.
pub fn source_positions(sys: &MnaSystem, source: &Element) -> Result<(Option<usize>, Option<usize>)> {
    match source.model {
        Model::VoltageSource => Ok((branch(sys, source, Branch::Through)?, None)),
        Model::CurrentSource => Ok((node(sys, source, 1)?, node(sys, source, 0)?)),
        _ => Err(SymnaError::UnknownSource {
            name: source.refdes.clone(),
        }),
    }
}

/// Columns of the detector variables.
pub fn detector_positions(sys: &MnaSystem, detector: &Detector) -> Result<(Option<usize>, Option<usize>)> {
    let lookup = |name: &Option<String>| -> Result<Option<usize>> {
        match name {
            Some(n) => sys.position(n),
            None => Ok(None),
        }
    };
    Ok((lookup(&detector.pos)?, lookup(&detector.neg)?))
}

/// Positions that open the loop at a controlled source.
///
/// The excitation takes the place of the controlled quantity and the
/// detector measures the controlling quantity:
///
/// | Model | Excitation | Detector |
/// |-------|------------|----------|
/// | E, EZ | branch row `I` | `in+`, `in-` |
/// | G | rows `out-`, `out+` | `in+`, `in-` |
/// | F | rows `out-`, `out+` | column `Ii` |
/// | g | branch row `Io` | `in+`, `in-` |
/// | H, HZ | branch row `Io` | column `Ii` |
pub fn loop_gain_positions(sys: &MnaSystem, reference: &Element) -> Result<Positions> {
    let el = reference;
    let control_voltage = || -> Result<(Option<usize>, Option<usize>)> { Ok((node(sys, el, 2)?, node(sys, el, 3)?)) };
    let input_current = || -> Result<(Option<usize>, Option<usize>)> { Ok((branch(sys, el, Branch::Input)?, None)) };

    let ((src_pos, src_neg), (det_pos, det_neg)) = match el.model {
        Model::Vcvs | Model::VcvsZo => ((branch(sys, el, Branch::Through)?, None), control_voltage()?),
        Model::Vccs => ((node(sys, el, 1)?, node(sys, el, 0)?), control_voltage()?),
        Model::Cccs => ((node(sys, el, 1)?, node(sys, el, 0)?), input_current()?),
        Model::VccsBranch => ((branch(sys, el, Branch::Output)?, None), control_voltage()?),
        Model::Ccvs | Model::CcvsZo => ((branch(sys, el, Branch::Output)?, None), input_current()?),
        other => {
            return Err(SymnaError::InvalidLoopGainReference {
                name: el.refdes.clone(),
                model: other.to_string(),
            })
        }
    };
    Ok(Positions {
        src_pos,
        src_neg,
        det_pos,
        det_neg,
    })
}

/// Resolve the positions an instruction needs.
///
/// Loop-gain types take both from the reference table; `vi` has no single
/// source; the other gain types look up the named source and detector.
pub fn make_src_det_pos(sys: &MnaSystem, circuit: &Circuit, instruction: &Instruction) -> Result<Positions> {
    if instruction.gain_type.is_loop_type() {
        let reference = loop_gain_reference(circuit, instruction.lg_ref.as_deref())?;
        return loop_gain_positions(sys, reference);
    }

    let (det_pos, det_neg) = match &instruction.detector {
        Some(detector) => detector_positions(sys, detector)?,
        None => (None, None),
    };
    let (src_pos, src_neg) = match (&instruction.source, instruction.gain_type) {
        (_, GainType::Vi) | (None, _) => (None, None),
        (Some(name), _) => source_positions(sys, independent_source(circuit, name)?)?,
    };
    Ok(Positions {
        src_pos,
        src_neg,
        det_pos,
        det_neg,
    })
}

/// An independent source by designator.
pub fn independent_source<'c>(circuit: &'c Circuit, name: &str) -> Result<&'c Element> {
    circuit
        .elements
        .get(name)
        .filter(|e| e.model.is_independent_source())
        .ok_or_else(|| SymnaError::UnknownSource { name: name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::solver::MatrixBuilder;
    use crate::symbolic::Expr;

    fn circuit() -> Circuit {
        let mut c = Circuit::new("pos");
        c.add_element(Element::new("V1", Model::VoltageSource, &["in", "0"]));
        c.add_element(Element::new("I1", Model::CurrentSource, &["in", "mid"]));
        c.add_element(Element::new("H1", Model::Ccvs, &["out", "0", "mid", "0"]));
        c.add_element(Element::new("G1", Model::Vccs, &["out", "0", "in", "mid"]).with_value(Expr::symbol("gm")));
        c.add_element(Element::new("R1", Model::Resistor, &["out", "0"]));
        c
    }

    #[test]
    fn test_source_and_detector_positions() {
        let c = circuit();
        let config = AnalysisConfig::default();
        let sys = MatrixBuilder::new(&c, &config).build().unwrap();
        let idx = |n: &str| sys.var_index[n];

        let (p, n) = source_positions(&sys, c.element("I1").unwrap()).unwrap();
        assert_eq!((p, n), (Some(idx("V_mid")), Some(idx("V_in"))));
        let (p, n) = source_positions(&sys, c.element("V1").unwrap()).unwrap();
        assert_eq!((p, n), (Some(idx("I_V1")), None));
        assert!(source_positions(&sys, c.element("R1").unwrap()).is_err());

        let (p, n) = detector_positions(&sys, &Detector::pair("V_out", "V_0")).unwrap();
        assert_eq!((p, n), (Some(idx("V_out")), None));
    }

    #[test]
    fn test_loop_gain_table() {
        let c = circuit();
        let config = AnalysisConfig::default();
        let sys = MatrixBuilder::new(&c, &config).build().unwrap();
        let idx = |n: &str| Some(sys.var_index[n]);

        let h = loop_gain_positions(&sys, c.element("H1").unwrap()).unwrap();
        assert_eq!(h.src_pos, idx("Io_H1"));
        assert_eq!(h.det_pos, idx("Ii_H1"));
        assert_eq!(h.terms().len(), 1);

        let g = loop_gain_positions(&sys, c.element("G1").unwrap()).unwrap();
        assert_eq!((g.src_pos, g.src_neg), (None, idx("V_out")));
        assert_eq!((g.det_pos, g.det_neg), (idx("V_in"), idx("V_mid")));
        assert_eq!(g.terms(), vec![(sys.var_index["V_out"], sys.var_index["V_in"], -1.0), (sys.var_index["V_out"], sys.var_index["V_mid"], 1.0)]);

        assert!(loop_gain_positions(&sys, c.element("R1").unwrap()).is_err());
    }

    #[test]
    fn test_make_positions_for_instruction() {
        let c = circuit();
        let config = AnalysisConfig::default();
        let sys = MatrixBuilder::new(&c, &config).build().unwrap();
        let gain = Instruction::new(super::super::DataType::Laplace, GainType::Gain)
            .with_source("I1")
            .with_detector(Detector::single("V_out"));
        let pos = make_src_det_pos(&sys, &c, &gain).unwrap();
        assert_eq!(pos.terms().len(), 2);

        let bad = gain.clone().with_source("R1");
        assert!(matches!(
            make_src_det_pos(&sys, &c, &bad),
            Err(SymnaError::UnknownSource { .. })
        ));
        let vi = Instruction { gain_type: GainType::Vi, ..gain };
        let pos = make_src_det_pos(&sys, &c, &vi).unwrap();
        assert_eq!((pos.src_pos, pos.src_neg), (None, None));
    }
}
