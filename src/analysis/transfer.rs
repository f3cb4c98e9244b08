//! Transfer numerators, denominators and their roots.

use num_complex::Complex64;
use tracing::debug;

use super::instruction::{Detector, GainType};
use super::positions::Positions;
use crate::cas::{Derived, SymbolicBackend};
use crate::config::AnalysisConfig;
use crate::error::{Result, SymnaError};
use crate::solver::{cancel_pole_zero, cramer_substitute, determinant_with, roots, MnaSystem};
use crate::symbolic::{Expr, SymMatrix};

/// Numerator and denominator of the loop-gain reference's value.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceValue {
    /// `N_ref`
    pub numer: Expr,
    /// `D_ref`
    pub denom: Expr,
}

/// Determinant helpers bound to one configuration and backend.
pub struct Determinants<'a> {
    config: &'a AnalysisConfig,
    backend: &'a dyn SymbolicBackend,
}

impl<'a> Determinants<'a> {
    /// Bind `config` and `backend`.
    pub fn new(config: &'a AnalysisConfig, backend: &'a dyn SymbolicBackend) -> Self {
        Self { config, backend }
    }

    /// `det(m)` with the configured method.
    pub fn det(&self, m: &SymMatrix) -> Expr {
        determinant_with(m, self.config.determinant_method, self.backend)
    }

    /// `(-1)^(i+j) · det(m without row i and column j)`.
    pub fn cofactor(&self, m: &SymMatrix, row: usize, col: usize) -> Expr {
        let minor = self.det(&m.without(row, col));
        if (row + col) % 2 == 0 {
            minor
        } else {
            -minor
        }
    }

    /// Four-term signed cofactor sum of `positions`.
    pub fn cofactor_sum(&self, m: &SymMatrix, positions: &Positions) -> Expr {
        positions
            .terms()
            .into_iter()
            .map(|(row, col, sign)| {
                let c = self.cofactor(m, row, col);
                if sign < 0.0 {
                    -c
                } else {
                    c
                }
            })
            .sum::<Expr>()
    }

    /// Denominator of a transfer.
    ///
    /// `loopgain` scales `det(M)` by `D_ref`; `servo` also subtracts the
    /// loop-gain numerator: `D_ref·det(M) - N_ref·cof`.
    pub fn denominator(
        &self,
        sys: &MnaSystem,
        gain_type: GainType,
        reference: Option<&ReferenceValue>,
        positions: &Positions,
    ) -> Result<Expr> {
        let det = self.det(&sys.matrix);
        Ok(match gain_type {
            GainType::LoopGain => &require_reference(reference)?.denom * &det,
            GainType::Servo => {
                let r = require_reference(reference)?;
                &r.denom * &det - &r.numer * &self.cofactor_sum(&sys.matrix, positions)
            }
            _ => det,
        })
    }

    /// Numerator of a transfer.
    ///
    /// `vi` replaces the detector columns by `Iv` (Cramer's rule); the other
    /// gain types use the source/detector cofactor sum.
    pub fn numerator(
        &self,
        sys: &MnaSystem,
        gain_type: GainType,
        reference: Option<&ReferenceValue>,
        positions: &Positions,
    ) -> Result<Expr> {
        Ok(match gain_type {
            GainType::Vi => {
                let column = |col: Option<usize>| match col {
                    Some(c) => self.det(&cramer_substitute(&sys.matrix, &sys.iv, c)),
                    None => Expr::zero(),
                };
                column(positions.det_pos) - column(positions.det_neg)
            }
            GainType::LoopGain => &require_reference(reference)?.numer * &self.cofactor_sum(&sys.matrix, positions),
            GainType::Servo => -(&require_reference(reference)?.numer * &self.cofactor_sum(&sys.matrix, positions)),
            GainType::Gain | GainType::Asymptotic | GainType::Direct => self.cofactor_sum(&sys.matrix, positions),
        })
    }

    /// Response of one detector to all sources, `det(M_det)/det(M)`.
    pub fn detector_response(&self, sys: &MnaSystem, detector: &Detector) -> Result<Expr> {
        let det = self.det(&sys.matrix);
        let mut numer = Expr::zero();
        for (name, sign) in detector.sides() {
            if let Some(col) = sys.position(name)? {
                let d = self.det(&cramer_substitute(&sys.matrix, &sys.iv, col));
                numer = if sign < 0.0 { numer - d } else { numer + d };
            }
        }
        Ok(numer / det)
    }
}

fn require_reference(reference: Option<&ReferenceValue>) -> Result<&ReferenceValue> {
    reference.ok_or_else(|| SymnaError::invalid_instruction("loop-gain reference value missing"))
}

/// Roots of the numerator polynomial of `expr` in `var`.
pub fn polynomial_roots(expr: &Expr, var: &str) -> Result<Vec<Complex64>> {
    let (num, _) = expr.as_polynomial_ratio(var);
    crate::solver::roots::expr_roots(&Expr::from(num), var)
}

/// Scale roots to the configured frequency unit.
pub fn report_roots(roots: Vec<Complex64>, config: &AnalysisConfig) -> Vec<Complex64> {
    let scale = config.report_frequency(1.0);
    let mut out: Vec<Complex64> = roots.into_iter().map(|r| r * scale).collect();
    crate::solver::roots::sort_roots(&mut out);
    out
}

/// Poles and zeros of `numer/denom` after cancellation, in rad/s.
pub fn poles_and_zeros(numer: &Expr, denom: &Expr, config: &AnalysisConfig) -> Result<(Vec<Complex64>, Vec<Complex64>)> {
    let s = config.laplace.as_str();
    let f = numer / denom;
    let (num, den) = f.as_polynomial_ratio(s);
    let zeros = roots(&crate::solver::roots::numeric_coefficients(&Expr::from(num), s)?);
    let poles = roots(&crate::solver::roots::numeric_coefficients(&Expr::from(den), s)?);
    let (poles, zeros) = cancel_pole_zero(&poles, &zeros, config.pz_cancel_tolerance);
    debug!(poles = poles.len(), zeros = zeros.len(), "poles and zeros after cancellation");
    Ok((poles, zeros))
}

/// Value of `expr` at `var = 0`: the backend limit, or plain substitution
/// when the limit fails.
pub fn zero_frequency_value(expr: &Expr, var: &str, backend: &dyn SymbolicBackend) -> Derived<Expr> {
    Derived::or_fallback("limit at zero frequency", backend.limit(expr, var, 0.0), || {
        let value = expr.substitute(var, &Expr::zero());
        (!value.is_undefined()).then_some(value)
    })
}

/// `M⁻¹ · Iv` through the backend, falling back to Cramer's rule.
pub fn solve_system(sys: &MnaSystem, dets: &Determinants<'_>, backend: &dyn SymbolicBackend) -> Derived<Vec<Expr>> {
    Derived::or_fallback("linear solve", backend.solve_linear(&sys.matrix, &sys.iv), || {
        let det = dets.det(&sys.matrix);
        if det.is_zero() {
            return None;
        }
        Some(
            (0..sys.dim())
                .map(|col| dets.det(&cramer_substitute(&sys.matrix, &sys.iv, col)) / &det)
                .collect(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::NativeBackend;
    use crate::circuit::{Circuit, Element, Model};
    use crate::solver::MatrixBuilder;
    use approx::assert_relative_eq;

    fn rc() -> Circuit {
        let mut c = Circuit::new("rc");
        c.add_element(Element::new("V1", Model::VoltageSource, &["in", "0"]).with_value(Expr::one()));
        c.add_element(Element::new("R1", Model::Resistor, &["in", "out"]).with_value(Expr::constant(1e3)));
        c.add_element(Element::new("C1", Model::Capacitor, &["out", "0"]).with_value(Expr::constant(1e-6)));
        c
    }

    #[test]
    fn test_rc_gain_and_pole() {
        let c = rc();
        let config = AnalysisConfig::default().with_hz(false);
        let backend = NativeBackend::new();
        let dets = Determinants::new(&config, &backend);
        let sys = MatrixBuilder::new(&c, &config).build().unwrap();
        let positions = Positions {
            src_pos: Some(sys.var_index["I_V1"]),
            det_pos: Some(sys.var_index["V_out"]),
            ..Default::default()
        };
        let numer = dets.numerator(&sys, GainType::Gain, None, &positions).unwrap();
        let denom = dets.denominator(&sys, GainType::Gain, None, &positions).unwrap();
        let h = &numer / &denom;
        assert_relative_eq!(h.substitute("s", &Expr::zero()).as_f64().unwrap(), 1.0, max_relative = 1e-12);

        let (poles, zeros) = poles_and_zeros(&numer, &denom, &config).unwrap();
        assert!(zeros.is_empty());
        assert_eq!(poles.len(), 1);
        assert_relative_eq!(poles[0].re, -1e3, max_relative = 1e-9);

        let at = |e: &Expr, s: f64| e.substitute("s", &Expr::constant(s)).as_f64().unwrap();
        let vi = dets.numerator(&sys, GainType::Vi, None, &positions).unwrap();
        let vi = &vi / &denom;
        for s in [0.0, 1e3, 1e5] {
            assert_relative_eq!(at(&vi, s), at(&h, s), max_relative = 1e-9);
        }

        let solved = solve_system(&sys, &dets, &backend).into_value().unwrap();
        assert_eq!(solved.len(), 3);
        assert_relative_eq!(at(&solved[0], 1e3), 1.0, max_relative = 1e-9);
        assert_relative_eq!(at(&solved[1], 0.0), 1.0, max_relative = 1e-9);
    }

    #[test]
    fn test_zero_frequency_value_handles_removable_singularity() {
        let backend = NativeBackend::new();
        let f = Expr::parse("s/(s*(1+s))").unwrap();
        let v = zero_frequency_value(&f, "s", &backend);
        assert!(v.value().unwrap().is_one());
    }
}
