//! Analysis results.

use std::collections::BTreeMap;
use std::fmt;

use num_complex::Complex64;

use super::instruction::{DataType, GainType};
use super::laplace::Laplace;
use super::noise::NoiseResult;
use crate::cas::Derived;
use crate::symbolic::{format_number, Expr, Node, SymMatrix};

/// Result of one analysis (one step when stepping).
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// MNA matrix with dependent and independent vectors
    Matrix {
        matrix: SymMatrix,
        dv: Vec<String>,
        iv: Vec<Expr>,
    },
    /// Transfer denominator
    Denom(Expr),
    /// Transfer numerator
    Numer(Expr),
    /// Transfer function of the Laplace variable
    Laplace(Laplace),
    /// Poles in the configured frequency unit
    Poles(Vec<Complex64>),
    /// Zeros in the configured frequency unit
    Zeros(Vec<Complex64>),
    /// Poles and zeros after cancellation with the DC value
    Pz {
        poles: Vec<Complex64>,
        zeros: Vec<Complex64>,
        dc_value: Derived<Expr>,
    },
    /// Dependent variable values, in `Dv` order
    Solve(Derived<Vec<Expr>>),
    /// Transfer at zero frequency
    Dc(Derived<Expr>),
    /// DC values of the dependent variables
    DcSolve(Derived<Vec<Expr>>),
    /// Noise spectra
    Noise(NoiseResult),
    /// DC variance
    DcVar(NoiseResult),
    /// Time-domain response
    Time(Derived<Node>),
    /// The step could not be computed
    Failed(String),
}

impl Response {
    /// True when the computation failed outright.
    pub fn is_failed(&self) -> bool {
        matches!(self, Response::Failed(_))
    }
}

/// Responses of one instruction, one per step.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub data_type: DataType,
    pub gain_type: GainType,
    /// Parameter values of each step; empty without stepping
    pub steps: Vec<BTreeMap<String, f64>>,
    /// Index-aligned with `steps` (a single entry without stepping)
    pub responses: Vec<Response>,
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// The response of an unstepped analysis (the first step otherwise).
    pub fn response(&self) -> Option<&Response> {
        self.responses.first()
    }

    /// True when the instruction had a step specification.
    pub fn is_stepped(&self) -> bool {
        !self.steps.is_empty()
    }
}

fn fmt_complex(c: &Complex64) -> String {
    if c.im == 0.0 {
        format_number(c.re)
    } else if c.im < 0.0 {
        format!("{} - {}*I", format_number(c.re), format_number(-c.im))
    } else {
        format!("{} + {}*I", format_number(c.re), format_number(c.im))
    }
}

fn fmt_roots(f: &mut fmt::Formatter<'_>, label: &str, roots: &[Complex64]) -> fmt::Result {
    writeln!(f, "{} ({}):", label, roots.len())?;
    for r in roots {
        writeln!(f, "  {}", fmt_complex(r))?;
    }
    Ok(())
}

fn fmt_derived<T>(f: &mut fmt::Formatter<'_>, label: &str, value: &Derived<T>, show: impl Fn(&T) -> String) -> fmt::Result {
    match value {
        Derived::Computed(v) => writeln!(f, "{} = {}", label, show(v)),
        Derived::Fallback { value, reason } => writeln!(f, "{} = {}  (fallback: {})", label, show(value), reason),
        Derived::Unavailable { reason } => writeln!(f, "{}: unavailable ({})", label, reason),
    }
}

fn fmt_noise(f: &mut fmt::Formatter<'_>, result: &NoiseResult) -> fmt::Result {
    let (out, inp) = if result.is_variance {
        ("ovar", "ivar")
    } else {
        ("onoise", "inoise")
    };
    writeln!(f, "{} = {}", out, result.onoise)?;
    for (source, term) in &result.onoise_terms {
        writeln!(f, "  {}: {}", source, term)?;
    }
    if let Some(inoise) = &result.inoise {
        writeln!(f, "{} = {}", inp, inoise)?;
        for (source, term) in &result.inoise_terms {
            writeln!(f, "  {}: {}", source, term)?;
        }
    }
    Ok(())
}

fn join(values: &[Expr]) -> String {
    values.iter().map(Expr::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Matrix { matrix, dv, iv } => {
                writeln!(f, "Dv = [{}]", dv.join(", "))?;
                writeln!(f, "Iv = [{}]", join(iv))?;
                writeln!(f, "M =")?;
                writeln!(f, "{}", matrix)
            }
            Response::Denom(e) => writeln!(f, "denom = {}", e),
            Response::Numer(e) => writeln!(f, "numer = {}", e),
            Response::Laplace(l) => {
                writeln!(f, "laplace = {}", l.expr)?;
                if let Some(n) = &l.normalized {
                    writeln!(f, "  gain = {}, s^{}", n.gain, n.shift)?;
                    writeln!(f, "  numer coefficients = [{}]", join(&n.numer))?;
                    writeln!(f, "  denom coefficients = [{}]", join(&n.denom))?;
                }
                if let Some(fac) = &l.factored {
                    writeln!(f, "  factored gain = {}", format_number(fac.gain))?;
                    fmt_roots(f, "  zeros", &fac.zeros)?;
                    fmt_roots(f, "  poles", &fac.poles)?;
                }
                Ok(())
            }
            Response::Poles(p) => fmt_roots(f, "poles", p),
            Response::Zeros(z) => fmt_roots(f, "zeros", z),
            Response::Pz { poles, zeros, dc_value } => {
                fmt_roots(f, "poles", poles)?;
                fmt_roots(f, "zeros", zeros)?;
                fmt_derived(f, "DC value", dc_value, Expr::to_string)
            }
            Response::Solve(v) => fmt_derived(f, "solution", v, |v| format!("[{}]", join(v))),
            Response::Dc(v) => fmt_derived(f, "dc", v, Expr::to_string),
            Response::DcSolve(v) => fmt_derived(f, "dc solution", v, |v| format!("[{}]", join(v))),
            Response::Noise(n) | Response::DcVar(n) => fmt_noise(f, n),
            Response::Time(v) => fmt_derived(f, "response", v, Node::to_string),
            Response::Failed(reason) => writeln!(f, "failed: {}", reason),
        }
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {} ({})", self.data_type, self.gain_type)?;
        if self.steps.is_empty() {
            for response in &self.responses {
                write!(f, "{}", response)?;
            }
        } else {
            for (step, response) in self.steps.iter().zip(&self.responses) {
                let values: Vec<String> = step
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, format_number(*v)))
                    .collect();
                writeln!(f, "## {}", values.join(", "))?;
                write!(f, "{}", response)?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roots_and_fallbacks() {
        let r = Response::Pz {
            poles: vec![Complex64::new(-1.0, 2.0), Complex64::new(-1.0, -2.0)],
            zeros: vec![],
            dc_value: Derived::Fallback {
                value: Expr::constant(0.5),
                reason: "limit failed".to_string(),
            },
        };
        let text = r.to_string();
        assert!(text.contains("poles (2):"));
        assert!(text.contains("zeros (0):"));
        assert!(text.contains("fallback: limit failed"));
        assert!(!Response::Failed("x".into()).to_string().is_empty());
        assert!(Response::Failed("x".into()).is_failed());
    }
}
