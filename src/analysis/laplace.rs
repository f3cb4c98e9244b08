//! Presentation of Laplace transfer functions.
//!
//! The canonical [`Expr`] keeps a rational function in one normal form;
//! the normalised and factored shapes are kept beside it as separate
//! structures and rendered as expression trees.

use std::collections::BTreeMap;

use num_complex::Complex64;
use tracing::{debug, warn};

use crate::config::{AnalysisConfig, SimplifyOrder};
use crate::error::{Result, SymnaError};
use crate::solver::roots::{cancel_pole_zero, numeric_coefficients, roots, sort_roots};
use crate::symbolic::{Expr, Node, Poly};

/// Imaginary parts below this fraction of the magnitude are dropped.
const REAL_ROOT_TOLERANCE: f64 = 1e-9;

/// `gain · s^shift · (1 + b₁s + …)/(1 + a₁s + …)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Gain factor
    pub gain: Expr,
    /// Power of the Laplace variable in front
    pub shift: i32,
    /// Numerator coefficients in ascending powers; the first is one
    pub numer: Vec<Expr>,
    /// Denominator coefficients in ascending powers; the first is one
    pub denom: Vec<Expr>,
}

/// `gain · Π(s - zᵢ) / Π(s - pᵢ)` of a numeric transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Factored {
    /// Ratio of the leading coefficients
    pub gain: f64,
    /// Zeros (rad/s)
    pub zeros: Vec<Complex64>,
    /// Poles (rad/s)
    pub poles: Vec<Complex64>,
}

/// A Laplace transfer with its requested presentations.
#[derive(Debug, Clone, PartialEq)]
pub struct Laplace {
    /// Canonical rational function
    pub expr: Expr,
    /// Normalised presentation
    pub normalized: Option<Normalized>,
    /// Factored presentation
    pub factored: Option<Factored>,
    /// Steps that could not be applied
    pub warnings: Vec<String>,
}

impl Laplace {
    /// Preferred presentation as an expression tree.
    pub fn display_tree(&self, var: &str) -> Result<Node> {
        if let Some(f) = &self.factored {
            return Ok(f.to_node(var));
        }
        if let Some(n) = &self.normalized {
            return n.to_node(var);
        }
        Node::parse(&self.expr.to_string())
    }
}

/// Coefficients of the lowest power of `var` in `p` and below.
fn ascending(p: &Poly, var: &str) -> (i32, Vec<Expr>) {
    let coeffs: BTreeMap<i32, Poly> = p.coefficients_in(var);
    let low = coeffs.keys().next().copied().unwrap_or(0);
    let high = coeffs.keys().next_back().copied().unwrap_or(0);
    let out = (low..=high)
        .map(|k| coeffs.get(&k).map_or_else(Expr::zero, |c| Expr::from(c.clone())))
        .collect();
    (low, out)
}

/// Normalise `f` in `var`.
pub fn normalize(f: &Expr, var: &str) -> Result<Normalized> {
    if f.is_zero() {
        return Ok(Normalized {
            gain: Expr::zero(),
            shift: 0,
            numer: vec![Expr::one()],
            denom: vec![Expr::one()],
        });
    }
    let (ln, num) = ascending(f.numer(), var);
    let (ld, den) = ascending(f.denom(), var);
    let (n0, d0) = (num[0].clone(), den[0].clone());
    if n0.is_zero() || d0.is_zero() {
        return Err(SymnaError::NotPolynomial {
            var: var.to_string(),
            expr: f.to_string(),
        });
    }
    Ok(Normalized {
        gain: &n0 / &d0,
        shift: ln - ld,
        numer: num.iter().map(|c| c / &n0).collect(),
        denom: den.iter().map(|c| c / &d0).collect(),
    })
}

fn polynomial_node(coeffs: &[Expr], var: &str) -> Result<Node> {
    let mut out = Node::number(0.0);
    for (k, c) in coeffs.iter().enumerate() {
        if c.is_zero() {
            continue;
        }
        let term = Node::parse(&c.to_string())? * Node::symbol(var).powi(k as i32);
        out = out + term;
    }
    Ok(out)
}

impl Normalized {
    /// `gain * s^shift * N(s) / D(s)` as a tree.
    pub fn to_node(&self, var: &str) -> Result<Node> {
        let gain = Node::parse(&self.gain.to_string())?;
        let shifted = gain * Node::symbol(var).powi(self.shift);
        Ok(shifted * polynomial_node(&self.numer, var)? / polynomial_node(&self.denom, var)?)
    }

    /// Back to a canonical rational function.
    pub fn to_expr(&self, var: &str) -> Expr {
        let s = Expr::symbol(var);
        let poly = |coeffs: &[Expr]| -> Expr {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * s.pow(k as i32))
                .sum()
        };
        &self.gain * &s.pow(self.shift) * poly(&self.numer) / poly(&self.denom)
    }
}

/// Linear and quadratic real factors of a root list.
fn real_factors(roots: &[Complex64], s: &Expr) -> Expr {
    let mut out = Expr::one();
    for r in roots {
        if r.im.abs() <= REAL_ROOT_TOLERANCE * r.norm() {
            out = out * (s - Expr::constant(r.re));
        } else if r.im > 0.0 {
            let quadratic = s * s - Expr::constant(2.0 * r.re) * s + Expr::constant(r.norm_sqr());
            out = out * quadratic;
        }
    }
    out
}

fn root_node(r: &Complex64, var: &str) -> Node {
    let s = Node::symbol(var);
    if r.norm() == 0.0 {
        return s;
    }
    let value = if r.im.abs() <= REAL_ROOT_TOLERANCE * r.norm() {
        Node::number(r.re)
    } else {
        Node::number(r.re) + Node::number(r.im) * Node::Imaginary
    };
    s - value
}

impl Factored {
    /// Factor a transfer with numeric coefficients.
    pub fn of(f: &Expr, var: &str) -> Result<Self> {
        let (num, den) = f.as_polynomial_ratio(var);
        let nc = numeric_coefficients(&Expr::from(num), var)?;
        let dc = numeric_coefficients(&Expr::from(den), var)?;
        let lead = |c: &[f64]| c.iter().copied().find(|x| *x != 0.0).unwrap_or(0.0);
        let (ln, ld) = (lead(&nc), lead(&dc));
        let mut zeros = roots(&nc);
        let mut poles = roots(&dc);
        sort_roots(&mut zeros);
        sort_roots(&mut poles);
        Ok(Factored {
            gain: if ld == 0.0 { f64::NAN } else { ln / ld },
            zeros,
            poles,
        })
    }

    /// Remove coinciding pole/zero pairs.
    pub fn cancelled(self, tol: f64) -> Self {
        let (poles, zeros) = cancel_pole_zero(&self.poles, &self.zeros, tol);
        Factored {
            gain: self.gain,
            zeros,
            poles,
        }
    }

    /// Back to a canonical rational function.
    pub fn to_expr(&self, var: &str) -> Expr {
        let s = Expr::symbol(var);
        Expr::constant(self.gain) * real_factors(&self.zeros, &s) / real_factors(&self.poles, &s)
    }

    /// `gain * Π(s - z) / Π(s - p)` as a tree.
    pub fn to_node(&self, var: &str) -> Node {
        let product = |roots: &[Complex64]| {
            roots
                .iter()
                .fold(Node::number(1.0), |acc, r| acc * root_node(r, var))
        };
        Node::number(self.gain) * product(&self.zeros) / product(&self.poles)
    }
}

#[derive(Clone, Copy)]
enum Step {
    Simplify,
    Factor,
}

/// Build the Laplace presentation of `numer/denom` per the configured
/// options. Factoring and pole/zero simplification need numeric
/// coefficients; for symbolic transfers they are skipped with a warning
/// (exact cancellation is part of the canonical form).
pub fn transform(numer: &Expr, denom: &Expr, config: &AnalysisConfig) -> Result<Laplace> {
    let var = config.laplace.as_str();
    let options = &config.laplace_options;
    let mut expr = numer / denom;
    let mut factored: Option<Factored> = None;
    let mut warnings = Vec::new();
    let numeric = expr.free_symbols().iter().all(|s| s == var);

    let steps = match options.order {
        SimplifyOrder::SimplifyThenFactor => [Step::Simplify, Step::Factor],
        SimplifyOrder::FactorThenSimplify => [Step::Factor, Step::Simplify],
    };

    for step in steps {
        match step {
            Step::Simplify if options.simplify && numeric && !expr.is_zero() => {
                let current = match factored.take() {
                    Some(f) => f,
                    None => Factored::of(&expr, var)?,
                };
                let before = current.poles.len();
                let f = current.cancelled(config.pz_cancel_tolerance);
                // Keep the exact coefficients unless a pair was removed.
                if f.poles.len() != before {
                    expr = f.to_expr(var);
                }
                if options.factor {
                    factored = Some(f);
                }
            }
            Step::Factor if options.factor => {
                if numeric && !expr.is_zero() {
                    if factored.is_none() {
                        factored = Some(Factored::of(&expr, var)?);
                    }
                } else if !numeric {
                    let msg = "factoring skipped: transfer has symbolic coefficients".to_string();
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
            _ => {}
        }
    }

    let normalized = if options.normalize {
        Some(normalize(&expr, var)?)
    } else {
        None
    };
    debug!(
        normalized = normalized.is_some(),
        factored = factored.is_some(),
        "laplace transfer"
    );
    Ok(Laplace {
        expr,
        normalized,
        factored,
        warnings,
    })
}
