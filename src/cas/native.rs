//! In-process symbolic backend.

use num_complex::Complex64;
use tracing::debug;

use super::{CasError, SymbolicBackend};
use crate::solver::determinant::{bareiss, cramer_substitute, determinant};
use crate::solver::roots::{numeric_coefficients, roots};
use crate::symbolic::{Expr, Node, SymMatrix};

/// Relative distance below which two computed poles are one repeated pole.
const POLE_CLUSTER_TOLERANCE: f64 = 1e-5;

/// Maximum bisection depth of the adaptive Simpson rule.
const MAX_SIMPSON_DEPTH: usize = 48;

/// Backend that performs every operation natively.
///
/// Inverse Laplace transforms use a numeric partial-fraction expansion and
/// therefore need numeric coefficients; integrals of non-polynomial
/// integrands are evaluated with adaptive Simpson quadrature.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    /// Absolute tolerance of numeric integration.
    pub integration_tolerance: f64,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            integration_tolerance: 1e-12,
        }
    }
}

impl NativeBackend {
    /// Create a backend with default tolerances.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SymbolicBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn determinant(&self, m: &SymMatrix) -> Result<Expr, CasError> {
        if !m.is_square() {
            return Err(CasError::unsupported("determinant of a non-square matrix"));
        }
        Ok(bareiss(m))
    }

    fn limit(&self, expr: &Expr, var: &str, point: f64) -> Result<Expr, CasError> {
        if !expr.depends_on(var) {
            return Ok(expr.clone());
        }
        if point != 0.0 {
            let value = expr.substitute(var, &Expr::constant(point));
            if value.is_undefined() {
                return Err(CasError::unsupported(format!("limit {} -> {} is indeterminate", var, point)));
            }
            return Ok(value);
        }
        let (num, den) = expr.as_polynomial_ratio(var);
        let low_num = num.low_degree_in(var).unwrap_or(0);
        let low_den = den.low_degree_in(var).unwrap_or(0);
        if low_num > low_den {
            return Ok(Expr::zero());
        }
        if low_den > low_num {
            return Err(CasError::unsupported(format!("limit {} -> 0 diverges", var)));
        }
        let n0 = num.coefficients_in(var).remove(&low_num).unwrap_or_default();
        let d0 = den.coefficients_in(var).remove(&low_den).unwrap_or_default();
        Ok(Expr::new(n0, d0))
    }

    fn inverse_laplace(&self, expr: &Expr, s: &str, t: &str) -> Result<Node, CasError> {
        let (num, den) = expr.as_polynomial_ratio(s);
        let numeric = |p: crate::symbolic::Poly| {
            numeric_coefficients(&Expr::from(p), s)
                .map_err(|_| CasError::unsupported("inverse Laplace transform needs numeric coefficients"))
        };
        let num = numeric(num)?;
        let den = numeric(den)?;
        let (quotient, remainder) = poly_divide(&num, &den);

        let mut result = Node::number(0.0);
        match quotient.len() {
            0 => {}
            1 => result = Node::number(quotient[0]) * Node::call("delta", Node::symbol(t)),
            _ => return Err(CasError::unsupported("improper function: derivatives of the impulse")),
        }
        if remainder.iter().all(|c| *c == 0.0) {
            return Ok(result);
        }

        let poles = cluster_poles(&roots(&den));
        debug!(poles = poles.len(), "partial fraction expansion");
        let lead = den.iter().find(|c| **c != 0.0).copied().unwrap_or(1.0);
        let num_c: Vec<Complex64> = remainder.iter().map(|c| Complex64::new(*c, 0.0)).collect();

        for (idx, pole) in poles.iter().enumerate() {
            if pole.value.im < 0.0 {
                // Covered by the conjugate.
                continue;
            }
            let mut others = vec![Complex64::new(lead, 0.0)];
            for (jdx, other) in poles.iter().enumerate() {
                if jdx != idx {
                    for _ in 0..other.multiplicity {
                        others = mul_linear(&others, other.value);
                    }
                }
            }
            let m = pole.multiplicity;
            let n_series = taylor(&num_c, pole.value, m);
            let q_series = taylor(&others, pole.value, m);
            let g = series_divide(&n_series, &q_series);
            for j in 1..=m {
                let c = g[m - j];
                if c.norm() == 0.0 {
                    continue;
                }
                result = result + time_term(c, pole.value, j, t);
            }
        }
        Ok(result)
    }

    fn integrate(&self, expr: &Expr, var: &str, lower: f64, upper: f64) -> Result<Expr, CasError> {
        if !expr.depends_on(var) {
            if lower.is_infinite() || upper.is_infinite() {
                return Err(CasError::unsupported("integral over an infinite range diverges"));
            }
            return Ok(expr * Expr::constant(upper - lower));
        }
        if !expr.denom().depends_on(var) && expr.numer().low_degree_in(var).unwrap_or(0) >= 0 {
            if lower.is_infinite() || upper.is_infinite() {
                return Err(CasError::unsupported("integral of a polynomial over an infinite range"));
            }
            let coeffs = expr
                .coefficients_in(var)
                .map_err(|err| CasError::unsupported(err.to_string()))?;
            let total: Expr = coeffs
                .into_iter()
                .map(|(k, c)| {
                    let k1 = k + 1;
                    c * Expr::constant((upper.powi(k1) - lower.powi(k1)) / k1 as f64)
                })
                .sum();
            return Ok(total);
        }
        let symbols = expr.free_symbols();
        if symbols.iter().any(|name| name != var) {
            return Err(CasError::unsupported("numeric integration of a symbolic integrand"));
        }
        if lower.is_infinite() || upper.is_infinite() {
            return Err(CasError::unsupported("numeric integration over an infinite range"));
        }
        let f = |x: f64| expr.eval_with(&|_| Some(x)).unwrap_or(f64::NAN);
        let value = adaptive_simpson(&f, lower, upper, self.integration_tolerance);
        if value.is_finite() {
            Ok(Expr::constant(value))
        } else {
            Err(CasError::unsupported("integral does not converge"))
        }
    }

    fn solve_linear(&self, m: &SymMatrix, rhs: &[Expr]) -> Result<Vec<Expr>, CasError> {
        if !m.is_square() || rhs.len() != m.rows() {
            return Err(CasError::unsupported("linear system dimensions do not match"));
        }
        let det = determinant(m);
        if det.is_zero() {
            return Err(CasError::unsupported("singular matrix"));
        }
        Ok((0..m.cols())
            .map(|col| determinant(&cramer_substitute(m, rhs, col)) / &det)
            .collect())
    }
}

/// A distinct pole and its multiplicity.
#[derive(Debug, Clone, Copy)]
struct Pole {
    value: Complex64,
    multiplicity: usize,
}

fn cluster_poles(roots: &[Complex64]) -> Vec<Pole> {
    let mut clusters: Vec<(Complex64, usize)> = Vec::new();
    for r in roots {
        let found = clusters.iter_mut().find(|(sum, count)| {
            let center = *sum / *count as f64;
            let scale = center.norm().max(r.norm());
            (center - r).norm() <= POLE_CLUSTER_TOLERANCE * scale
        });
        match found {
            Some((sum, count)) => {
                *sum += r;
                *count += 1;
            }
            None => clusters.push((*r, 1)),
        }
    }
    clusters
        .into_iter()
        .map(|(sum, count)| {
            let mut value = sum / count as f64;
            if value.im.abs() <= 1e-9 * value.norm() {
                value.im = 0.0;
            }
            Pole {
                value,
                multiplicity: count,
            }
        })
        .collect()
}

/// Long division of real polynomials (highest degree first).
fn poly_divide(num: &[f64], den: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let den_start = den.iter().position(|c| *c != 0.0).unwrap_or(den.len());
    let den = &den[den_start..];
    let num_start = num.iter().position(|c| *c != 0.0).unwrap_or(num.len());
    let mut rem: Vec<f64> = num[num_start..].to_vec();
    if den.is_empty() || rem.len() < den.len() {
        return (Vec::new(), rem);
    }
    let steps = rem.len() - den.len() + 1;
    let mut quotient = Vec::with_capacity(steps);
    for i in 0..steps {
        let q = rem[i] / den[0];
        for (j, d) in den.iter().enumerate() {
            rem[i + j] -= q * d;
        }
        rem[i] = 0.0;
        quotient.push(q);
    }
    let remainder = rem[steps..].to_vec();
    (quotient, remainder)
}

/// Multiply a polynomial (highest degree first) by `(s - root)`.
fn mul_linear(p: &[Complex64], root: Complex64) -> Vec<Complex64> {
    let mut out = Vec::with_capacity(p.len() + 1);
    out.push(p[0]);
    for i in 1..p.len() {
        out.push(p[i] - root * p[i - 1]);
    }
    out.push(-root * p[p.len() - 1]);
    out
}

/// First `terms` Taylor coefficients of a polynomial around `point`.
fn taylor(p: &[Complex64], point: Complex64, terms: usize) -> Vec<Complex64> {
    let mut coeffs = p.to_vec();
    let mut out = Vec::with_capacity(terms);
    for _ in 0..terms {
        if coeffs.is_empty() {
            out.push(Complex64::new(0.0, 0.0));
            continue;
        }
        let mut acc = Complex64::new(0.0, 0.0);
        let mut quotient = Vec::with_capacity(coeffs.len().saturating_sub(1));
        for (i, c) in coeffs.iter().enumerate() {
            acc = acc * point + c;
            if i + 1 < coeffs.len() {
                quotient.push(acc);
            }
        }
        out.push(acc);
        coeffs = quotient;
    }
    out
}

/// Power series quotient `a / b`, truncated to `a.len()` terms.
fn series_divide(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    let mut out: Vec<Complex64> = Vec::with_capacity(a.len());
    for k in 0..a.len() {
        let mut value = a[k];
        for i in 1..=k {
            value -= b[i] * out[k - i];
        }
        out.push(value / b[0]);
    }
    out
}

/// Time-domain term of `c / (s - p)^j`, combined with its conjugate for
/// complex poles.
fn time_term(c: Complex64, p: Complex64, j: usize, t: &str) -> Node {
    let factorial: f64 = (1..j).map(|k| k as f64).product();
    let power = Node::symbol(t).powi(j as i32 - 1);
    let decay = if p.re == 0.0 {
        Node::number(1.0)
    } else {
        Node::call("exp", Node::number(p.re) * Node::symbol(t))
    };
    if p.im == 0.0 {
        return Node::number(c.re / factorial) * power * decay;
    }
    let wt = Node::number(p.im) * Node::symbol(t);
    let oscillation = Node::number(c.re) * Node::call("cos", wt.clone())
        - Node::number(c.im) * Node::call("sin", wt);
    Node::number(2.0 / factorial) * power * decay * oscillation
}

fn adaptive_simpson(f: &dyn Fn(f64) -> f64, a: f64, b: f64, tol: f64) -> f64 {
    let fa = f(a);
    let fb = f(b);
    let m = 0.5 * (a + b);
    let fm = f(m);
    let whole = (b - a) / 6.0 * (fa + 4.0 * fm + fb);
    simpson_step(f, a, b, fa, fm, fb, whole, tol, MAX_SIMPSON_DEPTH)
}

#[allow(clippy::too_many_arguments)]
fn simpson_step(
    f: &dyn Fn(f64) -> f64,
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    tol: f64,
    depth: usize,
) -> f64 {
    let m = 0.5 * (a + b);
    let lm = 0.5 * (a + m);
    let rm = 0.5 * (m + b);
    let flm = f(lm);
    let frm = f(rm);
    let left = (m - a) / 6.0 * (fa + 4.0 * flm + fm);
    let right = (b - m) / 6.0 * (fm + 4.0 * frm + fb);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= 15.0 * tol {
        return left + right + delta / 15.0;
    }
    simpson_step(f, a, m, fa, flm, fm, left, tol / 2.0, depth - 1)
        + simpson_step(f, m, b, fm, frm, fb, right, tol / 2.0, depth - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at_time(node: &Node, t: f64) -> f64 {
        node.eval_real(&|name| if name == "t" { Some(t) } else { None }).unwrap()
    }

    fn e(text: &str) -> Expr {
        Expr::parse(text).unwrap()
    }

    #[test]
    fn test_limit_at_zero() {
        let backend = NativeBackend::new();
        let h = e("R2/(R1 + R2 + s*C*R1*R2)");
        assert_eq!(backend.limit(&h, "s", 0.0).unwrap(), e("R2/(R1 + R2)"));
        assert!(backend.limit(&e("s/(1 + s)"), "s", 0.0).unwrap().is_zero());
        assert!(backend.limit(&e("1/s"), "s", 0.0).is_err());
    }

    #[test]
    fn test_inverse_laplace_first_order() {
        let backend = NativeBackend::new();
        // Step response of 1/(1 + s): 1 - exp(-t)
        let step = backend.inverse_laplace(&e("1/(s*(1 + s))"), "s", "t").unwrap();
        for t in [0.0, 0.5, 2.0] {
            assert_relative_eq!(at_time(&step, t), 1.0 - (-t as f64).exp(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_inverse_laplace_complex_pair() {
        let backend = NativeBackend::new();
        // 1/(s^2 + 2s + 5) -> exp(-t)*sin(2t)/2
        let h = backend.inverse_laplace(&e("1/(s^2 + 2*s + 5)"), "s", "t").unwrap();
        for t in [0.1, 1.0, 3.0] {
            let expected = (-t as f64).exp() * (2.0 * t as f64).sin() / 2.0;
            assert_relative_eq!(at_time(&h, t), expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_inverse_laplace_repeated_pole() {
        let backend = NativeBackend::new();
        // 1/(s + 1)^2 -> t*exp(-t)
        let h = backend.inverse_laplace(&e("1/(s + 1)^2"), "s", "t").unwrap();
        for t in [0.5, 1.0, 4.0] {
            assert_relative_eq!(at_time(&h, t), t * (-t as f64).exp(), epsilon = 1e-5);
        }
        assert!(backend.inverse_laplace(&e("1/(s + a)"), "s", "t").is_err());
    }

    #[test]
    fn test_integrate_polynomial_and_numeric() {
        let backend = NativeBackend::new();
        let value = backend.integrate(&e("N0"), "f", 10.0, 1010.0).unwrap();
        assert_eq!(value, e("1000*N0"));
        let value = backend.integrate(&e("3*f^2"), "f", 0.0, 2.0).unwrap();
        assert_relative_eq!(value.as_f64().unwrap(), 8.0, max_relative = 1e-12);
        let value = backend.integrate(&e("1/(1 + f^2)"), "f", 0.0, 1.0).unwrap();
        assert_relative_eq!(value.as_f64().unwrap(), std::f64::consts::FRAC_PI_4, epsilon = 1e-9);
    }

    #[test]
    fn test_solve_linear() {
        let backend = NativeBackend::new();
        let m = SymMatrix::from_rows(vec![
            vec![e("1/R1 + 1/R2"), e("-1/R2")],
            vec![e("-1/R2"), e("1/R2")],
        ]);
        let x = backend.solve_linear(&m, &[e("Iin"), Expr::zero()]).unwrap();
        assert_eq!(x[0], e("Iin*R1"));
        assert_eq!(x[1], e("Iin*R1"));
    }
}
