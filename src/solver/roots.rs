//! Polynomial coefficients, roots and pole/zero cancellation.

use nalgebra::DMatrix;
use num_complex::Complex64;
use tracing::debug;

use crate::error::{Result, SymnaError};
use crate::symbolic::Expr;

/// Dense coefficients of `expr` as a polynomial in `var`, highest degree
/// first, with explicit zeros for missing powers.
///
/// The denominator of `expr` must not depend on `var` and `var` must not
/// occur with negative powers.
pub fn polynomial_coefficients(expr: &Expr, var: &str) -> Result<Vec<Expr>> {
    if expr.is_zero() {
        return Ok(vec![Expr::zero()]);
    }
    let coeffs = expr.coefficients_in(var)?;
    let low = coeffs.keys().next().copied().unwrap_or(0);
    if low < 0 {
        return Err(SymnaError::NotPolynomial {
            var: var.to_string(),
            expr: expr.to_string(),
        });
    }
    let high = coeffs.keys().next_back().copied().unwrap_or(0);
    Ok((0..=high)
        .rev()
        .map(|k| coeffs.get(&k).cloned().unwrap_or_else(Expr::zero))
        .collect())
}

/// Numeric dense coefficients, highest degree first.
pub fn numeric_coefficients(expr: &Expr, var: &str) -> Result<Vec<f64>> {
    polynomial_coefficients(expr, var)?
        .iter()
        .map(|c| {
            c.as_f64().ok_or_else(|| SymnaError::NotNumeric {
                expr: c.to_string(),
            })
        })
        .collect()
}

/// Roots of the polynomial with the given coefficients (highest first).
///
/// Leading zeros are ignored; trailing zeros yield exact roots at the
/// origin. The remaining roots are the eigenvalues of the companion matrix.
pub fn roots(coeffs: &[f64]) -> Vec<Complex64> {
    let start = coeffs.iter().position(|c| *c != 0.0).unwrap_or(coeffs.len());
    let coeffs = &coeffs[start..];
    if coeffs.len() <= 1 {
        return Vec::new();
    }
    let nonzero_end = coeffs.iter().rposition(|c| *c != 0.0).map_or(0, |i| i + 1);
    let zeros_at_origin = coeffs.len() - nonzero_end;
    let reduced = &coeffs[..nonzero_end];

    let mut result = vec![Complex64::new(0.0, 0.0); zeros_at_origin];
    let degree = reduced.len() - 1;
    if degree == 0 {
        return result;
    }
    if degree == 1 {
        result.push(Complex64::new(-reduced[1] / reduced[0], 0.0));
        return result;
    }

    let lead = reduced[0];
    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for j in 0..degree {
        companion[(0, j)] = -reduced[j + 1] / lead;
    }
    for i in 1..degree {
        companion[(i, i - 1)] = 1.0;
    }
    result.extend(companion.complex_eigenvalues().iter().copied());
    debug!(degree, "polynomial roots computed");
    result
}

/// Roots of `expr` as a polynomial in `var`; fails when a coefficient is
/// not numeric.
pub fn expr_roots(expr: &Expr, var: &str) -> Result<Vec<Complex64>> {
    Ok(roots(&numeric_coefficients(expr, var)?))
}

/// Remove coinciding pole/zero pairs.
///
/// A zero cancels a pole when `|p - z| <= tol * max(|p|, |z|)` (exact
/// coincidence for roots at the origin). Zeros are processed in order and
/// each takes the closest unmatched pole; equally close poles go to the
/// lowest index.
pub fn cancel_pole_zero(poles: &[Complex64], zeros: &[Complex64], tol: f64) -> (Vec<Complex64>, Vec<Complex64>) {
    let mut pole_used = vec![false; poles.len()];
    let mut kept_zeros = Vec::with_capacity(zeros.len());

    for z in zeros {
        let mut best: Option<(usize, f64)> = None;
        for (idx, p) in poles.iter().enumerate() {
            if pole_used[idx] {
                continue;
            }
            let distance = (p - z).norm();
            let scale = p.norm().max(z.norm());
            if distance > tol * scale && distance != 0.0 {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
        match best {
            Some((idx, _)) => pole_used[idx] = true,
            None => kept_zeros.push(*z),
        }
    }

    let kept_poles = poles
        .iter()
        .zip(&pole_used)
        .filter(|(_, used)| !**used)
        .map(|(p, _)| *p)
        .collect();
    (kept_poles, kept_zeros)
}

/// Sort roots by magnitude, then by imaginary part.
pub fn sort_roots(roots: &mut [Complex64]) {
    roots.sort_by(|a, b| {
        a.norm()
            .partial_cmp(&b.norm())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.im.partial_cmp(&b.im).unwrap_or(std::cmp::Ordering::Equal))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn real(values: &[f64]) -> Vec<Complex64> {
        values.iter().map(|v| Complex64::new(*v, 0.0)).collect()
    }

    #[test]
    fn test_cancel_pole_zero() {
        let (poles, zeros) = cancel_pole_zero(&real(&[-1.0, -2.0, -3.0]), &real(&[-2.0, -5.0]), 1e-6);
        assert_eq!(poles, real(&[-1.0, -3.0]));
        assert_eq!(zeros, real(&[-5.0]));
    }

    #[test]
    fn test_cancel_prefers_closest_pole() {
        let poles = real(&[-1.0, -1.0 + 1e-9, -1.0 - 1e-12]);
        let zeros = real(&[-1.0 - 1e-12]);
        let (kept, _) = cancel_pole_zero(&poles, &zeros, 1e-6);
        assert_eq!(kept, real(&[-1.0, -1.0 + 1e-9]));
    }

    #[test]
    fn test_polynomial_coefficients() {
        let expr = Expr::parse("a*s^3 + 2*s + 1").unwrap();
        let coeffs = polynomial_coefficients(&expr, "s").unwrap();
        assert_eq!(coeffs.len(), 4);
        assert_eq!(coeffs[0], Expr::symbol("a"));
        assert!(coeffs[1].is_zero());
        assert_eq!(coeffs[2].as_f64(), Some(2.0));
        assert_eq!(coeffs[3].as_f64(), Some(1.0));

        let laurent = Expr::parse("1/s + 1").unwrap();
        assert!(polynomial_coefficients(&laurent, "s").is_err());
        assert!(numeric_coefficients(&expr, "s").is_err());
    }

    #[test]
    fn test_roots_quadratic() {
        // s^2 + 2s + 5 -> -1 +/- 2j
        let mut r = roots(&[1.0, 2.0, 5.0]);
        sort_roots(&mut r);
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0].re, -1.0, epsilon = 1e-10);
        assert_relative_eq!(r[0].im, -2.0, epsilon = 1e-10);
        assert_relative_eq!(r[1].im, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_roots_at_origin_and_leading_zeros() {
        // 0*s^3 + s^2 + 3s + 0 -> {0, -3}
        let mut r = roots(&[0.0, 1.0, 3.0, 0.0]);
        sort_roots(&mut r);
        assert_eq!(r, real(&[0.0, -3.0]));
        assert!(roots(&[4.0]).is_empty());
    }
}
