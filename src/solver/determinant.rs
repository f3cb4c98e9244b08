//! Symbolic determinants, minors, cofactors and Cramer's rule.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::cas::SymbolicBackend;
use crate::config::DeterminantMethod;
use crate::symbolic::{Expr, SymMatrix};

/// Largest dimension handled by the memoised minor expansion.
const MAX_MINORS_DIMENSION: usize = 128;

/// Determinant by expansion along the first row, skipping zero entries.
///
/// Sub-determinants are memoised on the set of remaining columns, so the
/// cost is bounded by the number of distinct column subsets reached.
pub fn determinant(m: &SymMatrix) -> Expr {
    let n = m.rows();
    if n == 0 {
        return Expr::one();
    }
    if n > MAX_MINORS_DIMENSION {
        return bareiss(m);
    }
    let mut memo = HashMap::new();
    expand(m, 0, full_mask(n), &mut memo)
}

fn full_mask(n: usize) -> u128 {
    if n >= 128 {
        u128::MAX
    } else {
        (1u128 << n) - 1
    }
}

fn expand(m: &SymMatrix, row: usize, cols: u128, memo: &mut HashMap<u128, Expr>) -> Expr {
    let remaining: Vec<usize> = (0..m.cols()).filter(|&c| cols & (1u128 << c) != 0).collect();
    match remaining.len() {
        0 => return Expr::one(),
        1 => return m.get(row, remaining[0]).clone(),
        2 => return det2(m, row, remaining[0], remaining[1]),
        _ => {}
    }
    if let Some(cached) = memo.get(&cols) {
        return cached.clone();
    }

    let mut total = Expr::zero();
    for (position, &col) in remaining.iter().enumerate() {
        let entry = m.get(row, col);
        if entry.is_zero() {
            continue;
        }
        let sub = expand(m, row + 1, cols & !(1u128 << col), memo);
        if sub.is_zero() {
            continue;
        }
        let term = entry * &sub;
        total = if position % 2 == 0 { total + term } else { total - term };
    }
    memo.insert(cols, total.clone());
    total
}

fn det2(m: &SymMatrix, row: usize, c0: usize, c1: usize) -> Expr {
    let a = m.get(row, c0);
    let b = m.get(row, c1);
    let c = m.get(row + 1, c0);
    let d = m.get(row + 1, c1);
    let main = if a.is_zero() || d.is_zero() {
        Expr::zero()
    } else {
        a * d
    };
    let anti = if b.is_zero() || c.is_zero() {
        Expr::zero()
    } else {
        b * c
    };
    main - anti
}

/// Determinant by fraction-free (Bareiss) elimination with row pivoting
/// on nonzero entries.
pub fn bareiss(m: &SymMatrix) -> Expr {
    let n = m.rows();
    if n == 0 {
        return Expr::one();
    }
    let mut a: Vec<Vec<Expr>> = (0..n).map(|r| m.row(r).to_vec()).collect();
    let mut sign = 1.0;
    let mut previous = Expr::one();

    for k in 0..n - 1 {
        if a[k][k].is_zero() {
            match (k + 1..n).find(|&r| !a[r][k].is_zero()) {
                Some(r) => {
                    a.swap(k, r);
                    sign = -sign;
                }
                None => return Expr::zero(),
            }
        }
        for i in k + 1..n {
            for j in k + 1..n {
                let value = &a[k][k] * &a[i][j] - &a[i][k] * &a[k][j];
                a[i][j] = value / &previous;
            }
            a[i][k] = Expr::zero();
        }
        previous = a[k][k].clone();
    }
    Expr::constant(sign) * &a[n - 1][n - 1]
}

/// Determinant computed with the configured method.
///
/// `DeterminantMethod::Backend` falls back to minor expansion when the
/// backend fails.
pub fn determinant_with(m: &SymMatrix, method: DeterminantMethod, backend: &dyn SymbolicBackend) -> Expr {
    debug!(dimension = m.rows(), ?method, "computing determinant");
    match method {
        DeterminantMethod::Minors => determinant(m),
        DeterminantMethod::Bareiss => bareiss(m),
        DeterminantMethod::Backend => match backend.determinant(m) {
            Ok(det) => det,
            Err(err) => {
                warn!(backend = backend.name(), error = %err, "backend determinant failed, expanding by minors");
                determinant(m)
            }
        },
    }
}

/// Determinant of `m` with row `row` and column `col` removed.
pub fn minor(m: &SymMatrix, row: usize, col: usize) -> Expr {
    determinant(&m.without(row, col))
}

/// Signed minor `(-1)^(row+col) * minor(m, row, col)`.
pub fn cofactor(m: &SymMatrix, row: usize, col: usize) -> Expr {
    let value = minor(m, row, col);
    if (row + col) % 2 == 0 {
        value
    } else {
        -value
    }
}

/// `m` with column `col` replaced by `column`, as used by Cramer's rule.
pub fn cramer_substitute(m: &SymMatrix, column: &[Expr], col: usize) -> SymMatrix {
    m.with_column(col, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    /// Deterministic pseudo-random values in [-1, 1).
    fn lcg(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }

    fn numeric_matrix(n: usize, seed: &mut u64) -> (SymMatrix, nalgebra::DMatrix<f64>) {
        let mut rows = Vec::new();
        let mut values = Vec::new();
        for _ in 0..n {
            let mut row = Vec::new();
            for _ in 0..n {
                // Sprinkle exact zeros to exercise the skipping paths.
                let v = if lcg(seed) > 0.6 { 0.0 } else { lcg(seed) };
                row.push(Expr::constant(v));
                values.push(v);
            }
            rows.push(row);
        }
        (
            SymMatrix::from_rows(rows),
            nalgebra::DMatrix::from_row_slice(n, n, &values),
        )
    }

    #[test]
    fn test_determinant_matches_lu_reference() {
        let mut seed = 42;
        for n in 1..=6 {
            for _ in 0..5 {
                let (m, reference) = numeric_matrix(n, &mut seed);
                let expected = reference.determinant();
                let minors = determinant(&m).as_f64().unwrap();
                let elim = bareiss(&m).as_f64().unwrap();
                assert_relative_eq!(minors, expected, epsilon = 1e-12, max_relative = 1e-9);
                assert_relative_eq!(elim, expected, epsilon = 1e-12, max_relative = 1e-9);
            }
        }
    }

    /// Sparse matrix of `k*x + c` and `1/x` entries over a few symbols, with
    /// its value at `bindings` for comparison.
    fn symbolic_matrix(
        n: usize,
        seed: &mut u64,
        bindings: &BTreeMap<String, f64>,
    ) -> (SymMatrix, nalgebra::DMatrix<f64>) {
        let names: Vec<&String> = bindings.keys().collect();
        let mut rows = Vec::new();
        let mut values = Vec::new();
        for _ in 0..n {
            let mut row = Vec::new();
            for _ in 0..n {
                let pick = lcg(seed);
                let name = names[((lcg(seed) + 1.0) * 1.5) as usize % names.len()];
                let x = bindings[name];
                let (entry, value) = if pick > 0.5 {
                    (Expr::zero(), 0.0)
                } else if pick > -0.2 {
                    let (k, c) = (lcg(seed), lcg(seed));
                    (Expr::constant(k) * Expr::symbol(name) + Expr::constant(c), k * x + c)
                } else {
                    (Expr::one() / Expr::symbol(name), 1.0 / x)
                };
                row.push(entry);
                values.push(value);
            }
            rows.push(row);
        }
        (
            SymMatrix::from_rows(rows),
            nalgebra::DMatrix::from_row_slice(n, n, &values),
        )
    }

    #[test]
    fn test_symbolic_determinant_matches_lu_reference() {
        let bindings: BTreeMap<String, f64> =
            [("a".to_string(), 1.5), ("b".to_string(), -0.7), ("c".to_string(), 2.3)]
                .into_iter()
                .collect();
        let mut seed = 7;
        for n in 4..=6 {
            for _ in 0..2 {
                let (m, reference) = symbolic_matrix(n, &mut seed, &bindings);
                let expected = reference.determinant();
                let minors = determinant(&m).eval(&bindings).unwrap();
                let elim = bareiss(&m).eval(&bindings).unwrap();
                assert_relative_eq!(minors, expected, epsilon = 1e-9, max_relative = 1e-9);
                assert_relative_eq!(elim, expected, epsilon = 1e-9, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_symbolic_determinant() {
        // | a b |
        // | c d |
        let m = SymMatrix::from_rows(vec![
            vec![Expr::symbol("a"), Expr::symbol("b")],
            vec![Expr::symbol("c"), Expr::symbol("d")],
        ]);
        assert_eq!(determinant(&m), Expr::parse("a*d - b*c").unwrap());

        // RC ladder node matrix
        let g = Expr::parse("1/R").unwrap();
        let sc = Expr::parse("s*C").unwrap();
        let m = SymMatrix::from_rows(vec![
            vec![&g + &g, -&g, Expr::zero()],
            vec![-&g, &(&g + &g) + &sc, -&g],
            vec![Expr::zero(), -&g, &g + &sc],
        ]);
        let minors = determinant(&m);
        let elim = bareiss(&m);
        let bindings: BTreeMap<String, f64> =
            [("R".to_string(), 2.0), ("C".to_string(), 0.5), ("s".to_string(), 3.0)]
                .into_iter()
                .collect();
        assert_relative_eq!(
            minors.eval(&bindings).unwrap(),
            elim.eval(&bindings).unwrap(),
            max_relative = 1e-12
        );
        assert!(minors.is_polynomial());
    }

    #[test]
    fn test_cofactor_signs() {
        let m = SymMatrix::from_rows(vec![
            vec![Expr::constant(1.0), Expr::constant(2.0), Expr::constant(3.0)],
            vec![Expr::constant(0.0), Expr::constant(4.0), Expr::constant(5.0)],
            vec![Expr::constant(1.0), Expr::constant(0.0), Expr::constant(6.0)],
        ]);
        // minor(0, 1) = 0*6 - 5*1 = -5
        assert_eq!(minor(&m, 0, 1).as_f64(), Some(-5.0));
        assert_eq!(cofactor(&m, 0, 1).as_f64(), Some(5.0));
        // Laplace expansion along row 0 reproduces the determinant.
        let expanded: f64 = (0..3)
            .map(|c| m.get(0, c).as_f64().unwrap() * cofactor(&m, 0, c).as_f64().unwrap())
            .sum();
        assert_relative_eq!(expanded, determinant(&m).as_f64().unwrap());
    }

    #[test]
    fn test_cramer_substitute() {
        // 2x + y = 5, x + 3y = 10 -> x = 1, y = 3
        let m = SymMatrix::from_rows(vec![
            vec![Expr::constant(2.0), Expr::constant(1.0)],
            vec![Expr::constant(1.0), Expr::constant(3.0)],
        ]);
        let rhs = [Expr::constant(5.0), Expr::constant(10.0)];
        let det = determinant(&m).as_f64().unwrap();
        let x = determinant(&cramer_substitute(&m, &rhs, 0)).as_f64().unwrap() / det;
        let y = determinant(&cramer_substitute(&m, &rhs, 1)).as_f64().unwrap() / det;
        assert_relative_eq!(x, 1.0);
        assert_relative_eq!(y, 3.0);
    }
}
