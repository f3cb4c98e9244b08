//! Dense matrices of symbolic expressions.

use std::fmt;

use super::expr::Expr;

/// Dense row-major matrix of [`Expr`] entries.
#[derive(Debug, Clone, PartialEq)]
pub struct SymMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl SymMatrix {
    /// A matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Expr::zero(); rows * cols],
        }
    }

    /// Build from nested rows; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<Expr>>) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        debug_assert!(rows.iter().all(|r| r.len() == n_cols));
        Self {
            rows: n_rows,
            cols: n_cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// True for a square matrix.
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Entry at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> &Expr {
        &self.data[row * self.cols + col]
    }

    /// Overwrite the entry at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: Expr) {
        let idx = row * self.cols + col;
        self.data[idx] = value;
    }

    /// Add `value` to the entry at `(row, col)`.
    pub fn add_at(&mut self, row: usize, col: usize, value: &Expr) {
        if value.is_zero() {
            return;
        }
        let idx = row * self.cols + col;
        self.data[idx] = &self.data[idx] + value;
    }

    /// One row as a slice.
    pub fn row(&self, row: usize) -> &[Expr] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copy of one column.
    pub fn column(&self, col: usize) -> Vec<Expr> {
        (0..self.rows).map(|r| self.get(r, col).clone()).collect()
    }

    /// The matrix without row `row` and column `col`.
    pub fn without(&self, row: usize, col: usize) -> SymMatrix {
        let mut data = Vec::with_capacity(self.rows.saturating_sub(1) * self.cols.saturating_sub(1));
        for r in (0..self.rows).filter(|&r| r != row) {
            for c in (0..self.cols).filter(|&c| c != col) {
                data.push(self.get(r, c).clone());
            }
        }
        SymMatrix {
            rows: self.rows.saturating_sub(1),
            cols: self.cols.saturating_sub(1),
            data,
        }
    }

    /// The matrix with column `col` replaced by `values`.
    pub fn with_column(&self, col: usize, values: &[Expr]) -> SymMatrix {
        let mut out = self.clone();
        for (r, value) in values.iter().enumerate().take(self.rows) {
            out.set(r, col, value.clone());
        }
        out
    }

    /// Apply `f` to every entry.
    pub fn map(&self, f: impl Fn(&Expr) -> Expr) -> SymMatrix {
        SymMatrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Number of nonzero entries.
    pub fn nonzeros(&self) -> usize {
        self.data.iter().filter(|e| !e.is_zero()).count()
    }

    /// Numeric copy, if every entry is a number.
    pub fn to_f64(&self) -> Option<nalgebra::DMatrix<f64>> {
        let values: Option<Vec<f64>> = self.data.iter().map(Expr::as_f64).collect();
        Some(nalgebra::DMatrix::from_row_slice(self.rows, self.cols, &values?))
    }

    /// Render in Maxima syntax: `matrix([a, b], [c, d])`.
    pub fn to_maxima(&self) -> String {
        let rows: Vec<String> = (0..self.rows)
            .map(|r| {
                let entries: Vec<String> = self.row(r).iter().map(Expr::to_maxima).collect();
                format!("[{}]", entries.join(", "))
            })
            .collect();
        format!("matrix({})", rows.join(", "))
    }
}

impl fmt::Display for SymMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            write!(f, "[")?;
            for (c, value) in self.row(r).iter().enumerate() {
                if c > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", value)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_and_with_column() {
        let m = SymMatrix::from_rows(vec![
            vec![Expr::constant(1.0), Expr::constant(2.0), Expr::constant(3.0)],
            vec![Expr::constant(4.0), Expr::constant(5.0), Expr::constant(6.0)],
            vec![Expr::constant(7.0), Expr::constant(8.0), Expr::symbol("x")],
        ]);
        let minor = m.without(0, 1);
        assert_eq!(minor.rows(), 2);
        assert_eq!(minor.get(0, 0), &Expr::constant(4.0));
        assert_eq!(minor.get(1, 1), &Expr::symbol("x"));

        let replaced = m.with_column(2, &[Expr::zero(), Expr::one(), Expr::zero()]);
        assert_eq!(replaced.column(2), vec![Expr::zero(), Expr::one(), Expr::zero()]);
        assert!(m.to_f64().is_none());
        assert_eq!(replaced.to_f64().unwrap()[(1, 2)], 1.0);
    }

    #[test]
    fn test_add_at_accumulates() {
        let mut m = SymMatrix::zeros(2, 2);
        m.add_at(0, 0, &Expr::symbol("G"));
        m.add_at(0, 0, &Expr::symbol("G"));
        m.add_at(1, 1, &-Expr::symbol("G"));
        assert_eq!(m.get(0, 0), &(Expr::constant(2.0) * Expr::symbol("G")));
        assert_eq!(m.nonzeros(), 2);
    }
}
