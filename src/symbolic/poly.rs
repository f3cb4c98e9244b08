//! Sparse multivariate Laurent polynomials with `f64` coefficients.
//!
//! Exponents are signed so that a conductance `1/R` is the single monomial
//! `R^-1`. MNA matrices built from conductances, capacitances and
//! controlled-source gains then have polynomial determinants, which keeps
//! the rational-function layer ([`super::Expr`]) free of polynomial GCDs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use num_complex::Complex64;

/// Relative magnitude below which an accumulated coefficient is treated as
/// round-off of an exact cancellation.
pub const PRUNE_TOLERANCE: f64 = 1e-12;

/// Maximum number of reduction steps attempted by [`Poly::div_exact`].
const MAX_DIVISION_STEPS: usize = 20_000;

/// A product of symbols raised to nonzero integer powers.
///
/// Factors are kept sorted by symbol name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Monomial(Vec<(String, i32)>);

impl Monomial {
    /// The empty product.
    pub fn one() -> Self {
        Self(Vec::new())
    }

    /// `var^exp`.
    pub fn var(name: &str, exp: i32) -> Self {
        if exp == 0 {
            Self::one()
        } else {
            Self(vec![(name.to_string(), exp)])
        }
    }

    /// True for the empty product.
    pub fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    /// Exponent of `var` (zero when absent).
    pub fn exponent(&self, var: &str) -> i32 {
        self.0
            .binary_search_by(|(name, _)| name.as_str().cmp(var))
            .map(|idx| self.0[idx].1)
            .unwrap_or(0)
    }

    /// Iterate over `(symbol, exponent)` factors.
    pub fn factors(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(name, exp)| (name.as_str(), *exp))
    }

    /// Total degree.
    pub fn degree(&self) -> i32 {
        self.0.iter().map(|(_, e)| *e).sum()
    }

    /// True when every exponent is non-negative.
    pub fn is_proper(&self) -> bool {
        self.0.iter().all(|(_, e)| *e > 0)
    }

    fn merge_with(&self, other: &Monomial, combine: impl Fn(i32, i32) -> i32) -> Monomial {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() || j < other.0.len() {
            let ord = match (self.0.get(i), other.0.get(j)) {
                (Some(a), Some(b)) => a.0.cmp(&b.0),
                (Some(_), None) => Ordering::Less,
                (None, _) => Ordering::Greater,
            };
            let (name, exp) = match ord {
                Ordering::Less => {
                    let (n, e) = &self.0[i];
                    i += 1;
                    (n, combine(*e, 0))
                }
                Ordering::Greater => {
                    let (n, e) = &other.0[j];
                    j += 1;
                    (n, combine(0, *e))
                }
                Ordering::Equal => {
                    let (n, e) = &self.0[i];
                    let e2 = other.0[j].1;
                    i += 1;
                    j += 1;
                    (n, combine(*e, e2))
                }
            };
            if exp != 0 {
                out.push((name.clone(), exp));
            }
        }
        Monomial(out)
    }

    /// Product of two monomials.
    pub fn mul(&self, other: &Monomial) -> Monomial {
        self.merge_with(other, |a, b| a + b)
    }

    /// Quotient `self / other`.
    pub fn div(&self, other: &Monomial) -> Monomial {
        self.merge_with(other, |a, b| a - b)
    }

    /// Componentwise minimum of exponents (absent symbols count as zero).
    pub fn gcd(&self, other: &Monomial) -> Monomial {
        self.merge_with(other, |a, b| a.min(b))
    }

    /// Integer power.
    pub fn pow(&self, k: i32) -> Monomial {
        if k == 0 {
            return Monomial::one();
        }
        Monomial(self.0.iter().map(|(n, e)| (n.clone(), e * k)).collect())
    }

    /// Split into the factors whose symbol satisfies `pred` and the rest.
    pub fn split(&self, pred: impl Fn(&str) -> bool) -> (Monomial, Monomial) {
        let (selected, rest): (Vec<_>, Vec<_>) =
            self.0.iter().cloned().partition(|(name, _)| pred(name));
        (Monomial(selected), Monomial(rest))
    }

    /// The monomial with `var` removed.
    pub fn without(&self, var: &str) -> Monomial {
        Monomial(self.0.iter().filter(|(n, _)| n != var).cloned().collect())
    }

    /// True when `self` divides `other` with a proper quotient.
    pub fn divides(&self, other: &Monomial) -> bool {
        self.div(other).0.iter().all(|(_, e)| *e <= 0)
    }

    /// Lexicographic monomial order over alphabetically ordered symbols.
    pub fn lex_cmp(&self, other: &Monomial) -> Ordering {
        let diff = self.div(other);
        match diff.0.first() {
            None => Ordering::Equal,
            Some((_, e)) if *e > 0 => Ordering::Greater,
            Some(_) => Ordering::Less,
        }
    }

    fn fmt_factors(factors: &[(&str, i32)], f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, exp)) in factors.iter().enumerate() {
            if idx > 0 {
                write!(f, "*")?;
            }
            if *exp == 1 {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{}^{}", name, exp)?;
            }
        }
        Ok(())
    }
}

/// Format a coefficient so that the crate's own expression parser and
/// Maxima both read it back.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value == value.trunc() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let abs = value.abs();
    if (1e-3..1e6).contains(&abs) {
        format!("{}", value)
    } else {
        format!("{:e}", value)
    }
}

/// Accumulator that tracks the largest contribution to each monomial so
/// that exact cancellations are detected despite round-off.
#[derive(Default)]
struct Accumulator {
    terms: BTreeMap<Monomial, (f64, f64)>,
}

impl Accumulator {
    fn add(&mut self, m: Monomial, c: f64) {
        if c == 0.0 {
            return;
        }
        let entry = self.terms.entry(m).or_insert((0.0, 0.0));
        entry.0 += c;
        entry.1 = entry.1.max(c.abs());
    }

    fn finish(self) -> Poly {
        let terms = self
            .terms
            .into_iter()
            .filter(|(_, (sum, scale))| sum.abs() > PRUNE_TOLERANCE * scale)
            .map(|(m, (sum, _))| (m, sum))
            .collect();
        Poly { terms }
    }
}

/// Sparse multivariate Laurent polynomial.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Poly {
    terms: BTreeMap<Monomial, f64>,
}

impl Poly {
    /// The zero polynomial.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A constant polynomial.
    pub fn constant(c: f64) -> Self {
        Self::term(Monomial::one(), c)
    }

    /// The polynomial `1`.
    pub fn one() -> Self {
        Self::constant(1.0)
    }

    /// A single symbol.
    pub fn symbol(name: &str) -> Self {
        Self::term(Monomial::var(name, 1), 1.0)
    }

    /// A single term `c * m`.
    pub fn term(m: Monomial, c: f64) -> Self {
        let mut terms = BTreeMap::new();
        if c != 0.0 {
            terms.insert(m, c);
        }
        Self { terms }
    }

    /// Iterate over `(monomial, coefficient)` pairs.
    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, f64)> {
        self.terms.iter().map(|(m, c)| (m, *c))
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True for the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// True when the polynomial has no symbols (zero included).
    pub fn is_constant(&self) -> bool {
        self.terms.keys().all(Monomial::is_one)
    }

    /// Value of a constant polynomial.
    pub fn constant_value(&self) -> Option<f64> {
        if self.is_zero() {
            return Some(0.0);
        }
        if self.is_constant() {
            self.terms.get(&Monomial::one()).copied()
        } else {
            None
        }
    }

    /// True when the polynomial is the constant `1`.
    pub fn is_one(&self) -> bool {
        self.constant_value() == Some(1.0)
    }

    /// All symbols that occur in the polynomial.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        self.terms
            .keys()
            .flat_map(|m| m.factors().map(|(n, _)| n.to_string()))
            .collect()
    }

    /// True when `var` occurs in the polynomial.
    pub fn depends_on(&self, var: &str) -> bool {
        self.terms.keys().any(|m| m.exponent(var) != 0)
    }

    /// Largest exponent of `var`; `None` for the zero polynomial.
    pub fn degree_in(&self, var: &str) -> Option<i32> {
        self.terms.keys().map(|m| m.exponent(var)).max()
    }

    /// Smallest exponent of `var`; `None` for the zero polynomial.
    pub fn low_degree_in(&self, var: &str) -> Option<i32> {
        self.terms.keys().map(|m| m.exponent(var)).min()
    }

    /// Collect by powers of `var`.
    pub fn coefficients_in(&self, var: &str) -> BTreeMap<i32, Poly> {
        let mut out: BTreeMap<i32, Poly> = BTreeMap::new();
        for (m, c) in &self.terms {
            let exp = m.exponent(var);
            out.entry(exp)
                .or_default()
                .terms
                .insert(m.without(var), *c);
        }
        out
    }

    /// Multiply by a monomial.
    pub fn mul_monomial(&self, m: &Monomial) -> Poly {
        Poly {
            terms: self.terms.iter().map(|(k, c)| (k.mul(m), *c)).collect(),
        }
    }

    /// Multiply by `var^k`.
    pub fn shift(&self, var: &str, k: i32) -> Poly {
        self.mul_monomial(&Monomial::var(var, k))
    }

    /// Multiply by a scalar.
    pub fn scale(&self, factor: f64) -> Poly {
        if factor == 0.0 {
            return Poly::zero();
        }
        Poly {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), c * factor)).collect(),
        }
    }

    /// Greatest common monomial divisor, allowing negative exponents.
    pub fn monomial_content(&self) -> Monomial {
        let mut iter = self.terms.keys();
        match iter.next() {
            None => Monomial::one(),
            Some(first) => iter.fold(first.clone(), |acc, m| acc.gcd(m)),
        }
    }

    /// Leading term under the lexicographic monomial order.
    pub fn leading_term(&self) -> Option<(&Monomial, f64)> {
        self.terms
            .iter()
            .max_by(|a, b| a.0.lex_cmp(b.0))
            .map(|(m, c)| (m, *c))
    }

    /// Largest absolute coefficient.
    pub fn max_abs_coefficient(&self) -> f64 {
        self.terms.values().fold(0.0, |acc, c| acc.max(c.abs()))
    }

    /// Integer power (non-negative).
    pub fn pow(&self, k: u32) -> Poly {
        let mut result = Poly::one();
        let mut base = self.clone();
        let mut k = k;
        while k > 0 {
            if k & 1 == 1 {
                result = &result * &base;
            }
            k >>= 1;
            if k > 0 {
                base = &base * &base;
            }
        }
        result
    }

    /// Exact division; `None` when `divisor` does not divide `self`.
    pub fn div_exact(&self, divisor: &Poly) -> Option<Poly> {
        if divisor.is_zero() {
            return None;
        }
        if self.is_zero() {
            return Some(Poly::zero());
        }
        if divisor.len() == 1 {
            let (m, c) = divisor.leading_term()?;
            let inv = Monomial::one().div(m);
            return Some(self.mul_monomial(&inv).scale(1.0 / c));
        }

        // Reduce both to proper, content-free polynomials.
        let content_n = self.monomial_content();
        let content_d = divisor.monomial_content();
        let mut rem = self.mul_monomial(&Monomial::one().div(&content_n));
        let d = divisor.mul_monomial(&Monomial::one().div(&content_d));
        let (lead_m, lead_c) = {
            let (m, c) = d.leading_term()?;
            (m.clone(), c)
        };

        let mut quotient = Accumulator::default();
        let mut steps = 0usize;
        while !rem.is_zero() {
            steps += 1;
            if steps > MAX_DIVISION_STEPS {
                return None;
            }
            let (m, c) = {
                let (m, c) = rem.leading_term()?;
                (m.clone(), c)
            };
            if !lead_m.divides(&m) {
                return None;
            }
            let q_m = m.div(&lead_m);
            let q_c = c / lead_c;
            quotient.add(q_m.clone(), q_c);
            let correction = d.mul_monomial(&q_m).scale(q_c);
            rem = &rem - &correction;
            rem.terms.remove(&m);
        }
        let shift = content_n.div(&content_d);
        Some(quotient.finish().mul_monomial(&shift))
    }

    /// Evaluate with a symbol lookup; `None` when a symbol is unbound.
    pub fn eval_with(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        let mut total = 0.0;
        for (m, c) in &self.terms {
            let mut value = *c;
            for (name, exp) in m.factors() {
                value *= lookup(name)?.powi(exp);
            }
            total += value;
        }
        Some(total)
    }

    /// Evaluate over the complex numbers.
    pub fn eval_complex(&self, lookup: &dyn Fn(&str) -> Option<Complex64>) -> Option<Complex64> {
        let mut total = Complex64::new(0.0, 0.0);
        for (m, c) in &self.terms {
            let mut value = Complex64::new(*c, 0.0);
            for (name, exp) in m.factors() {
                value *= lookup(name)?.powi(exp);
            }
            total += value;
        }
        Some(total)
    }

    /// Terms in display order: descending total degree, then lexicographic.
    fn display_order(&self) -> Vec<(&Monomial, f64)> {
        let mut terms: Vec<_> = self.terms().collect();
        terms.sort_by(|a, b| b.0.degree().cmp(&a.0.degree()).then(b.0.lex_cmp(a.0)));
        terms
    }

    /// Render in Maxima input syntax.
    pub fn to_maxima(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut out = String::new();
        for (idx, (m, c)) in self.display_order().into_iter().enumerate() {
            if idx > 0 {
                out.push_str(if c < 0.0 { " - " } else { " + " });
            } else if c < 0.0 {
                out.push('-');
            }
            out.push_str(&format_number(c.abs()));
            for (name, exp) in m.factors() {
                if exp == 1 {
                    out.push_str(&format!("*{}", name));
                } else {
                    out.push_str(&format!("*{}^({})", name, exp));
                }
            }
        }
        out
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        for (idx, (m, c)) in self.display_order().into_iter().enumerate() {
            let abs = c.abs();
            if idx > 0 {
                write!(f, "{}", if c < 0.0 { " - " } else { " + " })?;
            } else if c < 0.0 {
                write!(f, "-")?;
            }
            let positive: Vec<(&str, i32)> = m.factors().filter(|(_, e)| *e > 0).collect();
            let negative: Vec<(&str, i32)> = m
                .factors()
                .filter(|(_, e)| *e < 0)
                .map(|(n, e)| (n, -e))
                .collect();
            let show_coefficient = abs != 1.0 || positive.is_empty();
            if show_coefficient {
                write!(f, "{}", format_number(abs))?;
            }
            if !positive.is_empty() {
                if show_coefficient {
                    write!(f, "*")?;
                }
                Monomial::fmt_factors(&positive, f)?;
            }
            if !negative.is_empty() {
                write!(f, "/")?;
                if negative.len() > 1 {
                    write!(f, "(")?;
                    Monomial::fmt_factors(&negative, f)?;
                    write!(f, ")")?;
                } else {
                    Monomial::fmt_factors(&negative, f)?;
                }
            }
        }
        Ok(())
    }
}

impl<'a> std::ops::Add<&'a Poly> for &'a Poly {
    type Output = Poly;

    fn add(self, rhs: &'a Poly) -> Poly {
        let mut acc = Accumulator::default();
        for (m, c) in self.terms.iter().chain(rhs.terms.iter()) {
            acc.add(m.clone(), *c);
        }
        acc.finish()
    }
}

impl<'a> std::ops::Sub<&'a Poly> for &'a Poly {
    type Output = Poly;

    fn sub(self, rhs: &'a Poly) -> Poly {
        let mut acc = Accumulator::default();
        for (m, c) in &self.terms {
            acc.add(m.clone(), *c);
        }
        for (m, c) in &rhs.terms {
            acc.add(m.clone(), -*c);
        }
        acc.finish()
    }
}

impl<'a> std::ops::Mul<&'a Poly> for &'a Poly {
    type Output = Poly;

    fn mul(self, rhs: &'a Poly) -> Poly {
        if self.is_zero() || rhs.is_zero() {
            return Poly::zero();
        }
        let mut acc = Accumulator::default();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &rhs.terms {
                acc.add(m1.mul(m2), c1 * c2);
            }
        }
        acc.finish()
    }
}

impl std::ops::Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        self.scale(-1.0)
    }
}

impl From<f64> for Poly {
    fn from(value: f64) -> Self {
        Poly::constant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Poly {
        Poly::symbol(name)
    }

    #[test]
    fn test_monomial_arithmetic() {
        let a = Monomial::var("R1", 2).mul(&Monomial::var("C1", 1));
        assert_eq!(a.exponent("R1"), 2);
        assert_eq!(a.exponent("C1"), 1);
        assert_eq!(a.exponent("s"), 0);
        let b = a.div(&Monomial::var("R1", 2));
        assert_eq!(b, Monomial::var("C1", 1));
        assert!(Monomial::var("R1", 1).divides(&a));
        assert!(!Monomial::var("s", 1).divides(&a));
    }

    #[test]
    fn test_exact_cancellation() {
        let p = &(&sym("a") * &sym("b")) - &(&sym("b") * &sym("a"));
        assert!(p.is_zero());

        let q = &(&Poly::constant(0.1) + &Poly::constant(0.2)) - &Poly::constant(0.3);
        assert!(q.is_zero());
    }

    #[test]
    fn test_coefficients_in() {
        // R*C*s^2 + s + 1/R
        let s = sym("s");
        let p = &(&(&(&sym("R") * &sym("C")) * &(&s * &s)) + &s)
            + &Poly::term(Monomial::var("R", -1), 1.0);
        let coeffs = p.coefficients_in("s");
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[&2], &sym("R") * &sym("C"));
        assert_eq!(coeffs[&1], Poly::one());
        assert_eq!(p.degree_in("s"), Some(2));
        assert_eq!(p.low_degree_in("s"), Some(0));
    }

    #[test]
    fn test_div_exact() {
        // (x^2 - y^2) / (x - y) = x + y
        let x = sym("x");
        let y = sym("y");
        let num = &(&x * &x) - &(&y * &y);
        let den = &x - &y;
        let q = num.div_exact(&den).unwrap();
        assert_eq!(q, &x + &y);

        // x^2 + 1 is not divisible by x + 1
        let num = &(&x * &x) + &Poly::one();
        assert!(num.div_exact(&(&x + &Poly::one())).is_none());
    }

    #[test]
    fn test_div_exact_laurent() {
        // (1/R1 + 1/R2) / (R1 + R2) = 1/(R1*R2)
        let num = &Poly::term(Monomial::var("R1", -1), 1.0) + &Poly::term(Monomial::var("R2", -1), 1.0);
        let den = &sym("R1") + &sym("R2");
        let q = num.div_exact(&den).unwrap();
        let expected = Poly::term(Monomial::var("R1", -1).mul(&Monomial::var("R2", -1)), 1.0);
        assert_eq!(q, expected);
    }

    #[test]
    fn test_display() {
        let p = &(&Poly::constant(2.0) * &sym("x")) - &Poly::term(Monomial::var("R", -1), 1.0);
        assert_eq!(p.to_string(), "2*x - 1/R");
        assert_eq!(format_number(1e-9), "1e-9");
        assert_eq!(format_number(3.0), "3");
    }
}
