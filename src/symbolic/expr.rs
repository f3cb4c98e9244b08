//! Rational functions over [`Poly`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;

use super::poly::{Monomial, Poly};
use super::syntax::Node;
use crate::error::{Result, SymnaError};

/// A symbolic expression: the quotient of two Laurent polynomials.
///
/// The representation is canonical up to common non-monomial factors: the
/// denominator carries no monomial content and has a unit leading
/// coefficient, and exact divisibility in either direction is removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    num: Poly,
    den: Poly,
}

/// Outcome of substituting parameter definitions recursively.
#[derive(Debug, Clone, PartialEq)]
pub struct Substituted {
    /// The (possibly partially) substituted expression.
    pub expr: Expr,
    /// False when defined symbols remained after the maximum depth.
    pub converged: bool,
}

impl Expr {
    /// Build `num / den` in canonical form.
    pub fn new(num: Poly, den: Poly) -> Self {
        normalize(num, den)
    }

    /// The constant zero.
    pub fn zero() -> Self {
        Self {
            num: Poly::zero(),
            den: Poly::one(),
        }
    }

    /// The constant one.
    pub fn one() -> Self {
        Self::constant(1.0)
    }

    /// A numeric constant.
    pub fn constant(value: f64) -> Self {
        Self {
            num: Poly::constant(value),
            den: Poly::one(),
        }
    }

    /// A single symbol.
    pub fn symbol(name: &str) -> Self {
        Self {
            num: Poly::symbol(name),
            den: Poly::one(),
        }
    }

    /// Result of a division by zero.
    pub fn undefined() -> Self {
        Self::constant(f64::NAN)
    }

    /// Parse an expression in infix notation.
    pub fn parse(text: &str) -> Result<Self> {
        Node::parse(text)?.to_expr()
    }

    /// Numerator polynomial.
    pub fn numer(&self) -> &Poly {
        &self.num
    }

    /// Denominator polynomial.
    pub fn denom(&self) -> &Poly {
        &self.den
    }

    /// Split into numerator and denominator expressions.
    pub fn as_numer_denom(&self) -> (Expr, Expr) {
        (Expr::from(self.num.clone()), Expr::from(self.den.clone()))
    }

    /// True for the constant zero.
    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    /// True for the constant one.
    pub fn is_one(&self) -> bool {
        self.as_f64() == Some(1.0)
    }

    /// True when the denominator is one.
    pub fn is_polynomial(&self) -> bool {
        self.den.is_one()
    }

    /// True when the expression contains no symbols.
    pub fn is_number(&self) -> bool {
        self.num.is_constant() && self.den.is_constant()
    }

    /// True when the value is NaN (division by zero).
    pub fn is_undefined(&self) -> bool {
        self.as_f64().map(f64::is_nan).unwrap_or(false)
    }

    /// Numeric value when the expression contains no symbols.
    pub fn as_f64(&self) -> Option<f64> {
        let n = self.num.constant_value()?;
        let d = self.den.constant_value()?;
        Some(n / d)
    }

    /// All symbols in the expression.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = self.num.free_symbols();
        symbols.extend(self.den.free_symbols());
        symbols
    }

    /// True when `var` occurs in the expression.
    pub fn depends_on(&self, var: &str) -> bool {
        self.num.depends_on(var) || self.den.depends_on(var)
    }

    /// Reciprocal; undefined for zero.
    pub fn recip(&self) -> Expr {
        if self.is_zero() {
            return Expr::undefined();
        }
        normalize(self.den.clone(), self.num.clone())
    }

    /// Integer power.
    pub fn pow(&self, k: i32) -> Expr {
        match k {
            0 => Expr::one(),
            1 => self.clone(),
            k if k < 0 => self.recip().pow(-k),
            k => Expr {
                num: self.num.pow(k as u32),
                den: self.den.pow(k as u32),
            },
        }
    }

    /// Replace `var` by `value`.
    pub fn substitute(&self, var: &str, value: &Expr) -> Expr {
        if !self.depends_on(var) {
            return self.clone();
        }
        let num = substitute_poly(&self.num, var, value);
        let den = substitute_poly(&self.den, var, value);
        num / den
    }

    /// Replace every symbol in `map` simultaneously.
    pub fn substitute_all(&self, map: &BTreeMap<String, Expr>) -> Expr {
        if !map.keys().any(|k| self.depends_on(k)) {
            return self.clone();
        }
        let num = substitute_poly_all(&self.num, map);
        let den = substitute_poly_all(&self.den, map);
        num / den
    }

    /// Substitute parameter definitions until no defined symbol remains or
    /// `max_depth` passes have been made.
    pub fn substitute_recursive(&self, defs: &BTreeMap<String, Expr>, max_depth: usize) -> Substituted {
        let mut current = self.clone();
        for _ in 0..max_depth {
            let relevant: BTreeMap<String, Expr> = defs
                .iter()
                .filter(|(name, _)| current.depends_on(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            if relevant.is_empty() {
                return Substituted {
                    expr: current,
                    converged: true,
                };
            }
            current = current.substitute_all(&relevant);
        }
        let converged = !defs.keys().any(|name| current.depends_on(name));
        Substituted {
            expr: current,
            converged,
        }
    }

    /// Evaluate with numeric bindings.
    pub fn eval(&self, bindings: &BTreeMap<String, f64>) -> Option<f64> {
        self.eval_with(&|name| bindings.get(name).copied())
    }

    /// Evaluate with a symbol lookup.
    pub fn eval_with(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        Some(self.num.eval_with(lookup)? / self.den.eval_with(lookup)?)
    }

    /// Evaluate over the complex numbers.
    pub fn eval_complex(&self, lookup: &dyn Fn(&str) -> Option<Complex64>) -> Option<Complex64> {
        Some(self.num.eval_complex(lookup)? / self.den.eval_complex(lookup)?)
    }

    /// Numerator and denominator as polynomials in `var` with non-negative
    /// powers and no common power of `var`.
    pub fn as_polynomial_ratio(&self, var: &str) -> (Poly, Poly) {
        let ln = self.num.low_degree_in(var).unwrap_or(0);
        let ld = self.den.low_degree_in(var).unwrap_or(0);
        let shift = -ln.min(ld);
        (self.num.shift(var, shift), self.den.shift(var, shift))
    }

    /// Coefficients of the powers of `var`; fails when the denominator
    /// depends on `var`.
    pub fn coefficients_in(&self, var: &str) -> Result<BTreeMap<i32, Expr>> {
        if self.den.depends_on(var) {
            return Err(SymnaError::NotPolynomial {
                var: var.to_string(),
                expr: self.to_string(),
            });
        }
        Ok(self
            .num
            .coefficients_in(var)
            .into_iter()
            .map(|(k, c)| (k, Expr::new(c, self.den.clone())))
            .collect())
    }

    /// `|F(j*omega)|^2` as a real rational function, where `F` is this
    /// expression as a function of `var`.
    pub fn magnitude_squared_jw(&self, var: &str, omega: &Expr) -> Expr {
        let (num_re, num_im) = jw_parts(&self.num, var, omega);
        let (den_re, den_im) = jw_parts(&self.den, var, omega);
        let num = &num_re * &num_re + &num_im * &num_im;
        let den = &den_re * &den_re + &den_im * &den_im;
        num / den
    }

    /// Render in Maxima input syntax.
    pub fn to_maxima(&self) -> String {
        if self.den.is_one() {
            format!("({})", self.num.to_maxima())
        } else {
            format!("({})/({})", self.num.to_maxima(), self.den.to_maxima())
        }
    }
}

fn normalize(num: Poly, den: Poly) -> Expr {
    if den.is_zero() {
        return Expr::undefined();
    }
    if num.is_zero() {
        return Expr::zero();
    }

    // Monomial content of the denominator moves to the numerator.
    let inv = Monomial::one().div(&den.monomial_content());
    let num = num.mul_monomial(&inv);
    let den = den.mul_monomial(&inv);

    if den.len() == 1 {
        let c = den.constant_value().unwrap_or(1.0);
        return Expr {
            num: num.scale(1.0 / c),
            den: Poly::one(),
        };
    }
    if let Some(q) = num.div_exact(&den) {
        return Expr {
            num: q,
            den: Poly::one(),
        };
    }
    if num.len() > 1 {
        if let Some(q) = den.div_exact(&num) {
            return normalize(Poly::one(), q);
        }
    }

    let lead = den.leading_term().map(|(_, c)| c).unwrap_or(1.0);
    Expr {
        num: num.scale(1.0 / lead),
        den: den.scale(1.0 / lead),
    }
}

fn substitute_poly(p: &Poly, var: &str, value: &Expr) -> Expr {
    let mut total = Expr::zero();
    for (k, coeff) in p.coefficients_in(var) {
        total = total + Expr::from(coeff) * value.pow(k);
    }
    total
}

fn substitute_poly_all(p: &Poly, map: &BTreeMap<String, Expr>) -> Expr {
    let mut groups: BTreeMap<Monomial, Poly> = BTreeMap::new();
    for (m, c) in p.terms() {
        let (mapped, rest) = m.split(|name| map.contains_key(name));
        let entry = groups.entry(mapped).or_default();
        *entry = &*entry + &Poly::term(rest, c);
    }
    let mut total = Expr::zero();
    for (mapped, rest) in groups {
        let mut value = Expr::from(rest);
        for (name, exp) in mapped.factors() {
            if let Some(replacement) = map.get(name) {
                value = value * replacement.pow(exp);
            }
        }
        total = total + value;
    }
    total
}

fn jw_parts(p: &Poly, var: &str, omega: &Expr) -> (Expr, Expr) {
    let mut re = Expr::zero();
    let mut im = Expr::zero();
    for (k, coeff) in p.coefficients_in(var) {
        let term = Expr::from(coeff) * omega.pow(k);
        match k.rem_euclid(4) {
            0 => re = re + term,
            1 => im = im + term,
            2 => re = re - term,
            _ => im = im - term,
        }
    }
    (re, im)
}

/// Divide out a common polynomial factor between `n` and `d` when one
/// divides the other.
fn cancel(n: &Poly, d: &Poly) -> (Poly, Poly) {
    if d.is_one() || n.is_zero() {
        return (n.clone(), d.clone());
    }
    if let Some(q) = n.div_exact(d) {
        return (q, Poly::one());
    }
    if n.len() > 1 {
        if let Some(q) = d.div_exact(n) {
            return (Poly::one(), q);
        }
    }
    (n.clone(), d.clone())
}

fn add_expr(a: &Expr, b: &Expr) -> Expr {
    if a.is_undefined() || b.is_undefined() {
        return Expr::undefined();
    }
    if a.is_zero() {
        return b.clone();
    }
    if b.is_zero() {
        return a.clone();
    }
    if a.den == b.den {
        return normalize(&a.num + &b.num, a.den.clone());
    }
    if a.den.is_one() {
        return normalize(&(&a.num * &b.den) + &b.num, b.den.clone());
    }
    if b.den.is_one() {
        return normalize(&a.num + &(&b.num * &a.den), a.den.clone());
    }
    if let Some(q) = b.den.div_exact(&a.den) {
        return normalize(&(&a.num * &q) + &b.num, b.den.clone());
    }
    if let Some(q) = a.den.div_exact(&b.den) {
        return normalize(&a.num + &(&b.num * &q), a.den.clone());
    }
    normalize(
        &(&a.num * &b.den) + &(&b.num * &a.den),
        &a.den * &b.den,
    )
}

fn sub_expr(a: &Expr, b: &Expr) -> Expr {
    add_expr(a, &-b)
}

fn mul_expr(a: &Expr, b: &Expr) -> Expr {
    if a.is_undefined() || b.is_undefined() {
        return Expr::undefined();
    }
    if a.is_zero() || b.is_zero() {
        return Expr::zero();
    }
    let (n1, d2) = cancel(&a.num, &b.den);
    let (n2, d1) = cancel(&b.num, &a.den);
    normalize(&n1 * &n2, &d1 * &d2)
}

fn div_expr(a: &Expr, b: &Expr) -> Expr {
    mul_expr(a, &b.recip())
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl std::ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(self, rhs)
            }
        }

        impl std::ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(&self, &rhs)
            }
        }

        impl std::ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(&self, rhs)
            }
        }

        impl std::ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(self, &rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add_expr);
impl_binary_op!(Sub, sub, sub_expr);
impl_binary_op!(Mul, mul, mul_expr);
impl_binary_op!(Div, div, div_expr);

impl std::ops::Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr {
            num: -&self.num,
            den: self.den.clone(),
        }
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -&self
    }
}

impl std::iter::Sum for Expr {
    fn sum<I: Iterator<Item = Expr>>(iter: I) -> Expr {
        iter.fold(Expr::zero(), |acc, e| acc + e)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl From<Poly> for Expr {
    fn from(poly: Poly) -> Self {
        Expr::new(poly, Poly::one())
    }
}

impl FromStr for Expr {
    type Err = SymnaError;

    fn from_str(s: &str) -> Result<Self> {
        Expr::parse(s)
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::zero()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den.is_one() {
            return write!(f, "{}", self.num);
        }
        if self.num.len() > 1 {
            write!(f, "({})/({})", self.num, self.den)
        } else {
            write!(f, "{}/({})", self.num, self.den)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn e(text: &str) -> Expr {
        Expr::parse(text).unwrap()
    }

    #[test]
    fn test_divider_normalizes() {
        let g1 = e("1/R1");
        let g2 = e("1/R2");
        let h = &g1 / &(&g1 + &g2);
        assert_eq!(h, e("R2/(R1+R2)"));
        assert_eq!(h.to_string(), "R2/(R1 + R2)");
    }

    #[test]
    fn test_exact_cancellation() {
        let x = e("(x^2 - 1)/(x - 1)");
        assert_eq!(x, e("x + 1"));
        assert!(x.is_polynomial());

        let y = e("(a + b)/(a^2 + 2*a*b + b^2)");
        assert_eq!(y, e("1/(a + b)"));
    }

    #[test]
    fn test_substitute() {
        let expr = e("R*C*s + 1");
        let value = expr.substitute("R", &e("1k"));
        assert_eq!(value, e("1000*C*s + 1"));

        let swapped = e("a - b").substitute_all(
            &[("a".to_string(), e("b")), ("b".to_string(), e("a"))]
                .into_iter()
                .collect(),
        );
        assert_eq!(swapped, e("b - a"));
    }

    #[test]
    fn test_substitute_recursive() {
        let defs: BTreeMap<String, Expr> = [
            ("C1".to_string(), e("1/(2*pi*R1*fc)")),
            ("R1".to_string(), e("1k")),
            ("fc".to_string(), e("1000")),
        ]
        .into_iter()
        .collect();
        let result = e("C1").substitute_recursive(&defs, 10);
        assert!(result.converged);
        assert_relative_eq!(
            result.expr.as_f64().unwrap(),
            1.0 / (2.0 * std::f64::consts::PI * 1e6),
            max_relative = 1e-12
        );

        let cyclic: BTreeMap<String, Expr> = [("a".to_string(), e("2*a"))].into_iter().collect();
        let result = e("a").substitute_recursive(&cyclic, 3);
        assert!(!result.converged);
        assert_eq!(result.expr, e("8*a"));
    }

    #[test]
    fn test_magnitude_squared_first_order() {
        // |1/(1 + s*tau)|^2 at s = j*w is 1/(1 + w^2*tau^2)
        let h = e("1/(1 + s*tau)");
        let mag = h.magnitude_squared_jw("s", &e("w"));
        assert_eq!(mag, e("1/(1 + w^2*tau^2)"));
    }

    #[test]
    fn test_polynomial_ratio() {
        let h = e("(s + 1)/(s^2 + s)");
        let (n, d) = h.as_polynomial_ratio("s");
        assert_eq!(n.low_degree_in("s"), Some(0));
        assert_eq!(d.low_degree_in("s"), Some(1));

        let laurent = e("1/(s*L)");
        let (n, d) = laurent.as_polynomial_ratio("s");
        assert_eq!(n.degree_in("s"), Some(0));
        assert_eq!(d.degree_in("s"), Some(1));
    }

    #[test]
    fn test_division_by_zero() {
        let x = e("x") / Expr::zero();
        assert!(x.is_undefined());
    }
}
