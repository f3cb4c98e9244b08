//! General expression trees.
//!
//! [`Node`] covers everything [`Expr`] cannot hold: function calls such as
//! `exp(-t/tau)`, the imaginary unit and list or matrix literals returned
//! by the external CAS. Netlist values are parsed into a `Node` first and
//! converted with [`Node::to_expr`].
//!
//! Numbers accept SI scale suffixes: `f p n u m k meg M G T`, where `m` is
//! milli and `M` and `meg` are mega. Letters after a suffix are ignored, so
//! `10kOhm` reads as `10k`.

use std::fmt;

use num_complex::Complex64;

use super::expr::Expr;
use super::poly::format_number;
use crate::error::{Result, SymnaError};

/// Reserved name of the imaginary unit.
pub const IMAGINARY_UNIT: &str = "I";
/// Reserved name of Euler's number.
pub const EULER: &str = "E";
/// Reserved name of pi.
pub const PI: &str = "pi";

/// Node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Symbol(String),
    Imaginary,
    Neg(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Pow(Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
    List(Vec<Node>),
}

/// Parse a number with an optional SI scale suffix.
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    let split = number_prefix_len(text)?;
    let (digits, suffix) = text.split_at(split);
    let value: f64 = digits.parse().ok()?;
    Some(value * suffix_multiplier(suffix))
}

/// Length of the leading numeric literal (mantissa and exponent).
fn number_prefix_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mantissa_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i == mantissa_start || (i == mantissa_start + 1 && bytes[mantissa_start] == b'.') {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    Some(i)
}

fn suffix_multiplier(suffix: &str) -> f64 {
    if suffix.len() >= 3 && suffix[..3].eq_ignore_ascii_case("meg") {
        return 1e6;
    }
    match suffix.chars().next() {
        Some('f') => 1e-15,
        Some('p') => 1e-12,
        Some('n') => 1e-9,
        Some('u') | Some('µ') => 1e-6,
        Some('m') => 1e-3,
        Some('k') | Some('K') => 1e3,
        Some('M') => 1e6,
        Some('G') => 1e9,
        Some('T') => 1e12,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(char),
}

fn tokenize(text: &str) -> Result<Vec<Tok>> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (pos, ch) = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        if ch.is_ascii_digit() || (ch == '.' && chars.get(i + 1).map_or(false, |c| c.1.is_ascii_digit())) {
            let rest = &text[pos..];
            let len = number_prefix_len(rest)
                .ok_or_else(|| SymnaError::expression(text, "malformed number"))?;
            let mut end = len;
            // Unit suffix letters belong to the number.
            for c in rest[len..].chars() {
                if c.is_alphabetic() || c == 'µ' {
                    end += c.len_utf8();
                } else {
                    break;
                }
            }
            let value = parse_value(&rest[..end])
                .ok_or_else(|| SymnaError::expression(text, format!("bad number '{}'", &rest[..end])))?;
            tokens.push(Tok::Num(value));
            while i < chars.len() && chars[i].0 < pos + end {
                i += 1;
            }
            continue;
        }
        if ch.is_alphabetic() || ch == '_' || ch == '%' {
            let mut name = String::new();
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '%') {
                name.push(chars[i].1);
                i += 1;
            }
            tokens.push(Tok::Ident(name));
            continue;
        }
        match ch {
            '*' if chars.get(i + 1).map(|c| c.1) == Some('*') => {
                tokens.push(Tok::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' | '(' | ')' | ',' | '[' | ']' => {
                tokens.push(Tok::Op(ch));
                i += 1;
            }
            _ => {
                return Err(SymnaError::expression(
                    text,
                    format!("unexpected character '{}'", ch),
                ))
            }
        }
    }
    Ok(tokens)
}

struct ExprParser<'a> {
    text: &'a str,
    tokens: Vec<Tok>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, op: char) -> bool {
        if self.peek() == Some(&Tok::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: char) -> Result<()> {
        if self.eat(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn error(&self, message: impl Into<String>) -> SymnaError {
        SymnaError::expression(self.text, message)
    }

    fn expression(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        loop {
            if self.eat('+') {
                lhs = Node::Add(Box::new(lhs), Box::new(self.term()?));
            } else if self.eat('-') {
                lhs = Node::Sub(Box::new(lhs), Box::new(self.term()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat('*') {
                lhs = Node::Mul(Box::new(lhs), Box::new(self.unary()?));
            } else if self.eat('/') {
                lhs = Node::Div(Box::new(lhs), Box::new(self.unary()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Node> {
        if self.eat('-') {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Node> {
        let base = self.atom()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(Node::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Node> {
        match self.peek().cloned() {
            Some(Tok::Num(value)) => {
                self.pos += 1;
                Ok(Node::Number(value))
            }
            Some(Tok::Ident(name)) => {
                self.pos += 1;
                if self.eat('(') {
                    let args = self.sequence(')')?;
                    if name == "matrix" {
                        return Ok(Node::List(args));
                    }
                    return Ok(Node::Call(name, args));
                }
                Ok(symbol_node(&name))
            }
            Some(Tok::Op('(')) => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(Tok::Op('[')) => {
                self.pos += 1;
                Ok(Node::List(self.sequence(']')?))
            }
            Some(tok) => Err(self.error(format!("unexpected token {:?}", tok))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn sequence(&mut self, close: char) -> Result<Vec<Node>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(',')?;
        }
    }
}

fn symbol_node(name: &str) -> Node {
    match name {
        IMAGINARY_UNIT | "%i" => Node::Imaginary,
        "%e" => Node::Symbol(EULER.to_string()),
        "%pi" => Node::Symbol(PI.to_string()),
        _ => Node::Symbol(name.to_string()),
    }
}

fn reserved_value(name: &str) -> Option<f64> {
    match name {
        EULER => Some(std::f64::consts::E),
        PI => Some(std::f64::consts::PI),
        _ => None,
    }
}

fn apply_function(name: &str, args: &[Complex64]) -> Option<Complex64> {
    let x = *args.first()?;
    let value = match (name, args.len()) {
        ("exp", 1) => x.exp(),
        ("sin", 1) => x.sin(),
        ("cos", 1) => x.cos(),
        ("tan", 1) => x.tan(),
        ("sinh", 1) => x.sinh(),
        ("cosh", 1) => x.cosh(),
        ("atan", 1) => x.atan(),
        ("sqrt", 1) => x.sqrt(),
        ("log", 1) | ("ln", 1) => x.ln(),
        ("log10", 1) => x.log10(),
        ("abs", 1) => Complex64::new(x.norm(), 0.0),
        ("realpart", 1) | ("re", 1) => Complex64::new(x.re, 0.0),
        ("imagpart", 1) | ("im", 1) => Complex64::new(x.im, 0.0),
        ("atan2", 2) => Complex64::new(x.re.atan2(args[1].re), 0.0),
        _ => return None,
    };
    Some(value)
}

impl Node {
    /// Parse infix text.
    pub fn parse(text: &str) -> Result<Node> {
        let mut parser = ExprParser {
            text,
            tokens: tokenize(text)?,
            pos: 0,
        };
        let node = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(node)
    }

    /// A numeric literal.
    pub fn number(value: f64) -> Node {
        Node::Number(value)
    }

    /// A symbol.
    pub fn symbol(name: &str) -> Node {
        symbol_node(name)
    }

    /// A function call with one argument.
    pub fn call(name: &str, arg: Node) -> Node {
        Node::Call(name.to_string(), vec![arg])
    }

    /// Integer power.
    pub fn powi(self, k: i32) -> Node {
        match k {
            0 => Node::Number(1.0),
            1 => self,
            k => Node::Pow(Box::new(self), Box::new(Node::Number(k as f64))),
        }
    }

    /// Numeric value of a literal.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Node::Number(v) => Some(*v),
            Node::Neg(inner) => inner.as_number().map(|v| -v),
            _ => None,
        }
    }

    /// Convert to a rational function; fails for calls with symbolic
    /// arguments, the imaginary unit, non-integer symbolic powers and lists.
    pub fn to_expr(&self) -> Result<Expr> {
        match self {
            Node::Number(v) => Ok(Expr::constant(*v)),
            Node::Symbol(name) => Ok(match reserved_value(name) {
                Some(v) => Expr::constant(v),
                None => Expr::symbol(name),
            }),
            Node::Imaginary => Err(SymnaError::expression(self.to_string(), "complex value")),
            Node::Neg(a) => Ok(-a.to_expr()?),
            Node::Add(a, b) => Ok(a.to_expr()? + b.to_expr()?),
            Node::Sub(a, b) => Ok(a.to_expr()? - b.to_expr()?),
            Node::Mul(a, b) => Ok(a.to_expr()? * b.to_expr()?),
            Node::Div(a, b) => Ok(a.to_expr()? / b.to_expr()?),
            Node::Pow(a, b) => {
                let base = a.to_expr()?;
                let exponent = b.to_expr()?.as_f64();
                match exponent {
                    Some(k) if k == k.trunc() && k.abs() <= i32::MAX as f64 => Ok(base.pow(k as i32)),
                    Some(k) => match base.as_f64() {
                        Some(x) => Ok(Expr::constant(x.powf(k))),
                        None => Err(SymnaError::expression(self.to_string(), "non-integer power")),
                    },
                    None => self.fold_numeric(),
                }
            }
            Node::Call(..) => self.fold_numeric(),
            Node::List(_) => Err(SymnaError::expression(self.to_string(), "list value")),
        }
    }

    fn fold_numeric(&self) -> Result<Expr> {
        match self.eval(&|_| None) {
            Some(v) if v.im.abs() <= 1e-12 * v.re.abs().max(1.0) => Ok(Expr::constant(v.re)),
            _ => Err(SymnaError::expression(self.to_string(), "not a rational function")),
        }
    }

    /// Evaluate over the complex numbers with a symbol lookup.
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<Complex64>) -> Option<Complex64> {
        match self {
            Node::Number(v) => Some(Complex64::new(*v, 0.0)),
            Node::Symbol(name) => lookup(name).or_else(|| reserved_value(name).map(|v| Complex64::new(v, 0.0))),
            Node::Imaginary => Some(Complex64::new(0.0, 1.0)),
            Node::Neg(a) => Some(-a.eval(lookup)?),
            Node::Add(a, b) => Some(a.eval(lookup)? + b.eval(lookup)?),
            Node::Sub(a, b) => Some(a.eval(lookup)? - b.eval(lookup)?),
            Node::Mul(a, b) => Some(a.eval(lookup)? * b.eval(lookup)?),
            Node::Div(a, b) => Some(a.eval(lookup)? / b.eval(lookup)?),
            Node::Pow(a, b) => {
                let exponent = b.eval(lookup)?;
                if matches!(a.as_ref(), Node::Symbol(name) if name == EULER) {
                    return Some(exponent.exp());
                }
                let base = a.eval(lookup)?;
                if exponent.im == 0.0 && exponent.re == exponent.re.trunc() && exponent.re.abs() < 1e9 {
                    Some(base.powi(exponent.re as i32))
                } else {
                    Some(base.powc(exponent))
                }
            }
            Node::Call(name, args) => {
                let values: Option<Vec<Complex64>> = args.iter().map(|a| a.eval(lookup)).collect();
                apply_function(name, &values?)
            }
            Node::List(_) => None,
        }
    }

    /// Evaluate to a real number with real bindings.
    pub fn eval_real(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        let value = self.eval(&|name| lookup(name).map(|v| Complex64::new(v, 0.0)))?;
        if value.im.abs() <= 1e-9 * value.re.abs().max(1.0) {
            Some(value.re)
        } else {
            None
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Node::Add(..) | Node::Sub(..) => 1,
            Node::Mul(..) | Node::Div(..) => 2,
            Node::Neg(_) => 3,
            Node::Pow(..) => 4,
            Node::Number(v) if *v < 0.0 => 3,
            _ => 5,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Number(v) => write!(f, "{}", format_number(*v)),
            Node::Symbol(name) => write!(f, "{}", name),
            Node::Imaginary => write!(f, "{}", IMAGINARY_UNIT),
            Node::Neg(a) => {
                write!(f, "-")?;
                a.fmt_operand(f, 3)
            }
            Node::Add(a, b) => {
                a.fmt_operand(f, 1)?;
                write!(f, " + ")?;
                b.fmt_operand(f, 2)
            }
            Node::Sub(a, b) => {
                a.fmt_operand(f, 1)?;
                write!(f, " - ")?;
                b.fmt_operand(f, 2)
            }
            Node::Mul(a, b) => {
                a.fmt_operand(f, 2)?;
                write!(f, "*")?;
                b.fmt_operand(f, 3)
            }
            Node::Div(a, b) => {
                a.fmt_operand(f, 2)?;
                write!(f, "/")?;
                b.fmt_operand(f, 4)
            }
            Node::Pow(a, b) => {
                a.fmt_operand(f, 5)?;
                write!(f, "^")?;
                b.fmt_operand(f, 5)
            }
            Node::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Node::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl std::ops::Add for Node {
    type Output = Node;

    fn add(self, rhs: Node) -> Node {
        match (self.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Node::Number(a + b),
            (Some(a), _) if a == 0.0 => rhs,
            (_, Some(b)) if b == 0.0 => self,
            (_, Some(b)) if b < 0.0 => Node::Sub(Box::new(self), Box::new(Node::Number(-b))),
            _ => Node::Add(Box::new(self), Box::new(rhs)),
        }
    }
}

impl std::ops::Sub for Node {
    type Output = Node;

    fn sub(self, rhs: Node) -> Node {
        match (self.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Node::Number(a - b),
            (Some(a), _) if a == 0.0 => -rhs,
            (_, Some(b)) if b == 0.0 => self,
            _ => Node::Sub(Box::new(self), Box::new(rhs)),
        }
    }
}

impl std::ops::Mul for Node {
    type Output = Node;

    fn mul(self, rhs: Node) -> Node {
        match (self.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Node::Number(a * b),
            (Some(a), _) if a == 0.0 => Node::Number(0.0),
            (_, Some(b)) if b == 0.0 => Node::Number(0.0),
            (Some(a), _) if a == 1.0 => rhs,
            (_, Some(b)) if b == 1.0 => self,
            _ => Node::Mul(Box::new(self), Box::new(rhs)),
        }
    }
}

impl std::ops::Div for Node {
    type Output = Node;

    fn div(self, rhs: Node) -> Node {
        match rhs.as_number() {
            Some(b) if b == 1.0 => self,
            _ => Node::Div(Box::new(self), Box::new(rhs)),
        }
    }
}

impl std::ops::Neg for Node {
    type Output = Node;

    fn neg(self) -> Node {
        match self {
            Node::Number(v) => Node::Number(-v),
            Node::Neg(inner) => *inner,
            other => Node::Neg(Box::new(other)),
        }
    }
}
