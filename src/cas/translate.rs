//! Literal translation of Maxima output into the crate's expression syntax.
//!
//! Maxima prints big floats as `1.5b3`, constants as `%i`, `%e` and `%pi`,
//! and matrices as `matrix([a, b], [c, d])`. These are rewritten to
//! `1.5e3`, `I`, `E`, `pi` and `[[a, b], [c, d]]` before parsing.

use super::CasError;
use crate::symbolic::Node;

/// Rewrite one line of Maxima output.
pub fn translate(output: &str) -> String {
    let chars: Vec<char> = output.chars().collect();
    let mut out = String::with_capacity(output.len());
    // One entry per open parenthesis: true when it opened `matrix(`.
    let mut parens: Vec<bool> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '%' {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            out.push_str(match name.as_str() {
                "%i" => "I",
                "%e" => "E",
                "%pi" => "pi",
                other => other,
            });
            continue;
        }
        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            if name == "matrix" && chars.get(i) == Some(&'(') {
                out.push('[');
                parens.push(true);
                i += 1;
            } else {
                out.push_str(&name);
            }
            continue;
        }
        if ch.is_ascii_digit() || ch == '.' {
            // Numbers: a `b` exponent marker becomes `e`.
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                out.push(chars[i]);
                i += 1;
            }
            if i + 1 < chars.len()
                && chars[i] == 'b'
                && (chars[i + 1].is_ascii_digit()
                    || ((chars[i + 1] == '-' || chars[i + 1] == '+')
                        && chars.get(i + 2).map_or(false, |c| c.is_ascii_digit())))
            {
                out.push('e');
                i += 1;
            }
            continue;
        }
        match ch {
            '(' => {
                parens.push(false);
                out.push('(');
            }
            ')' => {
                out.push(if parens.pop() == Some(true) { ']' } else { ')' });
            }
            _ => out.push(ch),
        }
        i += 1;
    }
    out
}

/// Extract the result from raw process output: the last non-empty line,
/// translated and parsed.
pub fn parse_output(raw: &str) -> Result<Node, CasError> {
    let line = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or(CasError::EmptyOutput)?;
    let translated = translate(line);
    Node::parse(&translated).map_err(|err| CasError::Unparseable {
        output: line.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_literals() {
        assert_eq!(translate("1.5b3*x"), "1.5e3*x");
        assert_eq!(translate("2.0b-7"), "2.0e-7");
        assert_eq!(translate("%e^(-t)*%i+%pi"), "E^(-t)*I+pi");
        assert_eq!(translate("matrix([a,b],[c,d])"), "[[a,b],[c,d]]");
        assert_eq!(translate("matrix([(a+b)],[c])"), "[[(a+b)],[c]]");
        assert_eq!(translate("bandwidth*b"), "bandwidth*b");
    }

    #[test]
    fn test_parse_output_takes_last_line() {
        let raw = "Maxima banner\n(%i1) batch\n\n  R2/(R2+R1)  \n\n";
        let node = parse_output(raw).unwrap();
        let expr = node.to_expr().unwrap();
        assert_eq!(expr, crate::symbolic::Expr::parse("R2/(R1+R2)").unwrap());
    }

    #[test]
    fn test_parse_output_failures() {
        assert_eq!(parse_output("\n  \n"), Err(CasError::EmptyOutput));
        assert!(matches!(parse_output("x + )"), Err(CasError::Unparseable { .. })));
    }
}
