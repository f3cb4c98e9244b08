//! Parser for the netlist language.

use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use crate::circuit::Model;
use crate::error::{Result, SymnaError};

/// Parser for netlists.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

/// Positional word of an element line.
struct Word {
    kind: TokenKind,
    text: String,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            current: Token {
                kind: TokenKind::Newline,
                text: String::new(),
                line: 1,
                column: 1,
            },
        }
    }

    /// Parse the entire netlist.
    pub fn parse(&mut self) -> Result<CircuitAst> {
        let mut ast = CircuitAst::new();
        self.advance()?;

        while self.current.kind != TokenKind::Eof {
            match self.current.kind {
                TokenKind::Newline => {
                    self.advance()?;
                    continue;
                }
                TokenKind::Directive => {
                    if !self.parse_directive(&mut ast)? {
                        break;
                    }
                }
                TokenKind::Identifier => {
                    let element = self.parse_element()?;
                    ast.elements.push(element);
                }
                _ => {
                    return Err(SymnaError::parse(
                        self.current.line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }

            match self.current.kind {
                TokenKind::Newline => self.advance()?,
                TokenKind::Eof => {}
                _ => {
                    return Err(SymnaError::parse(
                        self.current.line,
                        format!("unexpected trailing token: {:?}", self.current.text),
                    ))
                }
            }
        }

        Ok(ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(SymnaError::parse(
                self.current.line,
                format!("expected {:?}, got {:?}", kind, self.current.kind),
            ))
        }
    }

    /// Value after `=`: a number, a symbol or a braced expression.
    fn expect_value(&mut self) -> Result<String> {
        match self.current.kind {
            TokenKind::Number | TokenKind::Identifier | TokenKind::Expression => {
                let text = self.current.text.clone();
                self.advance()?;
                Ok(text)
            }
            _ => Err(SymnaError::parse(self.current.line, "expected a value")),
        }
    }

    /// Returns false on `.end`.
    fn parse_directive(&mut self, ast: &mut CircuitAst) -> Result<bool> {
        let directive = self.current.text.to_lowercase();
        let line = self.current.line;

        match directive.as_str() {
            ".title" => {
                ast.title = Some(self.lexer.rest_of_line());
                self.advance()?;
            }
            ".param" => {
                self.advance()?;
                while self.current.kind == TokenKind::Identifier {
                    let name = self.current.text.clone();
                    self.advance()?;
                    self.expect(TokenKind::Equals)?;
                    let value = self.expect_value()?;
                    ast.params.push(ParamDef { name, value, line });
                }
            }
            ".end" => return Ok(false),
            _ => {
                return Err(SymnaError::parse(
                    line,
                    format!("unknown directive: {}", directive),
                ));
            }
        }

        Ok(true)
    }

    fn parse_element(&mut self) -> Result<ElementDef> {
        let refdes = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        let mut words = Vec::new();
        let mut params = Vec::new();

        while self.current.kind != TokenKind::Newline && self.current.kind != TokenKind::Eof {
            let tok = self.current.clone();
            match tok.kind {
                TokenKind::Identifier | TokenKind::Number | TokenKind::Expression => {
                    self.advance()?;
                    if tok.kind == TokenKind::Identifier && self.current.kind == TokenKind::Equals {
                        self.advance()?;
                        let value = self.expect_value()?;
                        params.push((tok.text.to_lowercase(), value));
                    } else {
                        words.push(Word {
                            kind: tok.kind,
                            text: tok.text,
                        });
                    }
                }
                _ => {
                    return Err(SymnaError::parse(
                        line,
                        format!("{}: unexpected token {:?}", refdes, tok.text),
                    ))
                }
            }
        }

        let (model, connections, rest) = split_model(&refdes, words, line)?;

        if rest.len() > 1 {
            return Err(SymnaError::parse(
                line,
                format!("{}: more than one positional value", refdes),
            ));
        }

        let (nodes, refs) = if model == Model::Coupling {
            (Vec::new(), connections)
        } else {
            (connections, Vec::new())
        };

        Ok(ElementDef {
            refdes,
            model,
            nodes,
            refs,
            value: rest.into_iter().next(),
            params,
            line,
        })
    }
}

/// Split the positional words of an element line into model, connections
/// and values.
///
/// An explicit model keyword is recognised only right after the
/// connections it needs, so node names that happen to spell a keyword are
/// still nodes.
fn split_model(refdes: &str, words: Vec<Word>, line: usize) -> Result<(Model, Vec<String>, Vec<String>)> {
    let explicit = words.iter().enumerate().find_map(|(idx, word)| {
        if word.kind != TokenKind::Identifier {
            return None;
        }
        let model = Model::from_keyword(&word.text)?;
        (model.node_count() + model.ref_count() == idx).then_some((idx, model))
    });

    let (model, count, skip) = match explicit {
        Some((idx, model)) => (model, idx, 1),
        None => {
            let model = Model::from_prefix(refdes).ok_or_else(|| {
                SymnaError::parse(line, format!("{}: unknown element type", refdes))
            })?;
            (model, model.node_count() + model.ref_count(), 0)
        }
    };

    if words.len() < count {
        return Err(SymnaError::parse(
            line,
            format!(
                "{}: model {} needs {} connections, got {}",
                refdes,
                model,
                count,
                words.len()
            ),
        ));
    }

    let mut texts = words.into_iter().map(|w| w.text);
    let connections: Vec<String> = texts.by_ref().take(count).collect();
    let rest: Vec<String> = texts.skip(skip).collect();
    Ok((model, connections, rest))
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    #[test]
    fn test_parse_resistor() {
        let ast = parse("R1 in out 10k").unwrap();
        assert_eq!(ast.elements.len(), 1);
        let r = &ast.elements[0];
        assert_eq!(r.model, Model::Resistor);
        assert_eq!(r.refdes, "R1");
        assert_eq!(r.nodes, vec!["in", "out"]);
        assert_eq!(r.value.as_deref(), Some("10k"));
    }

    #[test]
    fn test_parse_explicit_model_and_params() {
        let input = "E1 out 0 p n EZ {A0/(1+s/w1)} zo=Ro\nR2 1 0 r R\nRx C E 1k";
        let ast = parse(input).unwrap();
        let e = &ast.elements[0];
        assert_eq!(e.model, Model::VcvsZo);
        assert_eq!(e.nodes, vec!["out", "0", "p", "n"]);
        assert_eq!(e.value.as_deref(), Some("A0/(1+s/w1)"));
        assert_eq!(e.params, vec![("zo".to_string(), "Ro".to_string())]);

        assert_eq!(ast.elements[1].model, Model::ResistorBranch);
        assert_eq!(ast.elements[1].value.as_deref(), Some("R"));

        // node names spelling keywords stay nodes
        assert_eq!(ast.elements[2].model, Model::Resistor);
        assert_eq!(ast.elements[2].nodes, vec!["C", "E"]);
    }

    #[test]
    fn test_parse_directives() {
        let input = ".title RC low-pass\n.param R=1k C={1/(2*pi*R*1k)}\nK1 L1 L2 0.9\n.end\nR9 1 0";
        let ast = parse(input).unwrap();
        assert_eq!(ast.title.as_deref(), Some("RC low-pass"));
        assert_eq!(ast.params.len(), 2);
        assert_eq!(ast.params[1].value, "1/(2*pi*R*1k)");
        assert_eq!(ast.elements.len(), 1);
        assert_eq!(ast.elements[0].refs, vec!["L1", "L2"]);
        assert!(ast.elements[0].nodes.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("R1 in"), Err(SymnaError::ParseError { line: 1, .. })));
        assert!(matches!(parse("\nX1 a b"), Err(SymnaError::ParseError { line: 2, .. })));
        assert!(parse("R1 a b 1 2").is_err());
        assert!(parse(".include x").is_err());
    }

    #[test]
    fn test_parse_with_comments() {
        let input = "* header\n# comment\nR1 in out 1k ; inline comment style\n";
        let ast = parse(input).unwrap();
        assert_eq!(ast.elements.len(), 1);
    }
}
