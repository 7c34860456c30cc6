use common::expr::{Sort, Value};

use crate::error::BackendError;

/// Parses a model-dump block into `(symbol, constant)` pairs in textual
/// order. This is deliberately not an SMT-LIB parser: it understands
/// assignment lists only, in both the bare pair form `((x #x05))` and the
/// `define-fun` form solvers actually print.
pub fn parse_assignments(text: &str) -> Result<Vec<(String, Value)>, BackendError> {
    Parser::new(text).assignment_list()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Atom(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut atom = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' => {
                if !atom.is_empty() {
                    tokens.push(Token::Atom(std::mem::take(&mut atom)));
                }
                tokens.push(if c == '(' { Token::LParen } else { Token::RParen });
            }
            c if c.is_whitespace() => {
                if !atom.is_empty() {
                    tokens.push(Token::Atom(std::mem::take(&mut atom)));
                }
            }
            c => atom.push(c),
        }
    }
    if !atom.is_empty() {
        tokens.push(Token::Atom(atom));
    }
    tokens
}

struct Parser {
    tokens: std::vec::IntoIter<Token>,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            tokens: tokenize(text).into_iter(),
        }
    }

    fn fail<T>(&self, what: &str) -> Result<T, BackendError> {
        Err(BackendError::UnexpectedResponse(format!(
            "malformed model dump: {what}"
        )))
    }

    fn next(&mut self, what: &str) -> Result<Token, BackendError> {
        match self.tokens.next() {
            Some(token) => Ok(token),
            None => self.fail(what),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), BackendError> {
        if self.next(what)? == expected {
            Ok(())
        } else {
            self.fail(what)
        }
    }

    fn assignment_list(&mut self) -> Result<Vec<(String, Value)>, BackendError> {
        self.expect(Token::LParen, "expected opening paren")?;

        let mut assignments = Vec::new();
        loop {
            match self.next("unterminated assignment list")? {
                Token::RParen => return Ok(assignments),
                Token::LParen => assignments.push(self.assignment()?),
                // Tolerate a leading `model` keyword, as older solvers print.
                Token::Atom(ref a) if a == "model" && assignments.is_empty() => {}
                Token::Atom(_) => return self.fail("expected an assignment pair"),
            }
        }
    }

    /// One assignment, after its opening paren.
    fn assignment(&mut self) -> Result<(String, Value), BackendError> {
        let name = match self.next("expected a symbol")? {
            Token::Atom(a) if a == "define-fun" => {
                let Token::Atom(name) = self.next("expected a symbol")? else {
                    return self.fail("expected a symbol after define-fun");
                };
                // Only zero-argument definitions describe model constants.
                self.expect(Token::LParen, "expected an argument list")?;
                self.expect(Token::RParen, "expected a constant definition")?;
                self.sort()?;
                name
            }
            Token::Atom(name) => name,
            _ => return self.fail("expected a symbol"),
        };

        let value = self.value()?;
        self.expect(Token::RParen, "unterminated assignment pair")?;
        Ok((name, value))
    }

    fn sort(&mut self) -> Result<Sort, BackendError> {
        match self.next("expected a sort")? {
            Token::Atom(ref a) if a == "Bool" => Ok(Sort::Bool),
            Token::LParen => {
                // (_ BitVec n)
                let underscore = self.next("expected an indexed sort")?;
                let head = self.next("expected an indexed sort")?;
                let width = self.next("expected a bit-vector width")?;
                self.expect(Token::RParen, "unterminated sort")?;
                match (underscore, head, width) {
                    (Token::Atom(u), Token::Atom(h), Token::Atom(w))
                        if u == "_" && h == "BitVec" =>
                    {
                        match w.parse() {
                            Ok(width) => Ok(Sort::BitVec(width)),
                            Err(_) => self.fail("bad bit-vector width"),
                        }
                    }
                    _ => self.fail("unsupported sort"),
                }
            }
            _ => self.fail("unsupported sort"),
        }
    }

    fn value(&mut self) -> Result<Value, BackendError> {
        match self.next("expected a value")? {
            Token::Atom(atom) => self.value_from_atom(&atom),
            Token::LParen => {
                // (_ bvN width)
                let underscore = self.next("expected a bv literal")?;
                let literal = self.next("expected a bv literal")?;
                let width = self.next("expected a bv width")?;
                self.expect(Token::RParen, "unterminated bv literal")?;
                match (underscore, literal, width) {
                    (Token::Atom(u), Token::Atom(l), Token::Atom(w)) if u == "_" => {
                        let Some(digits) = l.strip_prefix("bv") else {
                            return self.fail("bad bv literal");
                        };
                        match (digits.parse(), w.parse()) {
                            (Ok(bits), Ok(width)) => Ok(Value::bv(width, bits)),
                            _ => self.fail("bad bv literal"),
                        }
                    }
                    _ => self.fail("bad bv literal"),
                }
            }
            Token::RParen => self.fail("expected a value"),
        }
    }

    fn value_from_atom(&self, atom: &str) -> Result<Value, BackendError> {
        if atom == "true" {
            return Ok(Value::Bool(true));
        }
        if atom == "false" {
            return Ok(Value::Bool(false));
        }
        if let Some(hex) = atom.strip_prefix("#x") {
            return match u128::from_str_radix(hex, 16) {
                Ok(bits) => Ok(Value::bv(4 * hex.len() as u32, bits)),
                Err(_) => self.fail("bad hexadecimal literal"),
            };
        }
        if let Some(bin) = atom.strip_prefix("#b") {
            return match u128::from_str_radix(bin, 2) {
                Ok(bits) => Ok(Value::bv(bin.len() as u32, bits)),
                Err(_) => self.fail("bad binary literal"),
            };
        }
        self.fail("unsupported value literal")
    }
}
