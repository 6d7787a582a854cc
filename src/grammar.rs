//! Parser for the single call expression the model writes in its code block.
//!
//! Only the operation names of the action grammar are callable and only
//! literal keyword arguments are accepted. Nothing in the block is ever
//! evaluated.

use thiserror::Error;

use crate::action::{Literal, Operation};

/// A call expression lifted out of the model's code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    /// Keyword arguments in the order they were written.
    pub args: Vec<(String, Literal)>,
}

impl Call {
    pub fn arg(&self, name: &str) -> Option<&Literal> {
        self.args
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("name '{0}' is not defined; only the listed functions can be called")]
    UnknownName(String),

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    Unexpected {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid escape sequence '\\{0}' in string literal")]
    InvalidEscape(char),

    #[error("integer literal '{0}' is out of range")]
    IntegerOverflow(String),

    #[error("{operation}() takes keyword arguments only, e.g. {template}")]
    PositionalArgument {
        operation: Operation,
        template: String,
    },

    #[error("keyword argument '{0}' repeated")]
    DuplicateArgument(String),

    #[error("expected a single function call, found more input at offset {0}")]
    TrailingInput(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Int(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Equals,
    Minus,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Name(name) => format!("name '{name}'"),
            Token::Int(digits) => format!("integer {digits}"),
            Token::Str(_) => "string literal".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Minus => "'-'".to_string(),
        }
    }
}

fn lex(src: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' | ')' | ',' | '=' | '-' => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '=' => Token::Equals,
                    _ => Token::Minus,
                };
                tokens.push((token, offset));
            }
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                tokens.push((Token::Int(digits), offset));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if !(n.is_ascii_alphanumeric() || n == '_') {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                tokens.push((Token::Name(name), offset));
            }
            '"' | '\'' => {
                chars.next();
                let value = lex_string(&mut chars, c, offset)?;
                tokens.push((Token::Str(value), offset));
            }
            other => {
                return Err(ParseError::Unexpected {
                    found: format!("character {other:?}"),
                    expected: "a function call",
                    offset,
                });
            }
        }
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, ParseError> {
    let mut value = String::new();
    loop {
        let Some((_, c)) = chars.next() else {
            return Err(ParseError::UnterminatedString(start));
        };
        match c {
            '\n' => return Err(ParseError::UnterminatedString(start)),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    return Err(ParseError::UnterminatedString(start));
                };
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' | '\'' | '"' => escaped,
                    other => return Err(ParseError::InvalidEscape(other)),
                });
            }
            c if c == quote => return Ok(value),
            c => value.push(c),
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(token, _)| token)
    }

    fn next(&mut self, expected: &'static str) -> Result<(Token, usize), ParseError> {
        match self.tokens.get(self.pos) {
            Some(entry) => {
                self.pos += 1;
                Ok(entry.clone())
            }
            None => Err(ParseError::Unexpected {
                found: "end of input".to_string(),
                expected,
                offset: self.end,
            }),
        }
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), ParseError> {
        let (token, offset) = self.next(expected)?;
        if token == want {
            Ok(())
        } else {
            Err(ParseError::Unexpected {
                found: token.describe(),
                expected,
                offset,
            })
        }
    }

    fn call(&mut self) -> Result<Call, ParseError> {
        let operation = match self.next("a function call")? {
            (Token::Name(name), _) => {
                Operation::from_name(&name).ok_or(ParseError::UnknownName(name))?
            }
            (token, offset) => {
                return Err(ParseError::Unexpected {
                    found: token.describe(),
                    expected: "a function call",
                    offset,
                });
            }
        };
        self.expect(Token::LParen, "'('")?;

        let mut args: Vec<(String, Literal)> = Vec::new();
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                break;
            }

            let name = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Name(name)), Some(Token::Equals)) => name.clone(),
                (None, _) => {
                    return Err(ParseError::Unexpected {
                        found: "end of input".to_string(),
                        expected: "')'",
                        offset: self.end,
                    });
                }
                _ => {
                    return Err(ParseError::PositionalArgument {
                        operation,
                        template: operation.template(),
                    });
                }
            };
            self.pos += 2;

            if args.iter().any(|(key, _)| *key == name) {
                return Err(ParseError::DuplicateArgument(name));
            }
            let value = self.literal()?;
            args.push((name, value));

            match self.next("',' or ')'")? {
                (Token::Comma, _) => {}
                (Token::RParen, _) => break,
                (token, offset) => {
                    return Err(ParseError::Unexpected {
                        found: token.describe(),
                        expected: "',' or ')'",
                        offset,
                    });
                }
            }
        }

        Ok(Call { operation, args })
    }

    fn literal(&mut self) -> Result<Literal, ParseError> {
        const EXPECTED: &str = "an integer, string or boolean literal";
        match self.next(EXPECTED)? {
            (Token::Int(digits), _) => parse_int(&digits),
            (Token::Minus, _) => match self.next(EXPECTED)? {
                (Token::Int(digits), _) => parse_int(&format!("-{digits}")),
                (token, offset) => Err(ParseError::Unexpected {
                    found: token.describe(),
                    expected: "an integer",
                    offset,
                }),
            },
            (Token::Str(value), _) => Ok(Literal::Str(value)),
            (Token::Name(name), _) => match name.as_str() {
                "True" | "true" => Ok(Literal::Bool(true)),
                "False" | "false" => Ok(Literal::Bool(false)),
                _ => Err(ParseError::UnknownName(name)),
            },
            (token, offset) => Err(ParseError::Unexpected {
                found: token.describe(),
                expected: EXPECTED,
                offset,
            }),
        }
    }
}

fn parse_int(text: &str) -> Result<Literal, ParseError> {
    text.parse::<i64>()
        .map(Literal::Int)
        .map_err(|_| ParseError::IntegerOverflow(text.to_string()))
}

/// Parse the body of a code block.
///
/// Returns `Ok(None)` when the block holds no call at all (only whitespace or
/// comments).
pub fn parse_call(src: &str) -> Result<Option<Call>, ParseError> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
    };
    let call = parser.call()?;

    if let Some((_, offset)) = parser.tokens.get(parser.pos) {
        return Err(ParseError::TrailingInput(*offset));
    }
    Ok(Some(call))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_keyword_call() {
        let call = parse_call("type(id=3, text=\"hello\", submit=True)")
            .unwrap()
            .unwrap();
        assert_eq!(call.operation, Operation::Type);
        assert_eq!(
            call.args,
            vec![
                ("id".to_string(), Literal::Int(3)),
                ("text".to_string(), Literal::Str("hello".to_string())),
                ("submit".to_string(), Literal::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_parses_bare_and_spread_calls() {
        let call = parse_call("  # done\nset_objective_complete()\n").unwrap().unwrap();
        assert_eq!(call.operation, Operation::SetObjectiveComplete);
        assert!(call.args.is_empty());

        let call = parse_call("click(\n    id = 12,\n)").unwrap().unwrap();
        assert_eq!(call.arg("id"), Some(&Literal::Int(12)));
    }

    #[test]
    fn test_string_escapes_and_quotes() {
        let call = parse_call(r#"type(id=1, text='it\'s "ok"\n', submit=false)"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            call.arg("text"),
            Some(&Literal::Str("it's \"ok\"\n".to_string()))
        );
        assert_eq!(call.arg("submit"), Some(&Literal::Bool(false)));
    }

    #[test]
    fn test_empty_block_has_no_call() {
        assert_eq!(parse_call("").unwrap(), None);
        assert_eq!(parse_call("   \n# thinking\n").unwrap(), None);
    }

    #[test]
    fn test_rejects_names_outside_the_grammar() {
        assert_eq!(
            parse_call("exec(id=1)"),
            Err(ParseError::UnknownName("exec".to_string()))
        );
        assert_eq!(
            parse_call("scroll(direction='up')"),
            Err(ParseError::UnknownName("scroll".to_string()))
        );
        assert_eq!(
            parse_call("click(id=open)"),
            Err(ParseError::UnknownName("open".to_string()))
        );
    }

    #[test]
    fn test_rejects_expressions_and_extra_statements() {
        assert!(matches!(
            parse_call("click(id=1+1)"),
            Err(ParseError::Unexpected { .. })
        ));
        assert!(matches!(
            parse_call("__import__('os').system('ls')"),
            Err(ParseError::UnknownName(_))
        ));
        assert_eq!(
            parse_call("go_back()\ngo_back()"),
            Err(ParseError::TrailingInput(10))
        );
        assert!(matches!(
            parse_call("click(id=1"),
            Err(ParseError::Unexpected { .. })
        ));
        assert_eq!(
            parse_call("type(id=1, text='x"),
            Err(ParseError::UnterminatedString(16))
        );
    }

    #[test]
    fn test_rejects_positional_and_repeated_arguments() {
        assert!(matches!(
            parse_call("click(7)"),
            Err(ParseError::PositionalArgument {
                operation: Operation::Click,
                ..
            })
        ));
        assert_eq!(
            parse_call("click(id=1, id=2)"),
            Err(ParseError::DuplicateArgument("id".to_string()))
        );
    }

    #[test]
    fn test_negative_and_overflowing_integers() {
        let call = parse_call("click(id=-4)").unwrap().unwrap();
        assert_eq!(call.arg("id"), Some(&Literal::Int(-4)));
        assert!(matches!(
            parse_call("click(id=99999999999999999999)"),
            Err(ParseError::IntegerOverflow(_))
        ));
    }
}
