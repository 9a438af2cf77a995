//! # Tokenizer
//!
//! Turns contract source text into positioned tokens.
//! Floating point literals are rejected here so they never reach execution.

use crate::errors::CompileError;

/// Reserved words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    /// `function`
    Function,
    /// `let`, also `var`
    Let,
    /// `const`
    Const,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `return`
    Return,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `throw`
    Throw,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "function" => Self::Function,
            "let" | "var" => Self::Let,
            "const" => Self::Const,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "throw" => Self::Throw,
            "true" => Self::True,
            "false" => Self::False,
            "null" | "undefined" => Self::Null,
            _ => return None,
        };
        Some(keyword)
    }
}

/// Punctuation and operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
}

/// A lexical token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// Identifier.
    Ident(String),
    /// Integer literal.
    Int(i64),
    /// String literal, escapes resolved.
    Str(String),
    /// Reserved word.
    Keyword(Keyword),
    /// Operator or delimiter.
    Punct(Punct),
    /// End of input.
    Eof,
}

/// A token with its 1-based source position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Line.
    pub line: usize,
    /// Column.
    pub column: usize,
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }
}

/// Tokenizes a whole source text. The last token is always [`Token::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut cursor = Cursor {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();

    loop {
        skip_trivia(&mut cursor)?;
        let (line, column) = (cursor.line, cursor.column);
        let Some(c) = cursor.peek() else {
            tokens.push(Spanned {
                token: Token::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let token = if c.is_ascii_digit() {
            lex_number(&mut cursor, line, column)?
        } else if c == '"' || c == '\'' {
            lex_string(&mut cursor, line, column)?
        } else if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let mut word = String::new();
            while let Some(c) = cursor.peek() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                    word.push(c);
                    cursor.bump();
                } else {
                    break;
                }
            }
            Keyword::from_word(&word).map_or(Token::Ident(word), Token::Keyword)
        } else {
            cursor.bump();
            Token::Punct(lex_punct(&mut cursor, c, line, column)?)
        };

        tokens.push(Spanned {
            token,
            line,
            column,
        });
    }
}

fn skip_trivia(cursor: &mut Cursor<'_>) -> Result<(), CompileError> {
    loop {
        match cursor.peek() {
            Some(c) if c.is_whitespace() => {
                cursor.bump();
            }
            Some('/') => {
                let mut lookahead = cursor.chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some('/') => {
                        while let Some(c) = cursor.bump() {
                            if c == '\n' {
                                break;
                            }
                        }
                    }
                    Some('*') => {
                        let (line, column) = (cursor.line, cursor.column);
                        cursor.bump();
                        cursor.bump();
                        let mut closed = false;
                        while let Some(c) = cursor.bump() {
                            if c == '*' && cursor.eat('/') {
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(CompileError::new(
                                "unterminated block comment",
                                line,
                                column,
                            ));
                        }
                    }
                    _ => return Ok(()),
                }
            }
            _ => return Ok(()),
        }
    }
}

fn lex_number(cursor: &mut Cursor<'_>, line: usize, column: usize) -> Result<Token, CompileError> {
    let mut digits = String::new();
    while let Some(c) = cursor.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            cursor.bump();
        } else {
            break;
        }
    }

    match cursor.peek() {
        Some('.' | 'e' | 'E') => {
            return Err(CompileError::new(
                "floating point literals are not supported",
                line,
                column,
            ));
        }
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            return Err(CompileError::new(
                format!("invalid numeric literal `{digits}{c}`"),
                line,
                column,
            ));
        }
        _ => {}
    }

    digits
        .parse::<i64>()
        .map(Token::Int)
        .map_err(|_| CompileError::new(format!("integer literal `{digits}` out of range"), line, column))
}

fn lex_string(cursor: &mut Cursor<'_>, line: usize, column: usize) -> Result<Token, CompileError> {
    let quote = cursor.bump().unwrap_or('"');
    let mut out = String::new();
    loop {
        let Some(c) = cursor.bump() else {
            return Err(CompileError::new("unterminated string literal", line, column));
        };
        match c {
            c if c == quote => return Ok(Token::Str(out)),
            '\n' => {
                return Err(CompileError::new("unterminated string literal", line, column));
            }
            '\\' => {
                let (esc_line, esc_column) = (cursor.line, cursor.column);
                let escaped = match cursor.bump() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('0') => '\0',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('\'') => '\'',
                    Some(other) => {
                        return Err(CompileError::new(
                            format!("unknown escape `\\{other}`"),
                            esc_line,
                            esc_column,
                        ));
                    }
                    None => {
                        return Err(CompileError::new("unterminated string literal", line, column));
                    }
                };
                out.push(escaped);
            }
            other => out.push(other),
        }
    }
}

fn lex_punct(
    cursor: &mut Cursor<'_>,
    c: char,
    line: usize,
    column: usize,
) -> Result<Punct, CompileError> {
    let punct = match c {
        '(' => Punct::LParen,
        ')' => Punct::RParen,
        '{' => Punct::LBrace,
        '}' => Punct::RBrace,
        '[' => Punct::LBracket,
        ']' => Punct::RBracket,
        ',' => Punct::Comma,
        ';' => Punct::Semicolon,
        ':' => Punct::Colon,
        '.' => Punct::Dot,
        '*' => Punct::Star,
        '/' => Punct::Slash,
        '%' => Punct::Percent,
        '+' if cursor.eat('=') => Punct::PlusAssign,
        '+' => Punct::Plus,
        '-' if cursor.eat('=') => Punct::MinusAssign,
        '-' => Punct::Minus,
        '=' if cursor.eat('=') => {
            cursor.eat('=');
            Punct::Eq
        }
        '=' => Punct::Assign,
        '!' if cursor.eat('=') => {
            cursor.eat('=');
            Punct::NotEq
        }
        '!' => Punct::Bang,
        '<' if cursor.eat('=') => Punct::LtEq,
        '<' => Punct::Lt,
        '>' if cursor.eat('=') => Punct::GtEq,
        '>' => Punct::Gt,
        '&' if cursor.eat('&') => Punct::AndAnd,
        '|' if cursor.eat('|') => Punct::OrOr,
        other => {
            return Err(CompileError::new(
                format!("unexpected character `{other}`"),
                line,
                column,
            ));
        }
    };
    Ok(punct)
}
