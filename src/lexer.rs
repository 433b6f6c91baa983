use std::fmt;

use crate::config::TokenConfig;
use crate::token::{Span, Token, TokenKind};

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    /// A required delimiter was missing.
    Expected { expected: String, found: String },
    /// An argument group was never closed.
    UnbalancedBraces,
    /// An inline expression was never closed.
    UnterminatedExpression,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { expected, found } if found.is_empty() => {
                write!(f, "expected '{expected}', got end of input")
            }
            Self::Expected { expected, found } => {
                write!(f, "expected '{expected}', got '{found}'")
            }
            Self::UnbalancedBraces => {
                write!(f, "unbalanced braces in command arguments")
            }
            Self::UnterminatedExpression => {
                write!(f, "unterminated inline expression")
            }
        }
    }
}

/// Error produced during lexing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    /// Attach the origin file if the error does not carry one yet.
    #[must_use]
    pub fn in_file(mut self, file: &str) -> Self {
        self.span.stamp(file);
        self
    }
}

/// Tokenize template source into a flat token sequence.
///
/// Concatenating the text of every returned token reproduces `input`.
///
/// # Errors
///
/// Returns `LexError` on unbalanced argument groups, unterminated
/// parameter lists, or unterminated inline expressions.
pub fn tokenize(input: &str, config: &TokenConfig) -> Result<Vec<Token>, LexError> {
    Lexer::new(input, config).tokenize()
}

struct Lexer<'a> {
    input: &'a str,
    config: &'a TokenConfig,
    pos: usize,
    row: usize,
    col: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    const fn new(input: &'a str, config: &'a TokenConfig) -> Self {
        Self {
            input,
            config,
            pos: 0,
            row: 0,
            col: 0,
            tokens: Vec::new(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        while !self.at_end() {
            if self.at_command() {
                self.lex_command()?;
            } else if self.at(&self.config.eval_start) {
                self.lex_expression()?;
            } else {
                self.lex_raw();
            }
        }
        Ok(self.tokens)
    }

    const fn span(&self) -> Span {
        Span::new(self.row, self.col)
    }

    const fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at(&self, delimiter: &str) -> bool {
        !delimiter.is_empty() && self.rest().starts_with(delimiter)
    }

    // prefix followed by anything but whitespace or another prefix
    fn at_command(&self) -> bool {
        let prefix = self.config.prefix.as_str();
        if !self.at(prefix) {
            return false;
        }
        let after = &self.rest()[prefix.len()..];
        match after.chars().next() {
            None | Some(' ' | '\n' | '\t' | '\r') => false,
            Some(_) => !after.starts_with(prefix),
        }
    }

    fn at_escaped_prefix(&self) -> bool {
        let prefix = self.config.prefix.as_str();
        self.at(prefix) && self.rest()[prefix.len()..].starts_with(prefix)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.rest().chars().next() {
            if ch == '\n' {
                self.row += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn advance_str(&mut self, text: &str) {
        let end = self.pos + text.len();
        while self.pos < end {
            self.advance();
        }
    }

    fn consume(&mut self, expected: &str) -> Result<(), LexError> {
        if self.at(expected) {
            self.advance_str(expected);
            return Ok(());
        }
        let found = self.rest().chars().take(expected.chars().count()).collect();
        Err(LexError {
            kind: LexErrorKind::Expected {
                expected: expected.to_string(),
                found,
            },
            span: self.span(),
        })
    }

    fn push(&mut self, kind: TokenKind, text: &str, span: Span) {
        self.tokens.push(Token {
            kind,
            text: text.to_string(),
            span,
        });
    }

    /// Emit a delimiter token at the cursor and step over it.
    fn push_delimiter(&mut self, kind: TokenKind, delimiter: &str) -> Result<(), LexError> {
        let span = self.span();
        self.consume(delimiter)?;
        self.push(kind, delimiter, span);
        Ok(())
    }

    fn lex_raw(&mut self) {
        let span = self.span();
        let start = self.pos;

        while !self.at_end() && !self.at_command() && !self.at(&self.config.eval_start) {
            if self.at_escaped_prefix() {
                let doubled = self.config.prefix.repeat(2);
                self.advance_str(&doubled);
            } else {
                self.advance();
            }
        }

        let text = &self.input[start..self.pos];
        self.push(TokenKind::Raw, text, span);
    }

    fn lex_expression(&mut self) -> Result<(), LexError> {
        let span = self.span();
        let start = self.pos;
        let config = self.config;

        self.advance_str(&config.eval_start);
        while !self.at_end() && !self.at(&config.eval_end) {
            self.advance();
        }
        if self.at_end() {
            return Err(LexError {
                kind: LexErrorKind::UnterminatedExpression,
                span,
            });
        }
        self.advance_str(&config.eval_end);

        let text = &self.input[start..self.pos];
        self.push(TokenKind::Expression, text, span);
        Ok(())
    }

    fn lex_command(&mut self) -> Result<(), LexError> {
        let config = self.config;
        self.push_delimiter(TokenKind::Prefix, &config.prefix)?;

        let span = self.span();
        let start = self.pos;
        while !self.at_end()
            && !self.at(&config.param_start)
            && !self.at(&config.arg_start)
            && !matches!(self.rest().chars().next(), Some(' ' | '\n' | '\t' | '\r'))
        {
            self.advance();
        }
        let name = &self.input[start..self.pos];
        self.push(TokenKind::CommandName, name, span);

        if self.at(&config.param_start) {
            self.lex_params()?;
        }
        while self.at(&config.arg_start) {
            self.lex_argument()?;
        }
        Ok(())
    }

    fn lex_params(&mut self) -> Result<(), LexError> {
        let config = self.config;
        self.push_delimiter(TokenKind::ParamStart, &config.param_start)?;

        while !self.at_end() && !self.at(&config.param_end) {
            let span = self.span();
            let start = self.pos;
            while !self.at_end()
                && !self.at(&config.param_assign)
                && !self.at(&config.param_sep)
                && !self.at(&config.param_end)
            {
                self.advance();
            }
            let key = &self.input[start..self.pos];
            self.push(TokenKind::ParamKey, key, span);

            if self.at(&config.param_assign) {
                self.push_delimiter(TokenKind::ParamAssign, &config.param_assign)?;
                let span = self.span();
                let value = self.scan_param_value();
                let nested = self.nested(value, &span)?;
                self.tokens.extend(nested);
            }

            if self.at(&config.param_sep) {
                self.push_delimiter(TokenKind::ParamSep, &config.param_sep)?;
            }
        }

        self.push_delimiter(TokenKind::ParamEnd, &config.param_end)
    }

    /// Scan a parameter value up to the next top-level separator or end.
    /// Separators inside argument groups do not end the value.
    fn scan_param_value(&mut self) -> &'a str {
        let config = self.config;
        let start = self.pos;
        let mut depth = 0usize;

        while !self.at_end() {
            if self.at(&config.arg_start) {
                depth += 1;
                self.advance_str(&config.arg_start);
                continue;
            }
            if depth > 0 && self.at(&config.arg_end) {
                depth -= 1;
                self.advance_str(&config.arg_end);
                continue;
            }
            if depth == 0 && (self.at(&config.param_sep) || self.at(&config.param_end)) {
                break;
            }
            self.advance();
        }

        &self.input[start..self.pos]
    }

    fn lex_argument(&mut self) -> Result<(), LexError> {
        let config = self.config;
        let open = self.span();
        self.push_delimiter(TokenKind::ArgStart, &config.arg_start)?;

        let group_span = self.span();
        let start = self.pos;
        let mut depth = 1usize;

        let end = loop {
            if self.at_end() {
                return Err(LexError {
                    kind: LexErrorKind::UnbalancedBraces,
                    span: open,
                });
            }
            if self.at(&config.arg_start) {
                depth += 1;
                self.advance_str(&config.arg_start);
            } else if self.at(&config.arg_end) {
                depth -= 1;
                if depth == 0 {
                    break self.pos;
                }
                self.advance_str(&config.arg_end);
            } else if self.at(&config.prefix) {
                // prefix plus one run of non-delimiters is copied as-is
                self.advance_str(&config.prefix);
                while !self.at_end()
                    && !self.at(&config.arg_start)
                    && !self.at(&config.arg_end)
                    && !self.at(&config.prefix)
                {
                    self.advance();
                }
            } else {
                self.advance();
            }
        };

        let group = &self.input[start..end];
        let nested = self.nested(group, &group_span)?;
        self.tokens.extend(nested);

        self.push_delimiter(TokenKind::ArgEnd, &config.arg_end)
    }

    /// Tokenize a sub-slice and shift its spans to absolute positions.
    fn nested(&self, text: &str, base: &Span) -> Result<Vec<Token>, LexError> {
        let mut tokens = Lexer::new(text, self.config).tokenize().map_err(|mut e| {
            e.span.shift(base.row, base.col);
            e
        })?;
        for token in &mut tokens {
            token.span.shift(base.row, base.col);
        }
        Ok(tokens)
    }
}
