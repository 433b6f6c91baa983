//! Built-in expression evaluator for inline expressions.
//!
//! Supports numbers, quoted strings, booleans, arithmetic, comparison,
//! logical operators and the ternary conditional. `+` concatenates when
//! either side is a string.

#![allow(clippy::float_cmp)]

use std::fmt;

use logos::Logos;

/// Error produced while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unrecognized input '{0}'")]
    InvalidToken(String),
    #[error("unexpected '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("'{0}' is not defined")]
    Undefined(String),
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r"'([^'\\]|\\.)*'", |lex| unquote(lex.slice()))]
    Str(String),
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("===")]
    StrictEq,
    #[token("!==")]
    StrictNe,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Not,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// A runtime value of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn to_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Str(s) if s.trim().is_empty() => 0.0,
            Self::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
        }
    }

    fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }

    fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.is_nan() => f.write_str("NaN"),
            Self::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The default `Evaluator`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

impl Calculator {
    /// Evaluate `source` and render the result as text.
    ///
    /// # Errors
    ///
    /// Returns `EvalError` on invalid syntax or unknown identifiers.
    pub fn eval(source: &str) -> Result<String, EvalError> {
        Self::value(source).map(|value| value.to_string())
    }

    /// Evaluate `source` to a `Value`.
    ///
    /// # Errors
    ///
    /// Returns `EvalError` on invalid syntax or unknown identifiers.
    pub fn value(source: &str) -> Result<Value, EvalError> {
        let mut tokens = Vec::new();
        for (token, span) in Token::lexer(source).spanned() {
            let text = source[span].to_string();
            let token = token.map_err(|()| EvalError::InvalidToken(text.clone()))?;
            tokens.push((token, text));
        }

        let mut parser = ExprParser { tokens, pos: 0 };
        let value = parser.ternary()?;
        match parser.tokens.get(parser.pos) {
            Some((_, text)) => Err(EvalError::UnexpectedToken(text.clone())),
            None => Ok(value),
        }
    }
}

struct ExprParser {
    tokens: Vec<(Token, String)>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    /// Consume the next token if `pick` maps it to an operator.
    fn operator<T>(&mut self, pick: impl Fn(&Token) -> Option<T>) -> Option<T> {
        let op = self.peek().and_then(pick)?;
        self.pos += 1;
        Some(op)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        match self.tokens.get(self.pos) {
            Some((token, _)) if token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some((_, text)) => Err(EvalError::UnexpectedToken(text.clone())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    // ternary := or ("?" ternary ":" ternary)?
    fn ternary(&mut self) -> Result<Value, EvalError> {
        let condition = self.or()?;
        if self.operator(|t| (*t == Token::Question).then_some(())).is_none() {
            return Ok(condition);
        }
        let then_value = self.ternary()?;
        self.expect(&Token::Colon)?;
        let else_value = self.ternary()?;
        Ok(if condition.truthy() {
            then_value
        } else {
            else_value
        })
    }

    fn or(&mut self) -> Result<Value, EvalError> {
        let mut left = self.and()?;
        while self.operator(|t| (*t == Token::Or).then_some(())).is_some() {
            let right = self.and()?;
            left = if left.truthy() { left } else { right };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, EvalError> {
        let mut left = self.equality()?;
        while self.operator(|t| (*t == Token::And).then_some(())).is_some() {
            let right = self.equality()?;
            left = if left.truthy() { right } else { left };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Value, EvalError> {
        let mut left = self.comparison()?;
        while let Some(op) = self.operator(|t| match t {
            Token::Eq | Token::Ne | Token::StrictEq | Token::StrictNe => Some(t.clone()),
            _ => None,
        }) {
            let right = self.comparison()?;
            let result = match op {
                Token::Eq => left.loose_eq(&right),
                Token::Ne => !left.loose_eq(&right),
                Token::StrictEq => left.strict_eq(&right),
                _ => !left.strict_eq(&right),
            };
            left = Value::Bool(result);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value, EvalError> {
        let mut left = self.additive()?;
        while let Some(op) = self.operator(|t| match t {
            Token::Lt | Token::Le | Token::Gt | Token::Ge => Some(t.clone()),
            _ => None,
        }) {
            let right = self.additive()?;
            let ordering = match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let result = ordering.is_some_and(|ordering| match op {
                Token::Lt => ordering.is_lt(),
                Token::Le => ordering.is_le(),
                Token::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            });
            left = Value::Bool(result);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Value, EvalError> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.operator(|t| match t {
            Token::Plus | Token::Minus => Some(t.clone()),
            _ => None,
        }) {
            let right = self.multiplicative()?;
            left = match (op, &left, &right) {
                (Token::Plus, Value::Str(_), _) | (Token::Plus, _, Value::Str(_)) => {
                    Value::Str(format!("{left}{right}"))
                }
                (Token::Plus, ..) => Value::Number(left.to_number() + right.to_number()),
                _ => Value::Number(left.to_number() - right.to_number()),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Value, EvalError> {
        let mut left = self.unary()?;
        while let Some(op) = self.operator(|t| match t {
            Token::Star | Token::Slash | Token::Percent => Some(t.clone()),
            _ => None,
        }) {
            let right = self.unary()?;
            let (a, b) = (left.to_number(), right.to_number());
            left = Value::Number(match op {
                Token::Star => a * b,
                Token::Slash => a / b,
                _ => a % b,
            });
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, EvalError> {
        match self.operator(|t| match t {
            Token::Minus | Token::Plus | Token::Not => Some(t.clone()),
            _ => None,
        }) {
            Some(Token::Minus) => Ok(Value::Number(-self.unary()?.to_number())),
            Some(Token::Plus) => Ok(Value::Number(self.unary()?.to_number())),
            Some(_) => Ok(Value::Bool(!self.unary()?.truthy())),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Value, EvalError> {
        let Some((token, text)) = self.tokens.get(self.pos).cloned() else {
            return Err(EvalError::UnexpectedEnd);
        };
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Value::Number(n)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Bool(b) => Ok(Value::Bool(b)),
            Token::Ident(name) => Err(EvalError::Undefined(name)),
            Token::LParen => {
                let value = self.ternary()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            _ => Err(EvalError::UnexpectedToken(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> String {
        Calculator::eval(source).expect("should evaluate")
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("21+21"), "42");
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("(1 + 2) * 3"), "9");
        assert_eq!(eval("7 % 4"), "3");
        assert_eq!(eval("1 / 2"), "0.5");
        assert_eq!(eval("-3 + 1"), "-2");
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("0 < 3"), "true");
        assert_eq!(eval("3 < 3"), "false");
        assert_eq!(eval("1 == '1'"), "true");
        assert_eq!(eval("1 === '1'"), "false");
        assert_eq!(eval("!true || 2 > 1"), "true");
        assert_eq!(eval("0 && 5"), "0");
    }

    #[test]
    fn strings_concatenate() {
        assert_eq!(eval("'a' + 1"), "a1");
        assert_eq!(eval(r#""x\"y" + 'z'"#), "x\"yz");
        assert_eq!(eval("'abc' < 'abd'"), "true");
    }

    #[test]
    fn ternary() {
        assert_eq!(eval("1 > 2 ? 'yes' : 'no'"), "no");
        assert_eq!(eval("true ? 1 : 0 ? 2 : 3"), "1");
    }

    #[test]
    fn division_by_zero_is_infinite() {
        assert_eq!(eval("1 / 0"), "Infinity");
        assert_eq!(eval("0 / 0"), "NaN");
    }

    #[test]
    fn errors() {
        assert_eq!(
            Calculator::eval("x + 1"),
            Err(EvalError::Undefined("x".to_string()))
        );
        assert_eq!(Calculator::eval("1 +"), Err(EvalError::UnexpectedEnd));
        assert_eq!(
            Calculator::eval("1 2"),
            Err(EvalError::UnexpectedToken("2".to_string()))
        );
        assert!(matches!(
            Calculator::eval("1 # 2"),
            Err(EvalError::InvalidToken(_))
        ));
    }
}
