use std::fmt;

use crate::ast::{Node, NodeKind, ParamList, Program};
use crate::config::TokenConfig;
use crate::token::{Span, Token, TokenKind};

/// Built-in constructs resolved at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Construct {
    Comment,
    Inline,
    Define,
    If,
    Loop,
    Url,
    File,
    Use,
    Exec,
    Match,
    Case,
}

impl Construct {
    /// Look up a command name, ignoring a trailing `!`. Comments and
    /// inline expressions only match their bare names.
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "#" => return Some(Self::Comment),
            "$" => return Some(Self::Inline),
            "f" => return Some(Self::Define),
            _ => {}
        }
        match name.strip_suffix('!').unwrap_or(name) {
            "if" => Some(Self::If),
            "loop" => Some(Self::Loop),
            "url" => Some(Self::Url),
            "file" => Some(Self::File),
            "use" => Some(Self::Use),
            "exec" => Some(Self::Exec),
            "match" => Some(Self::Match),
            "case" => Some(Self::Case),
            _ => None,
        }
    }

    /// Leading arguments parsed as inline expressions under `name!`.
    const fn forced_arguments(self) -> usize {
        match self {
            Self::Loop => 3,
            Self::If
            | Self::Url
            | Self::File
            | Self::Use
            | Self::Exec
            | Self::Match
            | Self::Case => 1,
            Self::Comment | Self::Inline | Self::Define => 0,
        }
    }

    const fn arity(self) -> Arity {
        match self {
            Self::Define | Self::Match | Self::Case => Arity::exactly(2),
            Self::If => Arity { min: 2, max: 3 },
            Self::Loop => Arity::exactly(4),
            Self::Url | Self::File | Self::Exec => Arity::exactly(1),
            Self::Use => Arity { min: 1, max: 2 },
            Self::Comment | Self::Inline => Arity::exactly(0),
        }
    }

    /// Whether parameters are rejected.
    const fn takes_no_params(self) -> bool {
        !matches!(self, Self::Define | Self::Use)
    }
}

/// Accepted argument count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    pub(crate) const fn exactly(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub(crate) const fn accepts(self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} to {}", self.min, self.max)
        }
    }
}

/// Classifies a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token appeared where no statement can start.
    UnexpectedToken { found: TokenKind },
    /// A specific token kind was required.
    Expected {
        expected: TokenKind,
        found: Option<TokenKind>,
    },
    /// Wrong number of arguments for a built-in.
    ArgumentCount {
        command: String,
        expected: Arity,
        found: usize,
    },
    /// Parameters given to a built-in that takes none.
    ParameterCount { command: String, found: usize },
    /// Something other than a case inside `\match`.
    InvalidMatchArm { command: String },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken { found } => write!(f, "unexpected {found}"),
            Self::Expected {
                expected,
                found: None,
            } => write!(f, "expected {expected}, got end of input"),
            Self::Expected {
                expected,
                found: Some(found),
            } => write!(f, "expected {expected}, got {found}"),
            Self::ArgumentCount {
                command,
                expected,
                found,
            } => write!(
                f,
                "expected {expected} arguments but got {found} in function \\{command}"
            ),
            Self::ParameterCount { command, found } => {
                write!(f, "expected 0 parameters but got {found} in function \\{command}")
            }
            Self::InvalidMatchArm { command } => {
                write!(f, "only \\case may appear inside \\{command}")
            }
        }
    }
}

/// Error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl ParseError {
    /// Attach the origin file if the error does not carry one yet.
    #[must_use]
    pub fn in_file(mut self, file: &str) -> Self {
        self.span.stamp(file);
        self
    }
}

/// Parse a token stream into a `Program`.
///
/// # Errors
///
/// Returns `ParseError` on stray delimiters, missing delimiters, or
/// built-ins called with the wrong number of arguments or parameters.
pub fn parse(tokens: &[Token], config: &TokenConfig) -> Result<Program, ParseError> {
    Parser::new(tokens.to_vec(), config).parse()
}

struct Parser<'c> {
    tokens: Vec<Token>,
    pos: usize,
    config: &'c TokenConfig,
}

impl<'c> Parser<'c> {
    const fn new(tokens: Vec<Token>, config: &'c TokenConfig) -> Self {
        Self {
            tokens,
            pos: 0,
            config,
        }
    }

    fn parse(mut self) -> Result<Program, ParseError> {
        let body = self.parse_statements(false)?;
        Ok(Program::new(body))
    }

    /// Parse statements until input ends. Nested calls stop at the first
    /// token that cannot start a statement and leave it to the caller.
    fn parse_statements(&mut self, nested: bool) -> Result<Vec<Node>, ParseError> {
        let mut body = Vec::new();

        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Raw => {
                    let token = self.bump();
                    body.push(self.raw_node(token));
                }
                TokenKind::Expression => {
                    let token = self.bump();
                    let source = self.strip_expression(&token.text);
                    body.push(Node::new(NodeKind::InlineExpr(source), token.span));
                }
                TokenKind::Prefix => body.push(self.parse_command()?),
                _ if nested => break,
                found => {
                    return Err(ParseError {
                        kind: ParseErrorKind::UnexpectedToken { found },
                        span: token.span.clone(),
                    });
                }
            }
        }

        Ok(body)
    }

    fn parse_command(&mut self) -> Result<Node, ParseError> {
        let prefix = self.expect(TokenKind::Prefix)?;
        let command = self.expect(TokenKind::CommandName)?;
        let name = command.text;
        let span = prefix.span;

        let construct = Construct::lookup(&name);
        match construct {
            Some(Construct::Comment) => return self.parse_comment(span),
            Some(Construct::Inline) => {
                let open = self.expect(TokenKind::ArgStart)?;
                let source = self.verbatim_group(&open.span)?;
                return Ok(Node::new(NodeKind::InlineExpr(source), span));
            }
            _ => {}
        }

        let forced = match construct {
            Some(construct) if name.ends_with('!') => construct.forced_arguments(),
            _ => 0,
        };

        let params = if self.at(TokenKind::ParamStart) {
            Some(self.parse_params()?)
        } else {
            None
        };
        let mut args = self.parse_arguments(forced)?.into_iter();

        let Some(construct) = construct else {
            return Ok(Node::new(
                NodeKind::FunctionCall {
                    name,
                    params,
                    args: args.collect(),
                },
                span,
            ));
        };

        let arity = construct.arity();
        if !arity.accepts(args.len()) {
            return Err(ParseError {
                kind: ParseErrorKind::ArgumentCount {
                    command: name,
                    expected: arity,
                    found: args.len(),
                },
                span,
            });
        }
        let param_count = params.as_ref().map_or(0, ParamList::len);
        if construct.takes_no_params() && param_count > 0 {
            return Err(ParseError {
                kind: ParseErrorKind::ParameterCount {
                    command: name,
                    found: param_count,
                },
                span,
            });
        }

        let kind = match construct {
            Construct::Define => NodeKind::FunctionDefinition {
                name: take(&mut args, &span),
                params: params.unwrap_or_default(),
                body: take(&mut args, &span),
            },
            Construct::If => NodeKind::If {
                condition: take(&mut args, &span),
                then_branch: take(&mut args, &span),
                else_branch: args.next().map(Box::new),
            },
            Construct::Loop => NodeKind::Loop {
                init: take(&mut args, &span),
                condition: take(&mut args, &span),
                increment: take(&mut args, &span),
                body: take(&mut args, &span),
            },
            Construct::Url => NodeKind::UrlRead(take(&mut args, &span)),
            Construct::File => NodeKind::FileRead(take(&mut args, &span)),
            Construct::Exec => NodeKind::Exec(take(&mut args, &span)),
            Construct::Use => NodeKind::Use {
                target: take(&mut args, &span),
                hash: args.next().map(Box::new),
                params,
            },
            Construct::Match => {
                let subject = take(&mut args, &span);
                let cases = Self::match_arms(&name, *take(&mut args, &span))?;
                NodeKind::Match { subject, cases }
            }
            Construct::Case => NodeKind::Case {
                value: take(&mut args, &span),
                body: take(&mut args, &span),
            },
            Construct::Comment | Construct::Inline => NodeKind::Program(Vec::new()),
        };

        Ok(Node::new(kind, span))
    }

    /// Keep the cases of a match body, dropping whitespace and comments.
    fn match_arms(command: &str, body: Node) -> Result<Vec<Node>, ParseError> {
        let NodeKind::Program(statements) = body.kind else {
            return Err(ParseError {
                kind: ParseErrorKind::InvalidMatchArm {
                    command: command.to_string(),
                },
                span: body.span,
            });
        };

        let mut cases = Vec::new();
        for statement in statements {
            match &statement.kind {
                NodeKind::Case { .. } => cases.push(statement),
                NodeKind::Comment(_) => {}
                NodeKind::RawText(text) if text.trim().is_empty() => {}
                _ => {
                    return Err(ParseError {
                        kind: ParseErrorKind::InvalidMatchArm {
                            command: command.to_string(),
                        },
                        span: statement.span,
                    });
                }
            }
        }
        Ok(cases)
    }

    /// `\#{...}` drops a balanced group; `\# ...` drops the rest of the
    /// current line, commands included. A line comment inside a group ends
    /// at the group's closing delimiter.
    fn parse_comment(&mut self, span: Span) -> Result<Node, ParseError> {
        if self.at(TokenKind::ArgStart) {
            let open = self.bump();
            let text = self.verbatim_group(&open.span)?;
            return Ok(Node::new(NodeKind::Comment(text), span));
        }

        let mut text = String::new();
        let mut depth = 0usize;
        while let Some(token) = self.tokens.get_mut(self.pos) {
            match token.kind {
                TokenKind::ArgEnd | TokenKind::ParamEnd | TokenKind::ParamSep if depth == 0 => {
                    break;
                }
                TokenKind::ArgStart | TokenKind::ParamStart => depth += 1,
                TokenKind::ArgEnd | TokenKind::ParamEnd => depth -= 1,
                TokenKind::Raw if depth == 0 => {
                    if let Some(newline) = token.text.find('\n') {
                        let rest = token.text.split_off(newline);
                        token.span.col += token.text.chars().count();
                        text.push_str(&std::mem::replace(&mut token.text, rest));
                        break;
                    }
                }
                _ => {}
            }
            text.push_str(&self.bump().text);
        }
        Ok(Node::new(NodeKind::Comment(text), span))
    }

    fn parse_params(&mut self) -> Result<ParamList, ParseError> {
        let open = self.expect(TokenKind::ParamStart)?;
        let mut params = ParamList {
            entries: Vec::new(),
            span: open.span,
        };

        while !self.at(TokenKind::ParamEnd) {
            let key = self.expect(TokenKind::ParamKey)?;
            let value = if self.at(TokenKind::ParamAssign) {
                let assign = self.bump();
                let body = self.parse_statements(true)?;
                Some(Node::new(NodeKind::Program(body), assign.span))
            } else {
                None
            };
            params.insert(key.text, value);

            if !self.at(TokenKind::ParamSep) {
                break;
            }
            self.bump();
        }

        self.expect(TokenKind::ParamEnd)?;
        Ok(params)
    }

    /// Parse consecutive `{...}` groups. The first `forced` groups are kept
    /// verbatim as inline expressions.
    fn parse_arguments(&mut self, forced: usize) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();

        while self.at(TokenKind::ArgStart) {
            let open = self.bump();
            if args.len() < forced {
                let source = self.verbatim_group(&open.span)?;
                args.push(Node::new(NodeKind::InlineExpr(source), open.span));
            } else {
                let body = self.parse_statements(true)?;
                self.expect(TokenKind::ArgEnd)?;
                args.push(Node::new(NodeKind::Program(body), open.span));
            }
        }

        Ok(args)
    }

    /// Concatenate token text up to the `ArgEnd` matching an already
    /// consumed `ArgStart`.
    fn verbatim_group(&mut self, open: &Span) -> Result<String, ParseError> {
        let mut depth = 1usize;
        let mut text = String::new();

        loop {
            let Some(token) = self.peek() else {
                return Err(ParseError {
                    kind: ParseErrorKind::Expected {
                        expected: TokenKind::ArgEnd,
                        found: None,
                    },
                    span: open.clone(),
                });
            };
            match token.kind {
                TokenKind::ArgStart => depth += 1,
                TokenKind::ArgEnd => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump();
                        return Ok(text);
                    }
                }
                _ => {}
            }
            text.push_str(&self.bump().text);
        }
    }

    fn raw_node(&self, token: Token) -> Node {
        let prefix = &self.config.prefix;
        let text = if prefix.is_empty() {
            token.text
        } else {
            token.text.replace(&prefix.repeat(2), prefix)
        };
        Node::new(NodeKind::RawText(text), token.span)
    }

    fn strip_expression(&self, text: &str) -> String {
        let inner = text.strip_prefix(self.config.eval_start.as_str()).unwrap_or(text);
        inner
            .strip_suffix(self.config.eval_end.as_str())
            .unwrap_or(inner)
            .to_string()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        match self.peek() {
            Some(token) if token.kind == kind => Ok(self.bump()),
            Some(token) => Err(ParseError {
                kind: ParseErrorKind::Expected {
                    expected: kind,
                    found: Some(token.kind),
                },
                span: token.span.clone(),
            }),
            None => Err(ParseError {
                kind: ParseErrorKind::Expected {
                    expected: kind,
                    found: None,
                },
                span: self.eof_span(),
            }),
        }
    }

    fn eof_span(&self) -> Span {
        self.tokens
            .last()
            .map_or_else(Span::default, |last| last.span.clone())
    }
}

/// Next argument; the arity check guarantees it exists.
fn take(args: &mut std::vec::IntoIter<Node>, span: &Span) -> Box<Node> {
    Box::new(
        args.next()
            .unwrap_or_else(|| Node::new(NodeKind::Program(Vec::new()), span.clone())),
    )
}
