//! Tree-walking expansion of an analyzed `Program` into text.

use std::fmt;
use std::path::Path;

use crate::ast::{Node, NodeKind, ParamList, Program};
use crate::config::{Config, Feature};
use crate::diagnostic::Diagnostics;
use crate::host::{Host, decode};
use crate::parser::Arity;
use crate::scope::{DeclaredFunction, FunctionBody, SIGIL, Scopes};
use crate::token::Span;

/// Names no user function or variable may take, with or without `!`.
pub const RESERVED: &[&str] = &[
    "#", "$", "f", "if", "loop", "url", "file", "use", "exec", "match", "case", "var",
    "toparent", "tochild", "del", "halt", "env",
];

/// Whether `name` collides with a built-in.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name.strip_suffix('!').unwrap_or(name))
}

/// Classifies a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    UndefinedFunction { name: String },
    /// A variable with the same name exists.
    DidYouMean { name: String },
    ArgumentCount {
        name: String,
        expected: Arity,
        found: usize,
    },
    ParameterCount { name: String, found: usize },
    ReservedName { name: String },
    SigilName { name: String },
    Halted(Option<String>),
    Evaluation { source: String, message: String },
    CaseOutsideMatch,
    FileNotFound { path: String },
    Host { target: String, message: String },
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedFunction { name } => write!(f, "function \\{name} is undefined"),
            Self::DidYouMean { name } => write!(
                f,
                "\\{name} was not found in current scope but a variable \\{SIGIL}{name} exists"
            ),
            Self::ArgumentCount {
                name,
                expected,
                found,
            } => write!(
                f,
                "expected {expected} arguments but got {found} in function \\{name}"
            ),
            Self::ParameterCount { name, found } => {
                write!(f, "expected 0 parameters but got {found} in function \\{name}")
            }
            Self::ReservedName { name } => {
                write!(f, "'{name}' is a built-in and cannot be redefined")
            }
            Self::SigilName { name } => {
                write!(f, "'{name}' may not start with '{SIGIL}'")
            }
            Self::Halted(None) => write!(f, "execution halted"),
            Self::Halted(Some(message)) => write!(f, "execution halted. {message}"),
            Self::Evaluation { source, message } => {
                write!(f, "cannot evaluate '{source}': {message}")
            }
            Self::CaseOutsideMatch => write!(f, "\\case used outside of \\match"),
            Self::FileNotFound { path } => write!(f, "file {path} not found"),
            Self::Host { target, message } => write!(f, "cannot read {target}: {message}"),
        }
    }
}

/// Error produced during interpretation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
}

impl RuntimeError {
    /// Attach the origin file if the error does not carry one yet.
    #[must_use]
    pub fn in_file(mut self, file: &str) -> Self {
        self.span.stamp(file);
        self
    }
}

type Result<T> = std::result::Result<T, RuntimeError>;

/// Expand `program` to text.
///
/// # Errors
///
/// Returns `RuntimeError` on undefined functions, argument count
/// mismatches, reserved names, evaluation failures or `\halt`.
pub fn interpret(
    program: &Program,
    config: &Config,
    host: &Host,
    diagnostics: &mut Diagnostics,
) -> Result<String> {
    let mut interpreter = Interpreter {
        config,
        host,
        diagnostics,
        scopes: Scopes::new(),
    };
    interpreter
        .visit_all(&program.body)
        .map_err(|e| e.in_file(config.file_name()))
}

struct Interpreter<'p, 'a> {
    config: &'a Config,
    host: &'a Host,
    diagnostics: &'a mut Diagnostics,
    scopes: Scopes<'p>,
}

fn error(kind: RuntimeErrorKind, span: &Span) -> RuntimeError {
    RuntimeError {
        kind,
        span: span.clone(),
    }
}

/// `false` after trimming is the only falsy text.
fn truthy(text: &str) -> bool {
    text.trim() != "false"
}

impl<'p> Interpreter<'p, '_> {
    fn visit_all(&mut self, nodes: &'p [Node]) -> Result<String> {
        let mut out = String::new();
        for node in nodes {
            out.push_str(&self.visit(node)?);
        }
        Ok(out)
    }

    fn visit(&mut self, node: &'p Node) -> Result<String> {
        match &node.kind {
            NodeKind::Program(body) => self.visit_all(body),
            NodeKind::RawText(text) => Ok(text.clone()),
            NodeKind::Comment(_) | NodeKind::Use { .. } => Ok(String::new()),
            NodeKind::FunctionCall { name, params, args } => {
                self.call(name, params.as_ref(), args, &node.span)
            }
            NodeKind::FunctionDefinition { name, params, body } => {
                self.define(name, params, body)
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if truthy(&self.visit(condition)?) {
                    self.visit(then_branch)
                } else if let Some(branch) = else_branch {
                    self.visit(branch)
                } else {
                    Ok(String::new())
                }
            }
            NodeKind::Loop {
                init,
                condition,
                increment,
                body,
            } => {
                self.visit(init)?;
                let mut out = String::new();
                while truthy(&self.visit(condition)?) {
                    out.push_str(&self.visit(body)?);
                    self.visit(increment)?;
                }
                Ok(out)
            }
            NodeKind::Match { subject, cases } => self.visit_match(subject, cases),
            NodeKind::Case { .. } => Err(error(RuntimeErrorKind::CaseOutsideMatch, &node.span)),
            NodeKind::UrlRead(target) => self.read_url(target, &node.span),
            NodeKind::FileRead(target) => self.read_file(target, &node.span),
            NodeKind::Exec(command) => self.exec(command, &node.span),
            NodeKind::InlineExpr(source) => self.evaluate(source, &node.span),
        }
    }

    fn visit_match(&mut self, subject: &'p Node, cases: &'p [Node]) -> Result<String> {
        let subject = self.visit(subject)?;
        for case in cases {
            let NodeKind::Case { value, body } = &case.kind else {
                continue;
            };
            if self.visit(value)? == subject {
                return self.visit(body);
            }
        }
        Ok(String::new())
    }

    fn define(&mut self, name: &'p Node, params: &'p ParamList, body: &'p Node) -> Result<String> {
        let text = self.visit(name)?.trim().to_string();
        Self::validate_name(&text, &name.span)?;
        if text.starts_with(SIGIL) {
            return Err(error(RuntimeErrorKind::SigilName { name: text }, &name.span));
        }
        let params = params.keys().into_iter().map(str::to_string).collect();
        let scope = self.scopes.current();
        self.scopes
            .define(scope, text, DeclaredFunction::node(params, body));
        Ok(String::new())
    }

    fn validate_name(name: &str, span: &Span) -> Result<()> {
        if is_reserved(name) {
            return Err(error(
                RuntimeErrorKind::ReservedName {
                    name: name.to_string(),
                },
                span,
            ));
        }
        Ok(())
    }

    fn call(
        &mut self,
        name: &str,
        params: Option<&'p ParamList>,
        args: &'p [Node],
        span: &Span,
    ) -> Result<String> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.visit(arg)?);
        }
        let mut named = Vec::new();
        if let Some(params) = params {
            for (key, value) in &params.entries {
                let value = match value {
                    Some(node) => self.visit(node)?,
                    None => String::new(),
                };
                named.push((key.clone(), value));
            }
        }

        let builtin = name.strip_suffix('!').unwrap_or(name);
        if matches!(builtin, "var" | "toparent" | "tochild" | "del" | "halt" | "env") {
            if !named.is_empty() {
                return Err(error(
                    RuntimeErrorKind::ParameterCount {
                        name: name.to_string(),
                        found: named.len(),
                    },
                    span,
                ));
            }
            return self.builtin(builtin, values, span);
        }

        let scope = self.scopes.current();
        let Some(function) = self.scopes.lookup(scope, name).cloned() else {
            let variable = format!("{SIGIL}{name}");
            let kind = if self.scopes.lookup(scope, &variable).is_some() {
                RuntimeErrorKind::DidYouMean {
                    name: name.to_string(),
                }
            } else {
                RuntimeErrorKind::UndefinedFunction {
                    name: name.to_string(),
                }
            };
            return Err(error(kind, span));
        };

        if values.len() != function.params.len() {
            return Err(error(
                RuntimeErrorKind::ArgumentCount {
                    name: name.to_string(),
                    expected: Arity::exactly(function.params.len()),
                    found: values.len(),
                },
                span,
            ));
        }

        let body = match function.body {
            FunctionBody::Text(text) => return Ok(text),
            FunctionBody::Node(body) => body,
        };

        let child = self.scopes.push();
        for (param, value) in function.params.iter().zip(values) {
            self.scopes
                .define(child, format!("{SIGIL}{param}"), DeclaredFunction::text(value));
        }
        for (key, value) in named {
            self.scopes
                .define(child, format!("{SIGIL}p_{key}"), DeclaredFunction::text(value));
        }
        let out = self.visit(body);
        self.scopes.pop();
        out
    }

    fn builtin(&mut self, name: &str, args: Vec<String>, span: &Span) -> Result<String> {
        let arity = match name {
            "var" => Arity::exactly(2),
            "halt" => Arity { min: 0, max: 1 },
            _ => Arity::exactly(1),
        };
        if !arity.accepts(args.len()) {
            return Err(error(
                RuntimeErrorKind::ArgumentCount {
                    name: name.to_string(),
                    expected: arity,
                    found: args.len(),
                },
                span,
            ));
        }

        let mut args = args.into_iter();
        let first = args.next().unwrap_or_default();
        let scope = self.scopes.current();

        match name {
            "var" => {
                let variable = first.trim();
                Self::validate_name(variable, span)?;
                if variable.starts_with(SIGIL) {
                    return Err(error(
                        RuntimeErrorKind::SigilName {
                            name: variable.to_string(),
                        },
                        span,
                    ));
                }
                let value = args.next().unwrap_or_default();
                self.scopes.define(
                    scope,
                    format!("{SIGIL}{variable}"),
                    DeclaredFunction::text(value),
                );
            }
            "toparent" => {
                let binding = first.trim();
                Self::validate_name(binding, span)?;
                let Some(function) = self.scopes.get_local(scope, binding).cloned() else {
                    self.warn_missing(binding, "current", span);
                    return Ok(String::new());
                };
                match self.scopes.parent(scope) {
                    Some(parent) => self.scopes.define(parent, binding, function),
                    None => self.diagnostics.warn(
                        format!("Cannot move {binding} to parent scope. No parent scope exists"),
                        span.clone(),
                    ),
                }
            }
            "tochild" => {
                let binding = first.trim();
                Self::validate_name(binding, span)?;
                let Some(parent) = self.scopes.parent(scope) else {
                    self.diagnostics.warn(
                        format!("Cannot move {binding} to child scope. No parent scope exists"),
                        span.clone(),
                    );
                    return Ok(String::new());
                };
                match self.scopes.get_local(parent, binding).cloned() {
                    Some(function) => self.scopes.define(scope, binding, function),
                    None => self.warn_missing(binding, "parent", span),
                }
            }
            "del" => {
                let binding = first.trim();
                Self::validate_name(binding, span)?;
                if !self.scopes.remove(scope, binding) {
                    self.warn_missing(binding, "current", span);
                }
            }
            "halt" => {
                let message = (!first.is_empty()).then_some(first);
                return Err(error(RuntimeErrorKind::Halted(message), span));
            }
            _ => return Ok(self.env(first.trim(), span)),
        }
        Ok(String::new())
    }

    fn warn_missing(&mut self, binding: &str, which: &str, span: &Span) {
        let scope = self.scopes.current();
        let variable = format!("{SIGIL}{binding}");
        let message = if which == "current" && self.scopes.get_local(scope, &variable).is_some() {
            format!(
                "{binding} was not found in current scope but a variable {variable} exists. \
                 Perhaps you meant this one"
            )
        } else {
            format!("{binding} was not found in {which} scope")
        };
        self.diagnostics.warn(message, span.clone());
    }

    /// Warn and return `false` when `feature` is closed.
    fn gate(&mut self, feature: Feature, span: &Span) -> bool {
        if self.config.enabled(feature) {
            return true;
        }
        self.diagnostics
            .warn(format!("{feature}. Skipping code"), span.clone());
        false
    }

    fn env(&mut self, name: &str, span: &Span) -> String {
        if !self.gate(Feature::Env, span) {
            return String::new();
        }
        std::env::var(name).unwrap_or_else(|_| {
            self.diagnostics
                .warn(format!("Environment variable {name} is not set"), span.clone());
            String::new()
        })
    }

    fn decode(&mut self, bytes: &[u8], span: &Span) -> String {
        decode(bytes, self.config.encoding()).unwrap_or_else(|| {
            self.diagnostics.warn(
                format!(
                    "Content is not valid {}, decoding as UTF-8",
                    self.config.encoding()
                ),
                span.clone(),
            );
            String::from_utf8_lossy(bytes).into_owned()
        })
    }

    fn read_url(&mut self, target: &'p Node, span: &Span) -> Result<String> {
        let url = self.visit(target)?.trim().to_string();
        if !self.gate(Feature::Net, span) {
            return Ok(String::new());
        }
        let bytes = self.host.fetcher.fetch(&url).map_err(|e| {
            error(
                RuntimeErrorKind::Host {
                    target: url.clone(),
                    message: e.to_string(),
                },
                span,
            )
        })?;
        Ok(self.decode(&bytes, span))
    }

    fn read_file(&mut self, target: &'p Node, span: &Span) -> Result<String> {
        let relative = self.visit(target)?.trim().to_string();
        if !self.gate(Feature::Files, span) {
            return Ok(String::new());
        }
        let path = Path::new(self.config.file_path()).join(&relative);
        if !self.host.fs.exists(&path) {
            return Err(error(
                RuntimeErrorKind::FileNotFound {
                    path: path.display().to_string(),
                },
                span,
            ));
        }
        let bytes = self.host.fs.read(&path).map_err(|e| {
            error(
                RuntimeErrorKind::Host {
                    target: path.display().to_string(),
                    message: e.to_string(),
                },
                span,
            )
        })?;
        Ok(self.decode(&bytes, span))
    }

    fn exec(&mut self, command: &'p Node, span: &Span) -> Result<String> {
        let command = self.visit(command)?;
        if !self.gate(Feature::Exec, span) {
            return Ok(String::new());
        }
        let stdout = self.host.shell.run(&command).map_err(|e| {
            error(
                RuntimeErrorKind::Host {
                    target: command.clone(),
                    message: e.to_string(),
                },
                span,
            )
        })?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn evaluate(&mut self, source: &str, span: &Span) -> Result<String> {
        if !self.gate(Feature::Eval, span) {
            return Ok(String::new());
        }
        let variables = self.scopes.variables(self.scopes.current());
        let expanded = substitute(source, |name| variables.get(name).map(String::as_str));
        tracing::trace!(source, expanded = expanded.as_str(), "evaluating");
        self.host.evaluator.evaluate(&expanded).map_err(|e| {
            error(
                RuntimeErrorKind::Evaluation {
                    source: expanded.clone(),
                    message: e.to_string(),
                },
                span,
            )
        })
    }
}

const fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

const fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Replace variable references in expression source. Outside string
/// literals both `name` and `$name` are replaced; inside them only `$name`.
fn substitute<'v>(source: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if let Some(q) = quote {
            if ch == '\\' && i + 1 < chars.len() {
                out.push(ch);
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if ch == q {
                quote = None;
            }
        } else if ch == '"' || ch == '\'' {
            quote = Some(ch);
        }

        let sigil = ch == SIGIL;
        let start = if sigil { i + 1 } else { i };
        let at_ident = chars.get(start).copied().is_some_and(is_ident_start)
            && (sigil || quote.is_none())
            && (i == 0 || !is_ident_char(chars[i - 1]));
        if !at_ident {
            out.push(ch);
            i += 1;
            continue;
        }

        let mut end = start;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        let name: String = chars[start..end].iter().collect();
        match lookup(&name) {
            Some(value) => out.push_str(value),
            None => out.extend(&chars[i..end]),
        }
        i = end;
    }

    out
}
