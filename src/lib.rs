//! A macro-templating language: lexer, parser, import analyzer and
//! interpreter.
//!
//! Source text mixes literal output with prefixed commands
//! (`\name[params]{arg}{arg}`), inline expressions and built-in control
//! constructs. The pipeline expands it into plain text.
//!
//! # Quick start
//!
//! ```
//! let out = utpp::render_str(r"\f[x]{double}{\${x + x}}\double{21}").unwrap();
//! assert_eq!(out, "42");
//! ```
//!
//! ## Custom collaborators
//!
//! ```
//! use utpp::{Config, Diagnostics, Host, MemoryFs, render};
//!
//! let fs = MemoryFs::new().with_file("greet.utpp", r"\f[n]{hi}{Hi \$n}");
//! let host = Host::default().with_fs(fs);
//! let mut diagnostics = Diagnostics::new();
//! let source = r"\use{greet.utpp}\hi{Ada}";
//! let out = render(source, Config::default(), &host, &mut diagnostics).unwrap();
//! assert_eq!(out, "Hi Ada");
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod analyzer;
pub mod ast;
pub mod config;
pub mod diagnostic;
pub mod expr;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod scope;
pub mod token;

pub use analyzer::{ImportError, ImportErrorKind, analyze};
pub use ast::{Node, NodeKind, ParamList, Program};
pub use config::{Config, ConfigError, ConfigErrorKind, Feature, TokenConfig, preprocess};
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use expr::{Calculator, EvalError};
pub use host::{
    CurlFetcher, Evaluator, Fetcher, FileSystem, Host, HostError, MemoryFs, OsFileSystem, Shell,
    SystemShell, sha256_hex,
};
pub use interpreter::{RuntimeError, RuntimeErrorKind, interpret};
pub use lexer::{LexError, LexErrorKind, tokenize};
pub use parser::{ParseError, ParseErrorKind, parse};
pub use pipeline::{compile, render, render_str};
pub use token::{Span, Token, TokenKind};

/// Unified error type covering every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A malformed meta-config block.
    #[error("{0}")]
    Config(#[from] ConfigError),
    /// A lexer error.
    #[error("{0}")]
    Lex(#[from] LexError),
    /// A parser error.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// An import could not be resolved.
    #[error("{0}")]
    Import(#[from] ImportError),
    /// Interpretation failed or was halted.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Source position the error points at.
    #[must_use]
    pub const fn span(&self) -> &Span {
        match self {
            Self::Config(e) => &e.span,
            Self::Lex(e) => &e.span,
            Self::Parse(e) => &e.span,
            Self::Import(e) => &e.span,
            Self::Runtime(e) => &e.span,
        }
    }
}
