//! Import resolution and origin stamping.
//!
//! `\use` nodes are resolved wherever they appear, removed from the tree,
//! and the imported statements are spliced in front of the root program's
//! own statements in source order.

use std::fmt;
use std::path::Path;

use crate::Error;
use crate::ast::{Node, NodeKind, ParamList, Program};
use crate::config::{Config, Feature};
use crate::diagnostic::Diagnostics;
use crate::host::{Host, decode, is_supported_encoding, normalize, sha256_hex};
use crate::pipeline;
use crate::token::Span;

/// Classifies an import error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportErrorKind {
    /// The target or hash was not plain text.
    InvalidTarget,
    /// An override value was not plain text.
    InvalidOverride { key: String },
    FileNotFound { path: String },
    Io { path: String, message: String },
    Fetch { target: String, message: String },
    HashMismatch {
        target: String,
        provided: String,
        actual: String,
    },
    Decode { target: String, encoding: String },
    /// The target is already being imported further up the chain.
    Cycle { chain: Vec<String> },
    /// The imported source failed to compile.
    IncludeFailed { target: String, cause: Box<Error> },
}

impl fmt::Display for ImportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget => write!(
                f,
                "invalid use statement syntax, functions inside use statements are not allowed"
            ),
            Self::InvalidOverride { key } => write!(
                f,
                "invalid meta config for import key '{key}', values must not contain functions"
            ),
            Self::FileNotFound { path } => write!(f, "file not found: {path}"),
            Self::Io { path, message } => write!(f, "failed to read {path}: {message}"),
            Self::Fetch { target, message } => {
                write!(f, "failed to import from '{target}' because {message}")
            }
            Self::HashMismatch {
                target,
                provided,
                actual,
            } => write!(
                f,
                "refused to import '{target}' because content hash does not match \
                 (provided: {provided}, actual: {actual})"
            ),
            Self::Decode { target, encoding } => {
                write!(f, "content of '{target}' is not valid {encoding}")
            }
            Self::Cycle { chain } => write!(f, "import cycle: {}", chain.join(" -> ")),
            Self::IncludeFailed { target, cause } => {
                write!(f, "failed to include '{target}': {cause}")
            }
        }
    }
}

/// Error produced while resolving imports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct ImportError {
    pub kind: ImportErrorKind,
    pub span: Span,
}

impl ImportError {
    /// The innermost import failure, looking through nested includes.
    #[must_use]
    pub fn root_kind(&self) -> &ImportErrorKind {
        match &self.kind {
            ImportErrorKind::IncludeFailed { cause, .. } => match cause.as_ref() {
                Error::Import(inner) => inner.root_kind(),
                _ => &self.kind,
            },
            kind => kind,
        }
    }
}

type Result<T> = std::result::Result<T, ImportError>;

/// Stamp origins and resolve every `\use` in `program`.
///
/// # Errors
///
/// Returns `ImportError` for malformed targets, missing files, fetch
/// failures, hash mismatches, cycles, or imported sources that fail to
/// compile.
pub fn analyze(
    program: Program,
    config: &Config,
    host: &Host,
    diagnostics: &mut Diagnostics,
) -> Result<Program> {
    let root = import_key(config.file_path(), config.file_name());
    analyze_chain(program, config, host, diagnostics, &[root])
}

pub(crate) fn analyze_chain(
    program: Program,
    config: &Config,
    host: &Host,
    diagnostics: &mut Diagnostics,
    chain: &[String],
) -> Result<Program> {
    let mut body = program.body;
    for node in &mut body {
        node.stamp_origin(config.file_name());
    }

    let mut analyzer = Analyzer {
        config,
        host,
        diagnostics,
        chain,
        imported: Vec::new(),
    };
    analyzer.resolve_body(&mut body)?;

    let mut spliced = analyzer.imported;
    spliced.append(&mut body);
    Ok(Program::new(spliced))
}

fn import_key(file_path: &str, target: &str) -> String {
    normalize(&Path::new(file_path).join(target))
        .display()
        .to_string()
}

/// Where an import's content comes from.
enum Source {
    Package,
    Net,
    Local,
}

impl Source {
    fn classify(target: &str) -> Self {
        if target.starts_with("pkg:") {
            Self::Package
        } else if target.contains("://") {
            Self::Net
        } else {
            Self::Local
        }
    }
}

struct Analyzer<'a> {
    config: &'a Config,
    host: &'a Host,
    diagnostics: &'a mut Diagnostics,
    chain: &'a [String],
    imported: Vec<Node>,
}

impl Analyzer<'_> {
    fn resolve_body(&mut self, body: &mut Vec<Node>) -> Result<()> {
        let nodes = std::mem::take(body);
        for mut node in nodes {
            if matches!(node.kind, NodeKind::Use { .. }) {
                self.resolve_use(node)?;
                continue;
            }
            self.resolve_children(&mut node)?;
            body.push(node);
        }
        Ok(())
    }

    fn resolve_children(&mut self, node: &mut Node) -> Result<()> {
        if let NodeKind::Program(body) = &mut node.kind {
            return self.resolve_body(body);
        }
        for child in node.children_mut() {
            self.resolve_children(child)?;
        }
        if let Some(params) = node.params_mut() {
            for value in params.entries.iter_mut().filter_map(|(_, v)| v.as_mut()) {
                self.resolve_children(value)?;
            }
        }
        Ok(())
    }

    fn resolve_use(&mut self, node: Node) -> Result<()> {
        let span = node.span;
        let NodeKind::Use {
            target,
            hash,
            params,
        } = node.kind
        else {
            return Ok(());
        };

        if !self.config.enabled(Feature::Imports) {
            self.diagnostics
                .warn(format!("{}. Skipping import", Feature::Imports), span);
            return Ok(());
        }

        let Some(target) = self.target_text(&target, &span)? else {
            return Ok(());
        };
        let hash = match hash {
            Some(hash) => hash
                .as_text()
                .ok_or_else(|| invalid_target(&span))?
                .trim()
                .to_string(),
            None => String::new(),
        };
        let overrides = self.overrides(params.as_ref(), &span)?;

        let (bytes, key, file_path) = match Source::classify(&target) {
            Source::Package => {
                self.diagnostics.warn(
                    format!("Package imports are not supported. Skipping '{target}'"),
                    span,
                );
                return Ok(());
            }
            Source::Net => {
                if !self.config.enabled(Feature::Net) {
                    self.diagnostics
                        .warn(format!("{}. Skipping import", Feature::Net), span);
                    return Ok(());
                }
                self.check_cycle(&target, &span)?;
                let bytes = self.host.fetcher.fetch(&target).map_err(|e| ImportError {
                    kind: ImportErrorKind::Fetch {
                        target: target.clone(),
                        message: e.to_string(),
                    },
                    span: span.clone(),
                })?;
                (bytes, target.clone(), self.config.file_path().to_string())
            }
            Source::Local => {
                if !self.config.enabled(Feature::Files) {
                    self.diagnostics
                        .warn(format!("{}. Skipping import", Feature::Files), span);
                    return Ok(());
                }
                let key = import_key(self.config.file_path(), &target);
                self.check_cycle(&key, &span)?;
                let bytes = self.read_local(&key, &span)?;
                let dir = Path::new(&key)
                    .parent()
                    .map(|p| p.display().to_string())
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| ".".to_string());
                (bytes, key, dir)
            }
        };

        if !hash.is_empty() {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(&hash) {
                return Err(ImportError {
                    kind: ImportErrorKind::HashMismatch {
                        target,
                        provided: hash,
                        actual,
                    },
                    span,
                });
            }
        }

        let child = self.config.derive_import(&target, &file_path, &overrides);
        let content = self.decode(&bytes, &target, child.encoding(), &span)?;

        let suffix = if overrides.is_empty() {
            ""
        } else {
            " with custom config"
        };
        self.diagnostics
            .info(format!("Importing '{target}'{suffix}"), span.clone());

        let mut chain = self.chain.to_vec();
        chain.push(key);
        let (program, _) =
            pipeline::compile_chain(&content, child, self.host, self.diagnostics, &chain).map_err(
                |cause| ImportError {
                    kind: ImportErrorKind::IncludeFailed {
                        target,
                        cause: Box::new(cause),
                    },
                    span,
                },
            )?;
        self.imported.extend(program.body);
        Ok(())
    }

    /// `use!` targets are evaluated without variables. `None` when the
    /// target needs evaluation and `eval` is closed.
    fn target_text(&mut self, target: &Node, span: &Span) -> Result<Option<String>> {
        let text = match &target.kind {
            NodeKind::InlineExpr(source) => {
                if !self.config.enabled(Feature::Eval) {
                    self.diagnostics
                        .warn(format!("{}. Skipping import", Feature::Eval), span.clone());
                    return Ok(None);
                }
                self.host
                    .evaluator
                    .evaluate(source)
                    .map_err(|_| invalid_target(span))?
            }
            _ => target.as_text().ok_or_else(|| invalid_target(span))?,
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid_target(span));
        }
        Ok(Some(text.to_string()))
    }

    /// Config overrides from `\use[key=value,...]`; flags read as `true`.
    fn overrides(
        &mut self,
        params: Option<&ParamList>,
        span: &Span,
    ) -> Result<Vec<(String, String)>> {
        let Some(params) = params else {
            return Ok(Vec::new());
        };
        let mut overrides = Vec::with_capacity(params.len());
        for (key, value) in &params.entries {
            if !Config::is_known(key) {
                self.diagnostics.info(
                    format!("Unknown meta config key '{key}' for import defined"),
                    span.clone(),
                );
            }
            let value = match value {
                Some(node) => node.as_text().ok_or_else(|| ImportError {
                    kind: ImportErrorKind::InvalidOverride { key: key.clone() },
                    span: span.clone(),
                })?,
                None => "true".to_string(),
            };
            overrides.push((key.clone(), value));
        }
        Ok(overrides)
    }

    fn check_cycle(&self, key: &str, span: &Span) -> Result<()> {
        if !self.chain.iter().any(|k| k == key) {
            return Ok(());
        }
        let mut chain = self.chain.to_vec();
        chain.push(key.to_string());
        Err(ImportError {
            kind: ImportErrorKind::Cycle { chain },
            span: span.clone(),
        })
    }

    fn read_local(&self, path: &str, span: &Span) -> Result<Vec<u8>> {
        let path = Path::new(path);
        if !self.host.fs.exists(path) {
            return Err(ImportError {
                kind: ImportErrorKind::FileNotFound {
                    path: path.display().to_string(),
                },
                span: span.clone(),
            });
        }
        self.host.fs.read(path).map_err(|e| ImportError {
            kind: ImportErrorKind::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            },
            span: span.clone(),
        })
    }

    fn decode(
        &mut self,
        bytes: &[u8],
        target: &str,
        encoding: &str,
        span: &Span,
    ) -> Result<String> {
        if !is_supported_encoding(encoding) {
            self.diagnostics.warn(
                format!("Unsupported file encoding '{encoding}', decoding as UTF-8"),
                span.clone(),
            );
            return Ok(String::from_utf8_lossy(bytes).into_owned());
        }
        decode(bytes, encoding).ok_or_else(|| ImportError {
            kind: ImportErrorKind::Decode {
                target: target.to_string(),
                encoding: encoding.to_string(),
            },
            span: span.clone(),
        })
    }
}

fn invalid_target(span: &Span) -> ImportError {
    ImportError {
        kind: ImportErrorKind::InvalidTarget,
        span: span.clone(),
    }
}
