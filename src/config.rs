//! Configuration values, lexical token settings, and meta-config blocks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostic::Diagnostics;
use crate::token::Span;

/// Every known key with its default value.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("fileName", "stdin"),
    ("filePath", "."),
    ("fileEncoding", "utf-8"),
    ("version", "1"),
    ("prefix", "\\"),
    ("argStart", "{"),
    ("argEnd", "}"),
    ("paramStart", "["),
    ("paramAssign", "="),
    ("paramSep", ","),
    ("paramEnd", "]"),
    ("evalStart", "`"),
    ("evalEnd", "`"),
    ("net", "false"),
    ("files", "true"),
    ("env", "false"),
    ("eval", "true"),
    ("imports", "true"),
    ("exec", "false"),
];

// \\\utpp[key=value,...]
static META_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\\\\\utpp\[([^\]]*)\]").expect("meta block regex is valid")
});

/// Feature gates controlling side-effecting constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Net,
    Files,
    Env,
    Eval,
    Imports,
    Exec,
}

impl Feature {
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Net => "net",
            Self::Files => "files",
            Self::Env => "env",
            Self::Eval => "eval",
            Self::Imports => "imports",
            Self::Exec => "exec",
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::Net => "Network access",
            Self::Files => "Reading files",
            Self::Env => "Environment access",
            Self::Eval => "Expression evaluation",
            Self::Imports => "Import resolution",
            Self::Exec => "Command execution",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is disabled", self.describe())
    }
}

/// Lexical symbols used by the lexer and parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub prefix: String,
    pub arg_start: String,
    pub arg_end: String,
    pub param_start: String,
    pub param_assign: String,
    pub param_sep: String,
    pub param_end: String,
    pub eval_start: String,
    pub eval_end: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Config::default().token_config()
    }
}

/// Immutable configuration snapshot.
///
/// `forced` holds overrides that win over any meta-config block and are
/// inherited by every nested import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    values: BTreeMap<String, String>,
    forced: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: DEFAULTS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            forced: BTreeMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is one of the keys with a default.
    #[must_use]
    pub fn is_known(key: &str) -> bool {
        DEFAULTS.iter().any(|(k, _)| *k == key)
    }

    /// Current value of `key`; unknown keys that were never set read as `""`.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map_or("", String::as_str)
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_feature(self, feature: Feature, enabled: bool) -> Self {
        self.with(feature.key(), if enabled { "true" } else { "false" })
    }

    /// Set `key` and keep it pinned across meta-config blocks and imports.
    #[must_use]
    pub fn with_forced(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        self.forced.insert(key.to_string(), value.clone());
        self.values.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn enabled(&self, feature: Feature) -> bool {
        self.get(feature.key()) == "true"
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        self.get("fileName")
    }

    #[must_use]
    pub fn file_path(&self) -> &str {
        self.get("filePath")
    }

    #[must_use]
    pub fn encoding(&self) -> &str {
        self.get("fileEncoding")
    }

    #[must_use]
    pub fn forced(&self) -> &BTreeMap<String, String> {
        &self.forced
    }

    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            prefix: self.get("prefix").to_string(),
            arg_start: self.get("argStart").to_string(),
            arg_end: self.get("argEnd").to_string(),
            param_start: self.get("paramStart").to_string(),
            param_assign: self.get("paramAssign").to_string(),
            param_sep: self.get("paramSep").to_string(),
            param_end: self.get("paramEnd").to_string(),
            eval_start: self.get("evalStart").to_string(),
            eval_end: self.get("evalEnd").to_string(),
        }
    }

    /// Configuration for an imported file: defaults, then the inherited
    /// and node-level overrides (both forced), then the file's identity.
    #[must_use]
    pub fn derive_import(
        &self,
        target: &str,
        file_path: &str,
        overrides: &[(String, String)],
    ) -> Self {
        let mut derived = Self::default();
        let inherited = self.forced.iter();
        for (key, value) in inherited.chain(overrides.iter().map(|(k, v)| (k, v))) {
            derived = derived.with_forced(key, value.clone());
        }
        derived.with_forced("fileName", target).with_forced("filePath", file_path)
    }

    fn reapply_forced(mut self) -> Self {
        for (key, value) in &self.forced {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }
}

/// Classifies a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A meta-config entry had no `=value` part.
    MissingValue { key: String },
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue { key } => {
                write!(f, "invalid meta config pair '{key}', value cannot be empty")
            }
        }
    }
}

/// Error produced while reading meta-config blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub span: Span,
}

/// Apply and strip every meta-config block in `source`.
///
/// Returns the remaining source and the resulting configuration.
///
/// # Errors
///
/// Returns `ConfigError` when an entry has no value.
pub fn preprocess(
    source: &str,
    config: Config,
    diagnostics: &mut Diagnostics,
) -> Result<(String, Config), ConfigError> {
    let mut config = config;
    let mut blocks = 0;

    for captures in META_BLOCK.captures_iter(source) {
        let span = position_of(source, captures.get(0).map_or(0, |m| m.start()))
            .in_file(config.file_name());
        let body = captures.get(1).map_or("", |m| m.as_str());

        for entry in body.split(',').map(str::trim_start) {
            if entry.is_empty() {
                continue;
            }
            let Some((key, value)) = entry.split_once('=') else {
                return Err(ConfigError {
                    kind: ConfigErrorKind::MissingValue {
                        key: entry.to_string(),
                    },
                    span,
                });
            };
            if key.is_empty() {
                continue;
            }
            if !Config::is_known(key) {
                diagnostics.info(format!("Unknown meta config key '{key}' defined"), span.clone());
            }
            config = config.with(key, value);
        }
        blocks += 1;
    }

    if blocks > 1 {
        diagnostics.info(
            "Multiple meta config blocks found",
            Span::default().in_file(config.file_name()),
        );
    }

    let stripped = META_BLOCK.replace_all(source, "").into_owned();
    Ok((stripped, config.reapply_forced()))
}

fn position_of(source: &str, offset: usize) -> Span {
    let before = &source[..offset];
    let row = before.matches('\n').count();
    let col = before
        .rfind('\n')
        .map_or(before, |i| &before[i + 1..])
        .chars()
        .count();
    Span::new(row, col)
}
