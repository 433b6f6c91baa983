//! Host collaborators: file access, network fetch, shell execution and
//! expression evaluation.
//!
//! Every side effect the language can trigger goes through one of the
//! traits here, so embedders and tests can substitute their own.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};

use crate::expr::{Calculator, EvalError};

/// Failure reported by a `Fetcher` or `Shell`.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exited with status {status}: {stderr}")]
    Status {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Read-only file access.
pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;

    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Blocking URL fetch.
pub trait Fetcher {
    /// # Errors
    ///
    /// Returns `HostError` when the resource cannot be retrieved.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, HostError>;
}

/// Shell command execution.
pub trait Shell {
    /// Run `command` and return its standard output.
    ///
    /// # Errors
    ///
    /// Returns `HostError` when the command cannot be started or fails.
    fn run(&self, command: &str) -> Result<Vec<u8>, HostError>;
}

/// Inline expression evaluator.
pub trait Evaluator {
    /// # Errors
    ///
    /// Returns `EvalError` when `source` is not a valid expression.
    fn evaluate(&self, source: &str) -> Result<String, EvalError>;
}

/// The operating system's file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// In-memory file system keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.insert(normalize(&path.into()), content.into());
    }
}

impl FileSystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(&normalize(path)).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

/// Drop `.` components and fold `..` lexically.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Fetches URLs by running `curl`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurlFetcher;

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, HostError> {
        tracing::debug!(url, "fetching");
        let output = Command::new("curl")
            .args(["-fsSL", url])
            .output()
            .map_err(|source| HostError::Spawn {
                program: "curl".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(HostError::Status {
                command: format!("curl {url}"),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&self, command: &str) -> Result<Vec<u8>, HostError> {
        tracing::debug!(command, "executing");
        let output = Command::new("sh")
            .args(["-c", command])
            .output()
            .map_err(|source| HostError::Spawn {
                program: "sh".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(HostError::Status {
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl Evaluator for Calculator {
    fn evaluate(&self, source: &str) -> Result<String, EvalError> {
        Self::eval(source)
    }
}

/// Bundle of collaborators used by the analyzer and interpreter.
pub struct Host {
    pub fs: Box<dyn FileSystem>,
    pub fetcher: Box<dyn Fetcher>,
    pub shell: Box<dyn Shell>,
    pub evaluator: Box<dyn Evaluator>,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            fs: Box::new(OsFileSystem),
            fetcher: Box::new(CurlFetcher),
            shell: Box::new(SystemShell),
            evaluator: Box::new(Calculator),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

impl Host {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fs(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    #[must_use]
    pub fn with_shell(mut self, shell: impl Shell + 'static) -> Self {
        self.shell = Box::new(shell);
        self
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }
}

/// Lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}

/// Whether `decode` understands `encoding`.
#[must_use]
pub fn is_supported_encoding(encoding: &str) -> bool {
    matches!(
        encoding.to_ascii_lowercase().as_str(),
        "utf-8" | "utf8" | "latin1" | "latin-1" | "iso-8859-1" | "binary" | "ascii"
    )
}

/// Decode `bytes` using a configured encoding name.
///
/// Returns `None` for unsupported encodings or invalid input.
#[must_use]
pub fn decode(bytes: &[u8], encoding: &str) -> Option<String> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes.to_vec()).ok(),
        "latin1" | "latin-1" | "iso-8859-1" | "binary" => {
            Some(bytes.iter().map(|&b| char::from(b)).collect())
        }
        "ascii" => bytes
            .is_ascii()
            .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
        _ => None,
    }
}
