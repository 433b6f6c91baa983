#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use utpp::{
    Config, Diagnostics, Error, Fetcher, Host, HostError, MemoryFs, Shell, TokenConfig, Token,
    render, tokenize,
};

/// Fetcher serving canned responses and recording every requested URL.
#[derive(Debug, Clone, Default)]
pub struct CannedFetcher {
    responses: BTreeMap<String, Vec<u8>>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl CannedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.to_string(), body.into());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

impl Fetcher for CannedFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, HostError> {
        self.requests.lock().expect("lock").push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::Status {
                command: format!("fetch {url}"),
                status: 404,
                stderr: "not found".to_string(),
            })
    }
}

/// Shell that echoes the command back instead of running it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoShell;

impl Shell for EchoShell {
    fn run(&self, command: &str) -> Result<Vec<u8>, HostError> {
        Ok(format!("ran: {command}").into_bytes())
    }
}

/// Host with an in-memory file system and no real side effects.
pub fn host_with(files: &[(&str, &str)]) -> Host {
    let fs = files
        .iter()
        .fold(MemoryFs::new(), |fs, (path, content)| fs.with_file(*path, *content));
    Host::default()
        .with_fs(fs)
        .with_fetcher(CannedFetcher::new())
        .with_shell(EchoShell)
}

pub fn lex(input: &str) -> Vec<Token> {
    tokenize(input, &TokenConfig::default()).expect("tokenize failed")
}

/// Render with default config against an in-memory host.
pub fn render_with(source: &str, files: &[(&str, &str)]) -> Result<(String, Diagnostics), Error> {
    render_config(source, Config::default(), &host_with(files))
}

pub fn render_config(
    source: &str,
    config: Config,
    host: &Host,
) -> Result<(String, Diagnostics), Error> {
    let mut diagnostics = Diagnostics::new();
    let out = render(source, config, host, &mut diagnostics)?;
    Ok((out, diagnostics))
}

/// Render and assert success, returning only the output.
pub fn expand(source: &str) -> String {
    render_with(source, &[])
        .unwrap_or_else(|e| panic!("render failed: {e}\n--- source ---\n{source}"))
        .0
}
