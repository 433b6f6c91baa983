//! CLI tool to expand template files to stdout.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use utpp::{Config, Diagnostics, Feature, Host, render};

fn usage() -> ExitCode {
    eprintln!("Usage: utpp [options] <files...>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --allow-net   Allow network imports and \\url reads");
    eprintln!("  --allow-exec  Allow \\exec");
    eprintln!("  --allow-env   Allow \\env");
    eprintln!("  --no-eval     Disable inline expressions");
    eprintln!();
    eprintln!("Set RUST_LOG=utpp=info to see import notices.");
    ExitCode::from(2)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("utpp=warn")),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let mut base = Config::default();
    let mut files = Vec::new();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return usage(),
            "--allow-net" => base = base.with_forced(Feature::Net.key(), "true"),
            "--allow-exec" => base = base.with_forced(Feature::Exec.key(), "true"),
            "--allow-env" => base = base.with_forced(Feature::Env.key(), "true"),
            "--no-eval" => base = base.with_forced(Feature::Eval.key(), "false"),
            flag if flag.starts_with("--") => {
                eprintln!("Unknown option: {flag}");
                return usage();
            }
            _ => files.push(arg),
        }
    }

    if files.is_empty() {
        eprintln!("Error: no files specified");
        return usage();
    }

    let host = Host::default();
    let mut had_error = false;

    for path in &files {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{path}: {e}");
                had_error = true;
                continue;
            }
        };

        let file = Path::new(path);
        let name = file
            .file_name()
            .map_or_else(|| path.clone(), |n| n.to_string_lossy().into_owned());
        let dir = file
            .parent()
            .map(|p| p.display().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        let config = base.clone().with("fileName", name).with("filePath", dir);

        let mut diagnostics = Diagnostics::new();
        match render(&content, config, &host, &mut diagnostics) {
            Ok(out) => print!("{out}"),
            Err(e) => {
                eprintln!("{path}: {e}");
                had_error = true;
            }
        }
    }

    if had_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
