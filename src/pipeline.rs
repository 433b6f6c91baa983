//! The full expansion pipeline: meta-config, lexing, parsing, import
//! analysis and interpretation.

use crate::Error;
use crate::analyzer::{self, analyze};
use crate::ast::Program;
use crate::config::{Config, preprocess};
use crate::diagnostic::Diagnostics;
use crate::host::Host;
use crate::interpreter::interpret;
use crate::lexer::tokenize;
use crate::parser::parse;

/// Run `source` through meta-config extraction, lexing, parsing and import
/// analysis. Returns the program with the configuration it was compiled
/// under.
///
/// # Errors
///
/// Returns the first error of any stage.
pub fn compile(
    source: &str,
    config: Config,
    host: &Host,
    diagnostics: &mut Diagnostics,
) -> Result<(Program, Config), Error> {
    let (program, config) = front(source, config, diagnostics)?;
    let program = analyze(program, &config, host, diagnostics)?;
    Ok((program, config))
}

/// `compile` for an imported source, with the chain of imports leading
/// to it.
pub(crate) fn compile_chain(
    source: &str,
    config: Config,
    host: &Host,
    diagnostics: &mut Diagnostics,
    chain: &[String],
) -> Result<(Program, Config), Error> {
    let (program, config) = front(source, config, diagnostics)?;
    let program = analyzer::analyze_chain(program, &config, host, diagnostics, chain)?;
    Ok((program, config))
}

fn front(
    source: &str,
    config: Config,
    diagnostics: &mut Diagnostics,
) -> Result<(Program, Config), Error> {
    let (source, config) = preprocess(source, config, diagnostics)?;
    let tokens = config.token_config();
    let file = config.file_name();
    tracing::debug!(file, "compiling");

    let stream = tokenize(&source, &tokens).map_err(|e| e.in_file(file))?;
    let program = parse(&stream, &tokens).map_err(|e| e.in_file(file))?;
    Ok((program, config))
}

/// Compile and interpret `source`.
///
/// # Errors
///
/// Returns the first error of any stage.
pub fn render(
    source: &str,
    config: Config,
    host: &Host,
    diagnostics: &mut Diagnostics,
) -> Result<String, Error> {
    let (program, config) = compile(source, config, host, diagnostics)?;
    Ok(interpret(&program, &config, host, diagnostics)?)
}

/// Render with default configuration and system collaborators.
///
/// # Errors
///
/// Returns the first error of any stage.
pub fn render_str(source: &str) -> Result<String, Error> {
    render(
        source,
        Config::default(),
        &Host::default(),
        &mut Diagnostics::new(),
    )
}
