//! End-to-end rendering of complete templates.

mod common;

use common::{EchoShell, host_with, render_config, render_with};
use utpp::{
    Config, Diagnostics, Error, Feature, Host, MemoryFs, RuntimeErrorKind, Severity, render,
    render_str, sha256_hex,
};

// -----------------------------------------------------------
// Whole pages.
// -----------------------------------------------------------

const HTML_LIB: &str =
    r"\f[title]{heading}{<h1>`'$title'`</h1>}\f[n]{plural}{\if!{n == 1}{item}{items}}";

const INDEX: &str = r"\use{lib/html.utpp}\heading{Inventory}
\var{count}{3}\# three for now
We have \$count \plural{\$count} in stock.
";

fn site() -> Host {
    host_with(&[("site/lib/html.utpp", HTML_LIB)])
}

fn site_config() -> Config {
    Config::default()
        .with("fileName", "index.utpp")
        .with("filePath", "site")
}

#[test]
fn page_with_library_import() {
    let (out, diagnostics) = render_config(INDEX, site_config(), &site()).expect("render");
    assert_eq!(out, "<h1>Inventory</h1>\n\nWe have 3 items in stock.\n");
    assert!(
        diagnostics
            .entries()
            .iter()
            .any(|d| d.severity == Severity::Info && d.message.contains("lib/html.utpp"))
    );
    assert_eq!(diagnostics.warnings().count(), 0);
}

#[test]
fn pinned_library_import() {
    let hash = sha256_hex(HTML_LIB.as_bytes());
    let source = format!(r"\use{{lib/html.utpp}}{{{hash}}}\plural{{1}}");
    let (out, _) = render_config(&source, site_config(), &site()).expect("render");
    assert_eq!(out, "item");
}

#[test]
fn custom_delimiters_from_meta_block() {
    let source = r"\\\utpp[prefix=@,argStart=(,argEnd=)]@f[n](shout)(`'$n' + '!'`)@shout(hi) \x{y}";
    let (out, diagnostics) = render_with(source, &[]).expect("render");
    assert_eq!(out, r"hi! \x{y}");
    assert!(diagnostics.is_empty());
}

#[test]
fn multiple_meta_blocks_are_noted() {
    let source = r"\\\utpp[version=1]a\\\utpp[version=2]b";
    let (out, diagnostics) = render_with(source, &[]).expect("render");
    assert_eq!(out, "ab");
    assert!(
        diagnostics
            .entries()
            .iter()
            .any(|d| d.message.contains("Multiple meta config blocks"))
    );
}

#[test]
fn forced_exec_builds_its_command() {
    let host = Host::default().with_shell(EchoShell);
    let config = Config::default().with_feature(Feature::Exec, true);
    let (out, _) =
        render_config(r"\var{dir}{src}\exec!{'ls ' + '$dir'}", config, &host).expect("render");
    assert_eq!(out, "ran: ls src");
}

#[test]
fn plain_text_passes_through() {
    let text = "no commands here,\njust text with a lone \\ and {braces}.\n";
    assert_eq!(render_str(text).expect("render"), text);
}

// -----------------------------------------------------------
// Failures.
// -----------------------------------------------------------

#[test]
fn runtime_errors_carry_position_and_file() {
    let err = render_str("line one\n  \\nope{}").expect_err("undefined");
    assert_eq!(
        err.to_string(),
        "function \\nope is undefined at line 2, column 3 in stdin"
    );
}

#[test]
fn halt_in_import_stops_everything() {
    let host = host_with(&[("guard.utpp", r"\halt{unsupported}")]);
    let mut diagnostics = Diagnostics::new();
    let err = render(r"\use{guard.utpp}after", Config::default(), &host, &mut diagnostics)
        .expect_err("halt");
    let Error::Runtime(err) = err else {
        panic!("expected runtime error, got {err}");
    };
    assert_eq!(
        err.kind,
        RuntimeErrorKind::Halted(Some("unsupported".to_string()))
    );
    assert_eq!(err.span.file.as_deref(), Some("guard.utpp"));
}

#[test]
fn missing_import_is_fatal() {
    let err = render_with(r"\use{absent.utpp}", &[]).expect_err("missing");
    assert!(matches!(err, Error::Import(_)));
    assert!(err.to_string().contains("absent.utpp"));
}

#[test]
fn unbalanced_group_is_a_syntax_error() {
    let err = render_str("text \\x{open").expect_err("unbalanced");
    assert!(matches!(err, Error::Lex(_)));
    assert_eq!(err.span().col, 7);
}

#[test]
fn meta_block_without_value_is_rejected() {
    let err = render_str(r"\\\utpp[net]x").expect_err("missing value");
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn imports_gate_leaves_use_inert() {
    let host = Host::default().with_fs(MemoryFs::new().with_file("a.utpp", "a"));
    let config = Config::default().with("imports", "false");
    let (out, diagnostics) = render_config(r"\use{a.utpp}b", config, &host).expect("render");
    assert_eq!(out, "b");
    assert_eq!(diagnostics.warnings().count(), 1);
}

#[test]
fn import_overrides_do_not_reach_rendering() {
    let (out, diagnostics) =
        render_with(r"\use[eval=false]{lib.utpp}", &[("lib.utpp", "`1 + 1`")]).expect("render");
    assert_eq!(out, "2");
    assert_eq!(diagnostics.warnings().count(), 0);
}
