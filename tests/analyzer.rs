//! Import resolution through the full compile pipeline.

mod common;

use common::{CannedFetcher, EchoShell, host_with};
use utpp::{
    Config, Diagnostics, Error, Feature, Host, ImportErrorKind, MemoryFs, NodeKind, Program,
    Severity, analyze, compile, sha256_hex,
};

fn compile_with(
    source: &str,
    config: Config,
    host: &Host,
) -> (Result<Program, Error>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let result = compile(source, config, host, &mut diagnostics).map(|(program, _)| program);
    (result, diagnostics)
}

fn import_kind(err: &Error) -> &ImportErrorKind {
    match err {
        Error::Import(e) => e.root_kind(),
        other => panic!("expected import error, got {other}"),
    }
}

// -----------------------------------------------------------
// Local files.
// -----------------------------------------------------------

#[test]
fn imports_are_resolved_relative_to_the_importer() {
    let host = host_with(&[
        ("site/main.utpp", ""),
        ("site/lib/a.utpp", r"A\use{b.utpp}"),
        ("site/lib/b.utpp", "B"),
    ]);
    let config = Config::default()
        .with("fileName", "main.utpp")
        .with("filePath", "site");
    let (result, _) = compile_with(r"\use{lib/a.utpp}main", config, &host);
    let program = result.expect("compile");

    let texts: Vec<_> = program
        .body
        .iter()
        .filter_map(|n| match &n.kind {
            NodeKind::RawText(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["B", "A", "main"]);
    assert_eq!(program.body[0].span.file.as_deref(), Some("b.utpp"));
    assert_eq!(program.body[1].span.file.as_deref(), Some("lib/a.utpp"));
    assert_eq!(program.body[2].span.file.as_deref(), Some("main.utpp"));
}

#[test]
fn several_imports_keep_source_order() {
    let host = host_with(&[("a.utpp", "a"), ("b.utpp", "b")]);
    let (result, _) = compile_with(r"\use{a.utpp}\use{b.utpp}", Config::default(), &host);
    let program = result.expect("compile");
    assert_eq!(program.body[0].kind, NodeKind::RawText("a".to_string()));
    assert_eq!(program.body[1].kind, NodeKind::RawText("b".to_string()));
}

#[test]
fn files_gate_skips_local_imports() {
    let host = host_with(&[("a.utpp", "a")]);
    let config = Config::default().with_feature(Feature::Files, false);
    let (result, diagnostics) = compile_with(r"\use{a.utpp}x", config, &host);
    assert_eq!(result.expect("compile").body.len(), 1);
    assert_eq!(diagnostics.warnings().count(), 1);
}

#[test]
fn imported_meta_block_is_local_to_the_import() {
    let host = host_with(&[("a.utpp", "\\\\\\utpp[prefix=@]@x{1}")]);
    let (result, _) = compile_with(r"\use{a.utpp}\y{2}", Config::default(), &host);
    let program = result.expect("compile");
    assert!(matches!(&program.body[0].kind, NodeKind::FunctionCall { name, .. } if name == "x"));
    assert!(matches!(&program.body[1].kind, NodeKind::FunctionCall { name, .. } if name == "y"));
}

#[test]
fn use_overrides_win_over_imported_meta_block() {
    let host = host_with(&[("a.utpp", "\\\\\\utpp[prefix=@]#x{1}")]);
    let (result, diagnostics) =
        compile_with(r"\use[prefix=#]{a.utpp}", Config::default(), &host);
    let program = result.expect("compile");
    assert!(matches!(&program.body[0].kind, NodeKind::FunctionCall { name, .. } if name == "x"));
    assert!(
        diagnostics
            .entries()
            .iter()
            .any(|d| d.severity == Severity::Info && d.message.contains("with custom config"))
    );
}

#[test]
fn overrides_propagate_to_nested_imports() {
    let host = host_with(&[("a.utpp", "#use{b.utpp}"), ("b.utpp", "#y{2}")]);
    let (result, _) = compile_with(r"\use[prefix=#]{a.utpp}", Config::default(), &host);
    let program = result.expect("compile");
    assert!(matches!(&program.body[0].kind, NodeKind::FunctionCall { name, .. } if name == "y"));
}

#[test]
fn flag_overrides_read_as_true() {
    let fetcher = CannedFetcher::new().with("https://example.com/lib.utpp", "net");
    let host = Host::default()
        .with_fs(MemoryFs::new().with_file("a.utpp", r"\use{https://example.com/lib.utpp}"))
        .with_fetcher(fetcher.clone());
    let (result, _) = compile_with(r"\use[net]{a.utpp}", Config::default(), &host);
    let program = result.expect("compile");
    assert_eq!(program.body[0].kind, NodeKind::RawText("net".to_string()));
    assert_eq!(fetcher.request_count(), 1);
}

#[test]
fn unknown_override_key_is_informational() {
    let host = host_with(&[("a.utpp", "a")]);
    let (result, diagnostics) = compile_with(r"\use[colour=red]{a.utpp}", Config::default(), &host);
    assert!(result.is_ok());
    assert!(
        diagnostics
            .entries()
            .iter()
            .any(|d| d.severity == Severity::Info && d.message.contains("colour"))
    );
    assert_eq!(diagnostics.warnings().count(), 0);
}

#[test]
fn function_in_override_is_rejected() {
    let host = host_with(&[("a.utpp", "a")]);
    let (result, _) = compile_with(r"\use[prefix=\x{}]{a.utpp}", Config::default(), &host);
    assert_eq!(
        import_kind(&result.expect_err("invalid")),
        &ImportErrorKind::InvalidOverride {
            key: "prefix".to_string()
        }
    );
}

#[test]
fn forced_target_is_evaluated() {
    let host = host_with(&[("lib.utpp", "lib")]);
    let (result, _) = compile_with(r"\use!{'lib' + '.utpp'}", Config::default(), &host);
    assert_eq!(
        result.expect("compile").body[0].kind,
        NodeKind::RawText("lib".to_string())
    );
}

#[test]
fn forced_target_needs_eval() {
    let host = host_with(&[("lib.utpp", "lib")]);
    let config = Config::default().with_feature(Feature::Eval, false);
    let (result, diagnostics) = compile_with(r"\use!{'lib' + '.utpp'}rest", config, &host);
    let program = result.expect("compile");
    assert_eq!(program.body.len(), 1);
    assert_eq!(program.body[0].kind, NodeKind::RawText("rest".to_string()));
    let warnings: Vec<_> = diagnostics.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains(&Feature::Eval.to_string()));
}

// -----------------------------------------------------------
// Hash pinning.
// -----------------------------------------------------------

#[test]
fn matching_hash_is_accepted_in_any_case() {
    let hash = sha256_hex(b"pinned").to_uppercase();
    let host = host_with(&[("a.utpp", "pinned")]);
    let source = format!(r"\use{{a.utpp}}{{{hash}}}");
    let (result, _) = compile_with(&source, Config::default(), &host);
    assert!(result.is_ok());
}

#[test]
fn hash_mismatch_reports_both_digests() {
    let host = host_with(&[("a.utpp", "tampered")]);
    let provided = sha256_hex(b"original");
    let source = format!(r"\use{{a.utpp}}{{{provided}}}");
    let (result, _) = compile_with(&source, Config::default(), &host);
    let err = result.expect_err("mismatch");
    assert_eq!(
        import_kind(&err),
        &ImportErrorKind::HashMismatch {
            target: "a.utpp".to_string(),
            provided: provided.clone(),
            actual: sha256_hex(b"tampered"),
        }
    );
    let message = err.to_string();
    assert!(message.contains(&provided));
    assert!(message.contains(&sha256_hex(b"tampered")));
}

#[test]
fn empty_hash_skips_verification() {
    let host = host_with(&[("a.utpp", "anything")]);
    let (result, _) = compile_with(r"\use{a.utpp}{}", Config::default(), &host);
    assert!(result.is_ok());
    let (result, _) = compile_with(r"\use{a.utpp}{  }", Config::default(), &host);
    assert!(result.is_ok());
}

// -----------------------------------------------------------
// Network.
// -----------------------------------------------------------

#[test]
fn net_gate_closed_contributes_nothing() {
    let fetcher = CannedFetcher::new().with("http://x/y", "remote");
    let host = Host::default().with_fetcher(fetcher.clone());
    let config = Config::default().with("fileName", "main.utpp");

    let mut diagnostics = Diagnostics::new();
    let (program, config) =
        compile(r"\use{http://x/y}text", config, &host, &mut diagnostics).expect("compile");
    assert_eq!(program.body.len(), 1);
    assert_eq!(diagnostics.warnings().count(), 1);
    assert_eq!(fetcher.request_count(), 0);

    let again = analyze(program.clone(), &config, &host, &mut diagnostics).expect("analyze");
    assert_eq!(again, program);
    assert_eq!(diagnostics.warnings().count(), 1);
}

#[test]
fn net_imports_use_the_fetcher() {
    let fetcher = CannedFetcher::new().with("https://example.com/a.utpp", "remote");
    let host = Host::default()
        .with_fetcher(fetcher.clone())
        .with_shell(EchoShell);
    let config = Config::default().with_feature(Feature::Net, true);
    let (result, _) = compile_with(r"\use{https://example.com/a.utpp}", config, &host);
    assert_eq!(
        result.expect("compile").body[0].kind,
        NodeKind::RawText("remote".to_string())
    );
    assert_eq!(fetcher.request_count(), 1);
}

#[test]
fn fetch_failure_is_fatal() {
    let host = host_with(&[]);
    let config = Config::default().with_feature(Feature::Net, true);
    let (result, _) = compile_with(r"\use{https://example.com/missing}", config, &host);
    assert!(matches!(
        import_kind(&result.expect_err("fetch")),
        ImportErrorKind::Fetch { .. }
    ));
}

// -----------------------------------------------------------
// Failures inside imported files.
// -----------------------------------------------------------

#[test]
fn syntax_error_in_import_names_the_import() {
    let host = host_with(&[("broken.utpp", "ok\n\\if{x}")]);
    let (result, _) = compile_with(r"\use{broken.utpp}", Config::default(), &host);
    let Err(Error::Import(err)) = result else {
        panic!("expected import error");
    };
    let ImportErrorKind::IncludeFailed { target, cause } = &err.kind else {
        panic!("expected include failure");
    };
    assert_eq!(target, "broken.utpp");
    assert_eq!(cause.span().file.as_deref(), Some("broken.utpp"));
    assert_eq!(cause.span().row, 1);
}

#[test]
fn mutual_imports_are_a_cycle() {
    let host = host_with(&[("a.utpp", r"\use{b.utpp}"), ("b.utpp", r"\use{a.utpp}")]);
    let (result, _) = compile_with(r"\use{a.utpp}", Config::default(), &host);
    let err = result.expect_err("cycle");
    let ImportErrorKind::Cycle { chain } = import_kind(&err) else {
        panic!("expected cycle, got {err}");
    };
    assert_eq!(chain, &["stdin", "a.utpp", "b.utpp", "a.utpp"]);
}

#[test]
fn invalid_encoding_is_fatal() {
    let host = Host::default().with_fs(MemoryFs::new().with_file("a.utpp", vec![0xff, 0xfe]));
    let (result, _) = compile_with(r"\use{a.utpp}", Config::default(), &host);
    assert!(matches!(
        import_kind(&result.expect_err("decode")),
        ImportErrorKind::Decode { .. }
    ));

    let (result, _) = compile_with(r"\use[fileEncoding=latin1]{a.utpp}", Config::default(), &host);
    assert_eq!(
        result.expect("latin1").body[0].kind,
        NodeKind::RawText("ÿþ".to_string())
    );
}
