//! Lexer edge cases and error tests.

mod common;

use common::lex;
use utpp::{LexErrorKind, Span, TokenConfig, TokenKind, tokenize};

fn kinds(input: &str) -> Vec<TokenKind> {
    lex(input).iter().map(|t| t.kind).collect()
}

// -----------------------------------------------------------
// Basic lexer behaviour.
// -----------------------------------------------------------

#[test]
fn lex_empty_input() {
    assert!(lex("").is_empty());
}

#[test]
fn lex_multiline_raw_text() {
    let tokens = lex("line one\nline two\n");
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].span, Span::new(0, 0));
}

#[test]
fn lex_command_without_arguments() {
    assert_eq!(
        kinds(r"a \name b"),
        vec![
            TokenKind::Raw,
            TokenKind::Prefix,
            TokenKind::CommandName,
            TokenKind::Raw,
        ]
    );
}

#[test]
fn lex_forced_command_name_keeps_bang() {
    let tokens = lex(r"\if!{1}{2}");
    assert_eq!(tokens[1].text, "if!");
}

#[test]
fn lex_line_comment_name() {
    let tokens = lex("\\# note\nnext");
    assert_eq!(tokens[1].text, "#");
    assert_eq!(tokens[2].kind, TokenKind::Raw);
    assert_eq!(tokens[2].text, " note\nnext");
}

#[test]
fn lex_inline_command_group() {
    let tokens = lex(r"\${1 + 2}");
    assert_eq!(tokens[1].text, "$");
    assert_eq!(tokens[2].kind, TokenKind::ArgStart);
    assert_eq!(tokens[3].text, "1 + 2");
}

#[test]
fn lex_expression_inside_argument() {
    let tokens = lex(r"\x{a `b` c}");
    assert!(
        tokens
            .iter()
            .any(|t| t.kind == TokenKind::Expression && t.text == "`b`")
    );
}

#[test]
fn lex_trailing_prefix_is_raw() {
    assert_eq!(kinds("end\\"), vec![TokenKind::Raw]);
}

// -----------------------------------------------------------
// Positions.
// -----------------------------------------------------------

#[test]
fn positions_after_newlines() {
    let tokens = lex("ab\ncd\\x{y}");
    assert_eq!(tokens[1].kind, TokenKind::Prefix);
    assert_eq!(tokens[1].span, Span::new(1, 2));
    assert_eq!(tokens[2].span, Span::new(1, 3));
    assert_eq!(tokens[4].span, Span::new(1, 5));
}

#[test]
fn positions_inside_param_values() {
    let tokens = lex("\\x[k=\\y{z}]");
    let inner = tokens
        .iter()
        .find(|t| t.kind == TokenKind::CommandName && t.text == "y")
        .expect("inner command");
    assert_eq!(inner.span, Span::new(0, 6));
}

#[test]
fn positions_in_multiline_groups() {
    let tokens = lex("\\x{\n  \\y{1}\n}");
    let inner = tokens
        .iter()
        .find(|t| t.kind == TokenKind::CommandName && t.text == "y")
        .expect("inner command");
    assert_eq!(inner.span, Span::new(1, 3));
}

// -----------------------------------------------------------
// Errors.
// -----------------------------------------------------------

#[test]
fn error_unbalanced_group() {
    let err = tokenize("\\x{\n{", &TokenConfig::default()).expect_err("should fail");
    assert_eq!(err.kind, LexErrorKind::UnbalancedBraces);
    assert_eq!(err.span, Span::new(0, 2));
}

#[test]
fn error_inside_nested_group_is_absolute() {
    let err = tokenize("ab\n\\x{`open}", &TokenConfig::default()).expect_err("should fail");
    assert_eq!(err.kind, LexErrorKind::UnterminatedExpression);
    assert_eq!(err.span, Span::new(1, 3));
}

#[test]
fn error_display_is_one_based() {
    let err = tokenize("\\x{", &TokenConfig::default())
        .expect_err("should fail")
        .in_file("page.utpp");
    assert_eq!(
        err.to_string(),
        "unbalanced braces in command arguments at line 1, column 3 in page.utpp"
    );
}
