//! Grammar loading and compilation errors surfaced through the
//! pipeline.

use parsegen::{CompileError, Pipeline, PipelineError};
use rstest::rstest;

fn compile_err(text: &str) -> CompileError {
    match Pipeline::from_yaml(text) {
        Err(PipelineError::Compile(e)) => e,
        Err(other) => panic!("expected a compile error, got {}", other),
        Ok(_) => panic!("expected a compile error, grammar compiled"),
    }
}

#[test]
fn invalid_yaml_is_reported() {
    assert!(matches!(compile_err("start: [\n"), CompileError::InvalidYaml(_)));
}

#[test]
fn main_grammar_needs_a_start_rule() {
    assert!(matches!(compile_err("word: \"a\"\n"), CompileError::MissingStart));
}

#[test]
fn tokenizer_grammar_needs_its_own_start_rule() {
    let text = "tokenizer:\n  word: \"a\"\nstart: word\n";
    assert!(matches!(compile_err(text), CompileError::MissingStart));
}

#[test]
fn bad_regexes_carry_the_pattern() {
    let text = "start:\n  $regex: \"[\"\n";
    match compile_err(text) {
        CompileError::InvalidRegex { pattern, .. } => assert_eq!(pattern, "["),
        other => panic!("expected InvalidRegex, got {}", other),
    }
}

#[test]
fn empty_literals_are_rejected() {
    let text = "start:\n  $literal: \"\"\n";
    assert!(matches!(compile_err(text), CompileError::EmptyLiteral));
}

#[rstest]
#[case::indent_in_the_token_stage("start: $indent\n")]
#[case::token_rule_in_the_tokenizer("tokenizer:\n  start:\n    token: word\nstart: word\n")]
fn stage_specific_leaves_stay_in_their_stage(#[case] text: &str) {
    assert!(matches!(compile_err(text), CompileError::InvalidShape(_)));
}

#[test]
fn without_a_tokenizer_section_the_grammar_tokenizes_itself() {
    // Unresolved names fall back to literals in the tokenizing stage
    // and to token types in the parsing stage, so a grammar of bare
    // references works for both.
    let pipeline = Pipeline::from_yaml("start: [hello, world]\n").unwrap();
    let run = pipeline.run("helloworld").unwrap();
    assert!(!run.has_leftover());
}
