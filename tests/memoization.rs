//! Memoization of token-level rules.
//!
//! Rules listed under `memoize` cache their outcome per starting
//! token; alternatives that re-enter the same rule at the same token
//! replay the stored result instead of running the body again.

use parsegen::Pipeline;

const TOKENIZER: &str = r#"
tokenizer:
  start: [parts, $eof]
  parts:
    $repeat:
      $or: [number, "+", "-"]
  number:
    $regex: "[0-9]+"
"#;

// Both alternatives start with the same `operand`, so the second
// attempt re-enters it at the same token after the first fails.
const MAIN: &str = r#"
start: [expression, eof]
expression:
  $or:
    - [operand, "+", expression]
    - [operand, "-", expression]
    - operand
operand:
  $ast-node:
    type: number
    value:
      $ast-prop:
        name: value
        as-literal: true
        value: number
"#;

fn run_calls(grammar: &str, source: &str) -> (u64, Vec<parsegen::ast::AstNode>) {
    let pipeline = Pipeline::from_yaml(grammar).unwrap();
    let run = pipeline.run(source).unwrap();
    assert!(!run.has_leftover());
    let stats = run.stats();
    (stats.parser_calls, run.ast)
}

#[test]
fn memoized_rules_replay_instead_of_re_running() {
    let plain = format!("{}{}", TOKENIZER, MAIN);
    let memoized = format!("{}memoize: [operand]\n{}", TOKENIZER, MAIN);
    let source = "1-2-3-4";

    let (plain_calls, plain_ast) = run_calls(&plain, source);
    let (memo_calls, memo_ast) = run_calls(&memoized, source);

    assert!(
        memo_calls < plain_calls,
        "expected fewer calls with memoization: {} vs {}",
        memo_calls,
        plain_calls
    );
    assert_eq!(memo_ast, plain_ast);
}

#[test]
fn memoized_failures_replay_too() {
    let main = r#"
start: [body, eof]
body:
  $or:
    - [pair, "+"]
    - [pair, "-"]
    - [number, "-", number]
pair: [number, number]
"#;
    // `pair` fails at the first token in the first two alternatives;
    // the second attempt replays the stored failure instead of
    // running the body again.
    let plain = format!("{}{}", TOKENIZER, main);
    let memoized = format!("{}memoize: [pair]\n{}", TOKENIZER, main);

    let (plain_calls, plain_ast) = run_calls(&plain, "1-2");
    let (memo_calls, memo_ast) = run_calls(&memoized, "1-2");

    assert!(memo_calls < plain_calls, "{} vs {}", memo_calls, plain_calls);
    assert_eq!(plain_ast, memo_ast);
}

#[test]
fn memoization_does_not_change_results() {
    let plain = format!("{}{}", TOKENIZER, MAIN);
    let memoized = format!("{}memoize: [operand, expression]\n{}", TOKENIZER, MAIN);

    for source in ["7", "1+2", "9-8+7-6"] {
        let (_, plain_ast) = run_calls(&plain, source);
        let (_, memo_ast) = run_calls(&memoized, source);
        assert_eq!(plain_ast, memo_ast, "diverged on {:?}", source);
    }
}
