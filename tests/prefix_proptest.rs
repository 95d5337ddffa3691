//! Property-based tests for the full pipeline.
//!
//! Prefix pruning is an over-approximation: it may let a doomed rule
//! run, but it must never reject an input the grammar accepts. These
//! tests drive generated sources through a pruned grammar and check
//! that every well-formed input still parses.

use proptest::prelude::*;

use parsegen::ast::{AstNode, Attribute};
use parsegen::Pipeline;

const GRAMMAR: &str = r#"
tokenizer:
  start: [parts, $eof]
  parts:
    $repeat:
      $or: [number, op, __ws]
  number:
    $regex: "[0-9]+"
  op:
    $or: ["+", "-", "*"]
  __ws:
    $regex: " +"
start: [expression, eof]
expression:
  $or:
    - [operand, op, expression]
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

fn expression_strategy() -> impl Strategy<Value = String> {
    let number = 0u32..10_000;
    let op = prop::sample::select(vec!["+", "-", "*", " + ", " - "]);
    (number.clone(), prop::collection::vec((op, number), 0..8)).prop_map(|(first, rest)| {
        let mut out = first.to_string();
        for (op, n) in rest {
            out.push_str(&op);
            out.push_str(&n.to_string());
        }
        out
    })
}

fn count_numbers(node: &AstNode) -> usize {
    let mut count = usize::from(node.node_type == "number");
    for attr in node.attributes.values() {
        match attr {
            Attribute::Node(child) => count += count_numbers(child),
            Attribute::List(children) => {
                count += children.iter().map(count_numbers).sum::<usize>();
            }
            Attribute::Text(_) => {}
        }
    }
    count
}

proptest! {
    #[test]
    fn well_formed_expressions_always_parse(source in expression_strategy()) {
        let pipeline = Pipeline::from_yaml(GRAMMAR).unwrap();
        let run = pipeline.run(&source).unwrap();
        prop_assert!(!run.has_leftover(), "leftover tokens for {:?}", source);
    }

    #[test]
    fn every_operand_reaches_the_ast(source in expression_strategy()) {
        let pipeline = Pipeline::from_yaml(GRAMMAR).unwrap();
        let run = pipeline.run(&source).unwrap();
        let expected = 1 + source.matches(|c: char| "+-*".contains(c)).count();
        let found: usize = run.ast.iter().map(count_numbers).sum();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn arbitrary_ascii_never_panics(source in "[ -~]{0,40}") {
        let pipeline = Pipeline::from_yaml(GRAMMAR).unwrap();
        // Most inputs fail to tokenize; none may panic.
        let _ = pipeline.run(&source);
    }

    #[test]
    fn leading_and_trailing_spaces_are_ignored(n in 0u32..1000, pad in " {0,3}") {
        let pipeline = Pipeline::from_yaml(GRAMMAR).unwrap();
        let source = format!("{}{}{}", pad, n, pad);
        let run = pipeline.run(&source).unwrap();
        prop_assert!(!run.has_leftover());
        prop_assert_eq!(run.ast.len(), 1);
    }
}
