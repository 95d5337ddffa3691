//! Indentation-sensitive parsing across both stages.
//!
//! The tokenizing stage turns leading whitespace into synthetic
//! `indent` and `dedent` tokens; the main grammar consumes them like
//! any other token type.

use parsegen::ast::{AstNode, Attribute};
use parsegen::{Pipeline, PipelineError};

const GRAMMAR: &str = r#"
tokenizer:
  start: [lines, $eof]
  lines:
    $repeat: line
  line: [$indent, word, "\n"]
  word:
    $regex: "[a-z]+"
start:
  - $ast-node:
      type: program
      value: block
  - eof
block:
  $ast-prop:
    name: statements
    as-list: true
    value:
      $repeat: statement
statement:
  $ast-node:
    type: statement
    value:
      - $ast-prop:
          name: name
          as-literal: true
          value: word
      - "\n"
      - $optional:
          - indent
          - $ast-prop:
              name: body
              value:
                $ast-node:
                  type: body
                  value: block
          - dedent
"#;

fn pipeline() -> Pipeline {
    Pipeline::from_yaml(GRAMMAR).unwrap()
}

fn count_tokens(tree: &str, name: &str) -> usize {
    let prefix = format!("{} (", name);
    tree.lines().filter(|line| line.trim_start().starts_with(&prefix)).count()
}

fn statements(node: &AstNode) -> Vec<AstNode> {
    match &node.attributes["statements"] {
        Attribute::List(nodes) => nodes.clone(),
        other => panic!("expected a statement list, got {:?}", other),
    }
}

#[test]
fn flat_lines_parse_without_indent_tokens() {
    let run = pipeline().run("a\nb\nc\n").unwrap();
    assert!(!run.has_leftover());
    assert_eq!(statements(&run.ast[0]).len(), 3);

    let tree = run.tokenized.format_tree();
    assert_eq!(count_tokens(&tree, "indent"), 0);
    assert_eq!(count_tokens(&tree, "dedent"), 0);
}

#[test]
fn nested_block_emits_one_indent_and_one_dedent() {
    let run = pipeline().run("a\n  b\n  c\nd\n").unwrap();
    assert!(!run.has_leftover());

    let tree = run.tokenized.format_tree();
    assert_eq!(count_tokens(&tree, "indent"), 1);
    assert_eq!(count_tokens(&tree, "dedent"), 1);

    // Two top-level statements; the nested lines belong to the first.
    let top = statements(&run.ast[0]);
    assert_eq!(top.len(), 2);
    assert!(top[0].attributes.contains_key("body"));
    assert!(!top[1].attributes.contains_key("body"));
}

#[test]
fn dedent_returns_to_an_enclosing_level() {
    // Dropping from the third level straight back to the first closes
    // two levels, one dedent each.
    let run = pipeline().run("a\n  b\n    c\nd\n").unwrap();
    assert!(!run.has_leftover());
    let tree = run.tokenized.format_tree();
    assert_eq!(count_tokens(&tree, "indent"), 2);
    assert_eq!(count_tokens(&tree, "dedent"), 2);
}

#[test]
fn mismatched_dedent_is_an_error() {
    // " b" does not match any enclosing indentation level.
    let err = pipeline().run("a\n    x\n b\n").unwrap_err();
    assert!(matches!(err, PipelineError::Tokenize(_)));
}

#[test]
fn bodies_carry_their_statements() {
    let run = pipeline().run("a\n  b\nc\n").unwrap();
    let top = statements(&run.ast[0]);
    assert_eq!(top[0].attributes["name"], Attribute::Text("a".to_string()));

    let body = match &top[0].attributes["body"] {
        Attribute::Node(n) => n,
        other => panic!("expected a body node, got {:?}", other),
    };
    assert_eq!(body.node_type, "body");
    let inner = statements(body);
    assert_eq!(inner.len(), 1);
    assert_eq!(inner[0].attributes["name"], Attribute::Text("b".to_string()));
}
