//! End-to-end runs of an arithmetic grammar through both stages.

use parsegen::ast::Attribute;
use parsegen::Pipeline;

const GRAMMAR: &str = r#"
tokenizer:
  start:
    - parts
    - $eof
  parts:
    $repeat:
      $or: [number, op, __ws]
  number:
    $regex: "[0-9]+"
  op:
    $or: ["+", "-"]
  __ws:
    $regex: " +"
start: [expression, eof]
expression:
  $or:
    - $ast-node:
        type: binop
        value:
          - $ast-prop:
              name: left
              value: operand
          - $ast-prop:
              name: op
              as-literal: true
              value: op
          - $ast-prop:
              name: right
              value: expression
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

fn pipeline() -> Pipeline {
    Pipeline::from_yaml(GRAMMAR).unwrap()
}

#[test]
fn parses_expressions_without_leftover() {
    let pipeline = pipeline();
    for source in ["1", "1+2", "1 + 2 - 3", "10-20+30"] {
        let run = pipeline.run(source).unwrap();
        assert!(!run.has_leftover(), "leftover tokens for {:?}", source);
    }
}

#[test]
fn builds_a_right_leaning_binop_tree() {
    let run = pipeline().run("1+2-3").unwrap();
    assert_eq!(run.ast.len(), 1);

    let top = &run.ast[0];
    assert_eq!(top.node_type, "binop");
    assert_eq!(top.attributes["op"], Attribute::Text("+".to_string()));
    match &top.attributes["left"] {
        Attribute::Node(n) => assert_eq!(n.node_type, "number"),
        other => panic!("expected a node, got {:?}", other),
    }

    let right = match &top.attributes["right"] {
        Attribute::Node(n) => n,
        other => panic!("expected a node, got {:?}", other),
    };
    assert_eq!(right.node_type, "binop");
    assert_eq!(right.attributes["op"], Attribute::Text("-".to_string()));
}

#[test]
fn literal_properties_carry_the_matched_text() {
    let run = pipeline().run("42").unwrap();
    assert_eq!(run.ast[0].node_type, "number");
    assert_eq!(run.ast[0].attributes["value"], Attribute::Text("42".to_string()));
}

#[test]
fn trailing_digits_survive_at_end_of_input() {
    // The last operand's span runs to the end of the source.
    let run = pipeline().run("1+234").unwrap();
    let right = match &run.ast[0].attributes["right"] {
        Attribute::Node(n) => n,
        other => panic!("expected a node, got {:?}", other),
    };
    assert_eq!(right.attributes["value"], Attribute::Text("234".to_string()));
}

#[test]
fn stats_count_both_stages() {
    let run = pipeline().run("1+2").unwrap();
    let stats = run.stats();
    assert!(stats.tokenizer_calls > 0);
    assert!(stats.parser_calls > 0);
    assert!(stats.tokens >= 3);
    assert_eq!(stats.lines, 1);
}

#[test]
fn unknown_bytes_fail_in_the_tokenizing_stage() {
    let err = pipeline().run("1+x").unwrap_err();
    assert!(matches!(err, parsegen::PipelineError::Tokenize(_)));
}
