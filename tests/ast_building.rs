//! AST construction through `$ast-node` and `$ast-prop` wrappers.

use parsegen::ast::Attribute;
use parsegen::Pipeline;

const WORDS: &str = r#"
tokenizer:
  start: [parts, $eof]
  parts:
    $repeat:
      $or: [word, __ws]
  word:
    $regex: "[a-z]+"
  __ws:
    $regex: " +"
"#;

fn pipeline(main: &str) -> Pipeline {
    Pipeline::from_yaml(&format!("{}{}", WORDS, main)).unwrap()
}

#[test]
fn properties_fold_into_the_enclosing_node() {
    let pipeline = pipeline(
        r#"
start:
  - $ast-node:
      type: pair
      value:
        - $ast-prop:
            name: first
            as-literal: true
            value: word
        - $ast-prop:
            name: second
            as-literal: true
            value: word
  - eof
"#,
    );
    let run = pipeline.run("hello world").unwrap();
    assert_eq!(run.ast.len(), 1);
    let pair = &run.ast[0];
    assert_eq!(pair.node_type, "pair");
    assert_eq!(pair.attributes["first"], Attribute::Text("hello".to_string()));
    assert_eq!(pair.attributes["second"], Attribute::Text("world".to_string()));
}

#[test]
fn as_list_keeps_a_single_node_as_a_list() {
    let pipeline = pipeline(
        r#"
start:
  - $ast-node:
      type: doc
      value:
        $ast-prop:
          name: items
          as-list: true
          value: item
  - eof
item:
  $ast-node:
    type: item
    value:
      $ast-prop:
        name: text
        as-literal: true
        value: word
"#,
    );
    let run = pipeline.run("one").unwrap();
    match &run.ast[0].attributes["items"] {
        Attribute::List(items) => assert_eq!(items.len(), 1),
        other => panic!("expected a list, got {:?}", other),
    }
}

#[test]
fn plain_property_with_many_nodes_becomes_a_list() {
    let pipeline = pipeline(
        r#"
start:
  - $ast-node:
      type: doc
      value:
        $ast-prop:
          name: items
          value:
            $repeat: item
  - eof
item:
  $ast-node:
    type: item
    value:
      $ast-prop:
        name: text
        as-literal: true
        value: word
"#,
    );
    let run = pipeline.run("one two three").unwrap();
    match &run.ast[0].attributes["items"] {
        Attribute::List(items) => assert_eq!(items.len(), 3),
        other => panic!("expected a list, got {:?}", other),
    }

    // A single collected node folds to a plain node attribute.
    let run = pipeline.run("one").unwrap();
    match &run.ast[0].attributes["items"] {
        Attribute::Node(item) => {
            assert_eq!(item.attributes["text"], Attribute::Text("one".to_string()));
        }
        other => panic!("expected a node, got {:?}", other),
    }
}

#[test]
fn literal_values_exclude_surrounding_whitespace() {
    let pipeline = pipeline(
        r#"
start:
  - $ast-node:
      type: pair
      value:
        - $ast-prop:
            name: first
            as-literal: true
            value: word
        - $ast-prop:
            name: second
            as-literal: true
            value: word
  - eof
"#,
    );
    // Ignorable whitespace around the words must not leak into the
    // literal spans.
    let run = pipeline.run("  hello   world  ").unwrap();
    let pair = &run.ast[0];
    assert_eq!(pair.attributes["first"], Attribute::Text("hello".to_string()));
    assert_eq!(pair.attributes["second"], Attribute::Text("world".to_string()));
}

#[test]
fn backtracked_wrappers_leave_no_trace() {
    // The first alternative builds nodes before failing on the second
    // word; the surviving AST must come from the second alternative
    // alone.
    let pipeline = pipeline(
        r#"
start:
  - $or:
      - - $ast-node:
            type: wrong
            value:
              $ast-prop:
                name: text
                as-literal: true
                value: word
        - $not: word
      - $ast-node:
          type: right
          value:
            $ast-prop:
              name: words
              as-list: true
              value:
                $repeat: wrapped
  - eof
wrapped:
  $ast-node:
    type: word
    value:
      $ast-prop:
        name: text
        as-literal: true
        value: word
"#,
    );
    let run = pipeline.run("two words").unwrap();
    assert_eq!(run.ast.len(), 1);
    assert_eq!(run.ast[0].node_type, "right");
}

#[test]
fn nested_nodes_fold_bottom_up() {
    let pipeline = pipeline(
        r#"
start:
  - $ast-node:
      type: outer
      value:
        $ast-prop:
          name: inner
          value:
            $ast-node:
              type: inner
              value:
                $ast-prop:
                  name: text
                  as-literal: true
                  value: word
  - eof
"#,
    );
    let run = pipeline.run("deep").unwrap();
    let outer = &run.ast[0];
    assert_eq!(outer.node_type, "outer");
    match &outer.attributes["inner"] {
        Attribute::Node(inner) => {
            assert_eq!(inner.node_type, "inner");
            assert_eq!(inner.attributes["text"], Attribute::Text("deep".to_string()));
        }
        other => panic!("expected a node, got {:?}", other),
    }
}
