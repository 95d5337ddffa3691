//! AST values built during the token-parsing stage.
//!
//! Grammar rules wrapped in `$ast-node` and `$ast-prop` push entries
//! onto a per-state stack. Folding is mark-based: a wrapper captures
//! the stack length before running its sub-rule, and on success folds
//! everything pushed above that mark into the new entry. A failed
//! sub-rule never reaches the fold, so the caller's stack is unchanged
//! by backtracked attempts.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::ParseError;

/// A typed node with named attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AstNode {
    #[serde(rename = "type")]
    pub node_type: String,
    pub attributes: BTreeMap<String, Attribute>,
}

impl AstNode {
    pub fn new(node_type: &str) -> AstNode {
        AstNode { node_type: node_type.to_string(), attributes: BTreeMap::new() }
    }
}

/// An attribute value on a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Attribute {
    Text(String),
    Node(AstNode),
    List(Vec<AstNode>),
}

/// A pending property: collected child nodes or literal matched text,
/// waiting to be folded into an enclosing node.
#[derive(Debug, Clone, PartialEq)]
pub struct AstProperty {
    pub name: String,
    pub as_list: bool,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Nodes above the mark will be collected at fold time.
    Pending,
    /// Literal text of the sub-rule's matched span (`as-literal`).
    Text(String),
    Nodes(Vec<AstNode>),
}

/// A stack entry.
#[derive(Debug, Clone, PartialEq)]
pub enum AstValue {
    Node(AstNode),
    Property(AstProperty),
}

/// Folds the entries above `mark` into `node` as attributes, then
/// replaces them with the node. Every entry above the mark must be a
/// property.
pub fn push_node(stack: &mut Vec<AstValue>, mark: usize, mut node: AstNode) -> Result<(), ParseError> {
    for entry in stack.iter().skip(mark) {
        let prop = match entry {
            AstValue::Property(p) => p,
            AstValue::Node(n) => {
                return Err(ParseError::NoMatch(format!(
                    "expected a property on the AST stack, found a '{}' node",
                    n.node_type
                )));
            }
        };
        node.attributes.insert(prop.name.clone(), attribute_of(prop));
    }
    stack.truncate(mark);
    stack.push(AstValue::Node(node));
    Ok(())
}

/// Collects the nodes above `mark` into `property` (unless it already
/// carries literal text), then replaces them with the property. Every
/// entry above the mark must be a node.
pub fn push_property(
    stack: &mut Vec<AstValue>,
    mark: usize,
    mut property: AstProperty,
) -> Result<(), ParseError> {
    if matches!(property.value, PropertyValue::Pending) {
        let mut nodes = Vec::new();
        for entry in stack.iter().skip(mark) {
            match entry {
                AstValue::Node(n) => nodes.push(n.clone()),
                AstValue::Property(p) => {
                    return Err(ParseError::NoMatch(format!(
                        "expected a node on the AST stack, found property '{}'",
                        p.name
                    )));
                }
            }
        }
        property.value = PropertyValue::Nodes(nodes);
    }
    stack.truncate(mark);
    stack.push(AstValue::Property(property));
    Ok(())
}

/// A single collected node folds to a plain node attribute unless the
/// property asked for a list.
fn attribute_of(prop: &AstProperty) -> Attribute {
    match &prop.value {
        PropertyValue::Text(text) => Attribute::Text(text.clone()),
        PropertyValue::Pending => Attribute::List(Vec::new()),
        PropertyValue::Nodes(nodes) => {
            if !prop.as_list && nodes.len() == 1 {
                Attribute::Node(nodes[0].clone())
            } else {
                Attribute::List(nodes.clone())
            }
        }
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_ast(self))
    }
}

/// Renders a node as an indented tree.
pub fn format_ast(node: &AstNode) -> String {
    let mut out = String::new();
    format_node(node, 0, &mut out);
    out
}

fn format_node(node: &AstNode, level: usize, out: &mut String) {
    let pad = "  ".repeat(level);
    let _ = writeln!(out, "{}{}", pad, node.node_type);
    for (name, value) in &node.attributes {
        match value {
            Attribute::Text(text) => {
                let _ = writeln!(out, "{}  {} = {:?}", pad, name, text);
            }
            Attribute::Node(child) => {
                let _ = writeln!(out, "{}  {}:", pad, name);
                format_node(child, level + 2, out);
            }
            Attribute::List(children) => {
                let _ = writeln!(out, "{}  {}: [{}]", pad, name, children.len());
                for child in children {
                    format_node(child, level + 2, out);
                }
            }
        }
    }
}
