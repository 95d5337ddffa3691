//! Grammar model and YAML loader.
//!
//! A grammar is data: a mapping from rule names to rule values. Rule
//! values are either a bare string (a reference to another rule, or a
//! reserved leaf like `$indent`), a list (a sequence), or a single-key
//! mapping naming a control combinator:
//!
//! ```yaml
//! start: [statements, $eof]
//! statements:
//!   $repeat: statement
//! statement:
//!   $or:
//!     - assignment
//!     - expression
//! ```
//!
//! Two reserved top-level keys are not rules: `tokenizer` holds the
//! sub-grammar compiled for the byte-level stage, and `memoize` lists
//! rule names whose outcomes the token-parsing stage caches.

use std::collections::{HashMap, HashSet};

use serde_yaml::Value;

use crate::error::CompileError;

/// Leaf rules: the points where a stage touches its input directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Leaf {
    /// Exact text, escape sequences expanded. Byte-level stage only.
    Literal(String),
    /// Anchored regex over the remaining input. Byte-level stage only.
    Regex(String),
    /// Indentation tracking (`$indent`). Byte-level stage only.
    Indent,
    /// End of input (`$eof`). Byte-level stage only.
    Eof,
    /// A token of the named type. Token-parsing stage only.
    Token(String),
}

/// A grammar rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Reference to a named rule; unresolved names fall back to the
    /// stage's default leaf (a literal, or a token type).
    Ref(String),
    Sequence(Vec<Rule>),
    /// Ordered choice, first match wins (`$or`).
    Or(Vec<Rule>),
    /// Conjunctive lookahead, consumes nothing (`$and`).
    And(Box<Rule>),
    /// Negation lookahead, consumes nothing (`$not`).
    Not(Box<Rule>),
    /// Zero-or-one (`$optional`).
    Optional(Box<Rule>),
    /// One-or-more (`$repeat`).
    Repeat(Box<Rule>),
    /// Builds a typed AST node from the sub-rule (`$ast-node`).
    AstNode { node_type: String, value: Box<Rule> },
    /// Collects the sub-rule's AST output under a name (`$ast-prop`).
    AstProperty { name: String, as_list: bool, as_literal: bool, value: Box<Rule> },
    Leaf(Leaf),
}

/// A loaded grammar, optionally carrying a tokenizer sub-grammar.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    pub rules: HashMap<String, Rule>,
    pub memoize: HashSet<String>,
    pub tokenizer: Option<Box<Grammar>>,
}

impl Grammar {
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn has_start(&self) -> bool {
        self.rules.contains_key("start")
    }
}

/// Parses a YAML grammar document.
pub fn load_grammar(text: &str) -> Result<Grammar, CompileError> {
    let doc: Value =
        serde_yaml::from_str(text).map_err(|e| CompileError::InvalidYaml(e.to_string()))?;
    grammar_from_value(&doc, true)
}

fn grammar_from_value(value: &Value, top_level: bool) -> Result<Grammar, CompileError> {
    let mapping = match value {
        Value::Mapping(m) => m,
        _ => {
            return Err(CompileError::InvalidShape(
                "a grammar must be a mapping of rule names to rules".to_string(),
            ));
        }
    };
    let mut grammar = Grammar::default();
    for (key, val) in mapping {
        let name = match key {
            Value::String(s) => s,
            other => return Err(CompileError::NonStringKey(format!("{:?}", other))),
        };
        match name.as_str() {
            "tokenizer" if top_level => {
                grammar.tokenizer = Some(Box::new(grammar_from_value(val, false)?));
            }
            "memoize" if top_level => {
                grammar.memoize = memoize_list(val)?;
            }
            _ => {
                grammar.rules.insert(name.clone(), rule_from_value(val)?);
            }
        }
    }
    Ok(grammar)
}

fn memoize_list(value: &Value) -> Result<HashSet<String>, CompileError> {
    let items = match value {
        Value::Sequence(items) => items,
        _ => {
            return Err(CompileError::InvalidShape(
                "'memoize' must be a list of rule names".to_string(),
            ));
        }
    };
    let mut names = HashSet::new();
    for item in items {
        match item {
            Value::String(s) => {
                names.insert(s.clone());
            }
            _ => {
                return Err(CompileError::InvalidShape(
                    "'memoize' entries must be rule names".to_string(),
                ));
            }
        }
    }
    Ok(names)
}

fn rule_from_value(value: &Value) -> Result<Rule, CompileError> {
    match value {
        Value::String(s) => Ok(match s.as_str() {
            "$indent" => Rule::Leaf(Leaf::Indent),
            "$eof" => Rule::Leaf(Leaf::Eof),
            _ => Rule::Ref(s.clone()),
        }),
        Value::Sequence(items) => {
            let rules = items.iter().map(rule_from_value).collect::<Result<Vec<_>, _>>()?;
            Ok(Rule::Sequence(rules))
        }
        Value::Mapping(m) if m.len() == 1 => {
            let (key, val) = match m.iter().next() {
                Some(pair) => pair,
                None => {
                    return Err(CompileError::InvalidShape(
                        "a rule mapping must have exactly one key".to_string(),
                    ));
                }
            };
            let key = match key {
                Value::String(s) => s,
                other => return Err(CompileError::NonStringKey(format!("{:?}", other))),
            };
            control_from_value(key, val)
        }
        Value::Mapping(_) => Err(CompileError::InvalidShape(
            "a rule mapping must have exactly one key".to_string(),
        )),
        other => Err(CompileError::InvalidShape(format!(
            "a rule must be a string, a list, or a single-key mapping, got {:?}",
            other
        ))),
    }
}

fn control_from_value(key: &str, value: &Value) -> Result<Rule, CompileError> {
    match key {
        "$or" => {
            let items = match value {
                Value::Sequence(items) if !items.is_empty() => items,
                _ => {
                    return Err(CompileError::InvalidShape(
                        "$or expects a non-empty list of alternatives".to_string(),
                    ));
                }
            };
            let branches = items.iter().map(rule_from_value).collect::<Result<Vec<_>, _>>()?;
            Ok(Rule::Or(branches))
        }
        "$and" => Ok(Rule::And(Box::new(rule_from_value(value)?))),
        "$not" => Ok(Rule::Not(Box::new(rule_from_value(value)?))),
        "$optional" => Ok(Rule::Optional(Box::new(rule_from_value(value)?))),
        "$repeat" => Ok(Rule::Repeat(Box::new(rule_from_value(value)?))),
        "$ast-node" => {
            let node_type = string_field(value, "type", "$ast-node")?;
            let inner = field(value, "value", "$ast-node")?;
            Ok(Rule::AstNode { node_type, value: Box::new(rule_from_value(inner)?) })
        }
        "$ast-prop" => {
            let name = string_field(value, "name", "$ast-prop")?;
            let inner = field(value, "value", "$ast-prop")?;
            Ok(Rule::AstProperty {
                name,
                as_list: bool_field(value, "as-list")?,
                as_literal: bool_field(value, "as-literal")?,
                value: Box::new(rule_from_value(inner)?),
            })
        }
        "$literal" => match value {
            Value::String(s) if !s.is_empty() => Ok(Rule::Leaf(Leaf::Literal(s.clone()))),
            Value::String(_) => Err(CompileError::EmptyLiteral),
            _ => Err(CompileError::InvalidShape("$literal expects a string".to_string())),
        },
        "$regex" => match value {
            Value::String(s) => Ok(Rule::Leaf(Leaf::Regex(s.clone()))),
            _ => Err(CompileError::InvalidShape("$regex expects a string".to_string())),
        },
        "token" => match value {
            Value::String(s) => Ok(Rule::Leaf(Leaf::Token(s.clone()))),
            _ => Err(CompileError::InvalidShape("token expects a token type name".to_string())),
        },
        other => Err(CompileError::InvalidShape(format!("unknown control rule '{}'", other))),
    }
}

fn field<'a>(value: &'a Value, name: &str, control: &str) -> Result<&'a Value, CompileError> {
    value.get(name).ok_or_else(|| {
        CompileError::InvalidShape(format!("{} requires a '{}' entry", control, name))
    })
}

fn string_field(value: &Value, name: &str, control: &str) -> Result<String, CompileError> {
    match field(value, name, control)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(CompileError::InvalidShape(format!(
            "{} entry '{}' must be a string",
            control, name
        ))),
    }
}

fn bool_field(value: &Value, name: &str) -> Result<bool, CompileError> {
    match value.get(name) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => {
            Err(CompileError::InvalidShape(format!("entry '{}' must be a boolean", name)))
        }
    }
}
