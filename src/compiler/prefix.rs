//! First-symbol analysis.
//!
//! For every rule the analyzer computes the set of symbols the rule's
//! match could begin with: literal strings in the tokenizing stage,
//! token type names in the token-parsing stage. Harnesses intersect
//! these sets with what is actually possible at the current input
//! position and skip rules that cannot match.
//!
//! Two sentinels keep the analysis sound rather than precise. A rule
//! whose first input cannot be predicted (a regex, a lookahead, an
//! indentation leaf) contributes [`Symbol::Unknown`]; a rule that can
//! match empty input contributes [`Symbol::Nullable`]. A set holding
//! either sentinel disables pruning for its rule, so the result is
//! always an over-approximation: pruning may miss an impossible rule,
//! never a possible one. Cyclic references are broken with a visited
//! set, which assumes no rule reaches itself through a nullable-only
//! prefix.

use std::collections::HashSet;

use crate::error::CompileError;
use crate::grammar::{Grammar, Leaf, Rule};
use crate::set::{SetOps, Symbol};

/// The symbol domain a stage analyzes over.
pub trait PrefixDomain {
    type Set: SetOps;

    fn empty_set(&self) -> Self::Set;
    /// First symbols of a leaf rule.
    fn leaf_set(&self, leaf: &Leaf) -> Self::Set;
    /// First symbols of an unresolved rule name (the stage's fallback
    /// leaf decides what that name means).
    fn name_set(&self, name: &str) -> Self::Set;
}

/// Computes the first-symbol set of `rule`.
///
/// With `only_first` a sequence stops at the first element that cannot
/// match empty; without it every element contributes, which the
/// tokenizing stage uses once per grammar to discover all reachable
/// literals. `visited` breaks reference cycles: a name already on the
/// current path contributes nothing further.
pub fn first_set<D: PrefixDomain>(
    grammar: &Grammar,
    domain: &D,
    rule: &Rule,
    visited: &mut HashSet<String>,
    only_first: bool,
) -> Result<D::Set, CompileError> {
    match rule {
        Rule::Ref(name) => {
            if visited.contains(name) {
                return Ok(domain.empty_set());
            }
            visited.insert(name.clone());
            match grammar.rules.get(name) {
                Some(definition) => first_set(grammar, domain, definition, visited, only_first),
                None => Ok(domain.name_set(name)),
            }
        }
        Rule::Sequence(items) => {
            let mut set = domain.empty_set();
            for item in items {
                let sub = first_set(grammar, domain, item, visited, only_first)?;
                // A nullable prefix passes the question on to the next
                // element; the sentinel itself must not survive.
                set.remove(&Symbol::Nullable);
                set = set.union(&sub)?;
                if only_first && !set.contains(&Symbol::Nullable) {
                    break;
                }
            }
            Ok(set)
        }
        Rule::Or(branches) => {
            let mut set = domain.empty_set();
            for branch in branches {
                let sub = first_set(grammar, domain, branch, visited, only_first)?;
                set = set.union(&sub)?;
            }
            Ok(set)
        }
        Rule::And(sub) | Rule::Repeat(sub) => {
            first_set(grammar, domain, sub, visited, only_first)
        }
        Rule::Optional(sub) => {
            let mut set = first_set(grammar, domain, sub, visited, only_first)?;
            set.add(&Symbol::Nullable);
            Ok(set)
        }
        Rule::Not(_) => {
            let mut set = domain.empty_set();
            set.add(&Symbol::Unknown);
            Ok(set)
        }
        Rule::AstNode { value, .. } | Rule::AstProperty { value, .. } => {
            first_set(grammar, domain, value, visited, only_first)
        }
        Rule::Leaf(leaf) => Ok(domain.leaf_set(leaf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::load_grammar;
    use crate::set::HashSymbolSet;

    /// Analysis domain standing in for the tokenizing stage: literals
    /// and unresolved names are their own first symbol, everything
    /// else is unpredictable.
    struct LiteralDomain;

    impl PrefixDomain for LiteralDomain {
        type Set = HashSymbolSet;

        fn empty_set(&self) -> HashSymbolSet {
            HashSymbolSet::new()
        }

        fn leaf_set(&self, leaf: &Leaf) -> HashSymbolSet {
            let mut set = HashSymbolSet::new();
            match leaf {
                Leaf::Literal(text) => set.add(&Symbol::name(text)),
                _ => set.add(&Symbol::Unknown),
            }
            set
        }

        fn name_set(&self, name: &str) -> HashSymbolSet {
            let mut set = HashSymbolSet::new();
            set.add(&Symbol::name(name));
            set
        }
    }

    fn analyze(grammar_text: &str, rule_name: &str, only_first: bool) -> Vec<Symbol> {
        let grammar = load_grammar(grammar_text).unwrap();
        let rule = Rule::Ref(rule_name.to_string());
        let mut visited = HashSet::new();
        first_set(&grammar, &LiteralDomain, &rule, &mut visited, only_first)
            .unwrap()
            .symbols()
    }

    #[test]
    fn sequence_stops_at_first_non_nullable() {
        let symbols = analyze("start: [\"a\", \"b\"]\n", "start", true);
        assert_eq!(symbols, vec![Symbol::name("a")]);
    }

    #[test]
    fn nullable_prefix_passes_through_to_next_element() {
        let text = r#"
start: [maybe, "b"]
maybe:
  $optional: "a"
"#;
        let symbols = analyze(text, "start", true);
        assert_eq!(symbols, vec![Symbol::name("a"), Symbol::name("b")]);
    }

    #[test]
    fn trailing_nullable_sequence_is_nullable() {
        let text = r#"
start:
  - {$optional: "a"}
  - {$optional: "b"}
"#;
        let symbols = analyze(text, "start", true);
        assert_eq!(
            symbols,
            vec![Symbol::name("a"), Symbol::name("b"), Symbol::Nullable]
        );
    }

    #[test]
    fn alternation_unions_branches() {
        let text = r#"
start:
  $or: ["a", "b"]
"#;
        let symbols = analyze(text, "start", true);
        assert_eq!(symbols, vec![Symbol::name("a"), Symbol::name("b")]);
    }

    #[test]
    fn negation_is_unpredictable() {
        let text = r#"
start:
  $not: "a"
"#;
        assert_eq!(analyze(text, "start", true), vec![Symbol::Unknown]);
    }

    #[test]
    fn cycles_terminate_and_keep_acyclic_symbols() {
        let text = r#"
start:
  $or:
    - ["(", start, ")"]
    - "x"
"#;
        let symbols = analyze(text, "start", true);
        assert_eq!(symbols, vec![Symbol::name("("), Symbol::name("x")]);
    }

    #[test]
    fn full_traversal_collects_literals_past_the_first() {
        let symbols = analyze("start: [\"a\", \"b\", \"c\"]\n", "start", false);
        assert_eq!(
            symbols,
            vec![Symbol::name("a"), Symbol::name("b"), Symbol::name("c")]
        );
    }

    #[test]
    fn ast_wrappers_are_transparent() {
        let text = r#"
start:
  $ast-node:
    type: thing
    value: "t"
"#;
        assert_eq!(analyze(text, "start", true), vec![Symbol::name("t")]);
    }
}
