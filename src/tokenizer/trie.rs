//! Byte-level prefix trie over the grammar's literals.
//!
//! Built once per compiled grammar from every literal the prefix
//! analyzer discovered. At parse time a single walk from the current
//! position collects the ids of all literals that start here; harness
//! pruning intersects rule prefix sets against that.

use crate::set::{BitSet, SymbolId};

/// Edge fan-out is the full byte range; node 0 is the root and can
/// never be an edge target, so 0 doubles as "no edge".
struct TrieNode {
    next: [u32; 256],
    id: Option<SymbolId>,
}

impl TrieNode {
    fn new() -> TrieNode {
        TrieNode { next: [0u32; 256], id: None }
    }
}

pub struct PrefixTrie {
    nodes: Vec<TrieNode>,
}

impl PrefixTrie {
    /// Builds the trie from `(literal, id)` pairs.
    pub fn build<'a>(literals: impl IntoIterator<Item = (&'a str, SymbolId)>) -> PrefixTrie {
        let mut trie = PrefixTrie { nodes: vec![TrieNode::new()] };
        for (literal, id) in literals {
            trie.insert(literal.as_bytes(), id);
        }
        trie
    }

    fn insert(&mut self, bytes: &[u8], id: SymbolId) {
        let mut node = 0usize;
        for &byte in bytes {
            let edge = self.nodes[node].next[byte as usize];
            node = if edge == 0 {
                let fresh = self.nodes.len() as u32;
                self.nodes.push(TrieNode::new());
                self.nodes[node].next[byte as usize] = fresh;
                fresh as usize
            } else {
                edge as usize
            };
        }
        self.nodes[node].id = Some(id);
    }

    /// Adds to `set` the ids of all literals rooted at `start`.
    pub fn collect_at(&self, input: &[u8], start: usize, set: &mut BitSet) {
        let mut node = 0usize;
        for &byte in input.iter().skip(start) {
            let edge = self.nodes[node].next[byte as usize];
            if edge == 0 {
                return;
            }
            node = edge as usize;
            if let Some(id) = self.nodes[node].id {
                set.add_id(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::{SetOps, SymbolMap};

    fn collected(trie: &PrefixTrie, input: &str, start: usize) -> Vec<SymbolId> {
        let mut set = BitSet::new(SymbolMap::shared());
        trie.collect_at(input.as_bytes(), start, &mut set);
        (0..64).filter(|id| set.contains_id(*id)).collect()
    }

    #[test]
    fn collects_every_literal_rooted_at_the_position() {
        let trie = PrefixTrie::build(vec![("i", 1), ("if", 2), ("ifelse", 3), ("in", 4)]);
        assert_eq!(collected(&trie, "ifelse x", 0), vec![1, 2, 3]);
        assert_eq!(collected(&trie, "if x", 0), vec![1, 2]);
        assert_eq!(collected(&trie, "in x", 0), vec![1, 4]);
        assert_eq!(collected(&trie, "x if", 0), Vec::<SymbolId>::new());
    }

    #[test]
    fn walks_from_the_given_offset() {
        let trie = PrefixTrie::build(vec![("ab", 7)]);
        assert_eq!(collected(&trie, "xxab", 2), vec![7]);
        assert_eq!(collected(&trie, "xxab", 1), Vec::<SymbolId>::new());
    }

    #[test]
    fn handles_input_shorter_than_the_literal() {
        let trie = PrefixTrie::build(vec![("abc", 1)]);
        assert_eq!(collected(&trie, "ab", 0), Vec::<SymbolId>::new());
    }

    #[test]
    fn len_is_usable_on_empty_sets() {
        let trie = PrefixTrie::build(Vec::<(&str, SymbolId)>::new());
        let mut set = BitSet::new(SymbolMap::shared());
        trie.collect_at(b"anything", 0, &mut set);
        assert!(set.is_empty());
    }
}
