//! Token stream produced by the tokenizing stage.
//!
//! Tokens live in an arena and point at each other through index
//! handles: `next` for the forward chain, `children` for nested
//! emissions, `parent` for the enclosing token. Handles stay valid for
//! the lifetime of the arena, so backtracked branches can leave
//! abandoned tokens behind without invalidating anything.

use std::fmt::Write as _;

use crate::set::{SymbolId, SymbolMap};

/// A location in the source: byte offset plus row/column derived from
/// the line-break index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub row: usize,
    pub column: usize,
}

/// Handle to a token in a [`TokenArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRef(u32);

/// One token. `number` is the emission sequence number, used as a
/// stable identity for memoization keys.
#[derive(Debug, Clone)]
pub struct TokenData {
    pub id: SymbolId,
    pub number: u32,
    pub ignore: bool,
    pub from: Position,
    pub to: Position,
    pub next: Option<TokenRef>,
    pub parent: Option<TokenRef>,
    pub children: Option<TokenRef>,
}

#[derive(Debug, Default)]
pub struct TokenArena {
    tokens: Vec<TokenData>,
}

impl TokenArena {
    pub fn new() -> TokenArena {
        TokenArena::default()
    }

    pub fn alloc(
        &mut self,
        id: SymbolId,
        number: u32,
        ignore: bool,
        from: Position,
        to: Position,
    ) -> TokenRef {
        let handle = TokenRef(self.tokens.len() as u32);
        self.tokens.push(TokenData {
            id,
            number,
            ignore,
            from,
            to,
            next: None,
            parent: None,
            children: None,
        });
        handle
    }

    pub fn get(&self, handle: TokenRef) -> &TokenData {
        &self.tokens[handle.0 as usize]
    }

    pub fn get_mut(&mut self, handle: TokenRef) -> &mut TokenData {
        &mut self.tokens[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Links `next` after `tail`; the appended token joins `tail`'s
    /// level of the tree.
    pub fn append(&mut self, tail: TokenRef, next: TokenRef) {
        let parent = self.get(tail).parent;
        self.get_mut(tail).next = Some(next);
        self.get_mut(next).parent = parent;
    }

    /// Detaches the chain starting at `head`: every token loses its
    /// forward link and its parent.
    pub fn sever(&mut self, head: TokenRef) {
        let mut current = Some(head);
        while let Some(handle) = current {
            let token = self.get_mut(handle);
            let next = token.next.take();
            token.parent = None;
            current = next;
        }
    }

    /// Makes `head`'s chain the children of `parent`.
    pub fn adopt(&mut self, parent: TokenRef, head: TokenRef) {
        self.get_mut(parent).children = Some(head);
        let mut current = Some(head);
        while let Some(handle) = current {
            self.get_mut(handle).parent = Some(parent);
            current = self.get(handle).next;
        }
    }

    /// Walks the next-chain starting at `head`, skipping ignorable
    /// tokens.
    pub fn skip_ignored(&self, mut current: Option<TokenRef>) -> Option<TokenRef> {
        while let Some(handle) = current {
            if !self.get(handle).ignore {
                return Some(handle);
            }
            current = self.get(handle).next;
        }
        None
    }
}

/// Prepares a token tree for token-level parsing: the last token of
/// every children chain gets its `next` pointed at the nearest
/// following token in document order (the closest ancestor's sibling).
/// Together with child descent in the token-parsing stage this yields
/// one continuous forward walk over the tree.
pub fn link_tokens(arena: &mut TokenArena, head: TokenRef) {
    let mut current = head;
    loop {
        if let Some(child) = arena.get(current).children {
            link_tokens(arena, child);
        }
        match arena.get(current).next {
            Some(next) => current = next,
            None => break,
        }
    }
    let mut parent = arena.get(current).parent;
    while let Some(p) = parent {
        if let Some(sibling) = arena.get(p).next {
            arena.get_mut(current).next = Some(sibling);
            break;
        }
        parent = arena.get(p).parent;
    }
}

/// Renders a token tree as an indented listing.
pub fn format_token_tree(arena: &TokenArena, map: &SymbolMap, head: TokenRef) -> String {
    let mut out = String::new();
    format_level(arena, map, head, 0, &mut out);
    out
}

fn format_level(
    arena: &TokenArena,
    map: &SymbolMap,
    head: TokenRef,
    level: usize,
    out: &mut String,
) {
    let mut current = Some(head);
    while let Some(handle) = current {
        let token = arena.get(handle);
        let name = map
            .symbol(token.id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("#{}", token.id));
        let _ = writeln!(
            out,
            "{}{}{} ({}:{}-{}:{})",
            "  ".repeat(level),
            name,
            if token.ignore { " (ignored)" } else { "" },
            token.from.row,
            token.from.column,
            token.to.row,
            token.to.column,
        );
        if let Some(child) = token.children {
            format_level(arena, map, child, level + 1, out);
        }
        // After linking, next may jump to an ancestor's sibling; stay
        // on this level only.
        current = match token.next {
            Some(next) if arena.get(next).parent == token.parent => Some(next),
            _ => None,
        };
    }
}
