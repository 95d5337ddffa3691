//! Byte-level tokenizing stage.
//!
//! Compiles the tokenizer grammar into parsers over raw source bytes.
//! Leaves are literals, anchored regexes, end-of-input, and the
//! `$indent` rule that turns leading whitespace into synthetic
//! indent/dedent tokens. Every named rule's harness emits a token
//! spanning what the rule consumed, with the tokens emitted by
//! sub-rules attached as children, so the stage's output is a token
//! tree rather than a flat list.
//!
//! States are cheap to clone: the position and indentation stack are
//! owned, everything else (source, arena, counters, the lazily
//! recomputed prefix cursor) lives in one shared context.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::ast::{AstNode, AstProperty};
use crate::compiler::{Chain, LeafInfo, ParseState, ParserFn, StagePlugin, Success};
use crate::error::{CompileError, ParseError};
use crate::grammar::Leaf;
use crate::set::{BitSet, HashSymbolSet, SetOps, SharedSymbolMap, Symbol};

pub mod stream;
pub mod trie;

pub use stream::{format_token_tree, link_tokens, Position, TokenArena, TokenData, TokenRef};
pub use trie::PrefixTrie;

static LITERAL_ESCAPE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"\\[tnrs\\]").expect("escape pattern is valid")
});

/// Expands the escape sequences grammar files may use inside literals:
/// `\t`, `\n`, `\r`, `\s` (space), and `\\`.
pub fn unescape_literal(text: &str) -> String {
    LITERAL_ESCAPE
        .replace_all(text, |caps: &regex::Captures| match &caps[0] {
            r"\t" => "\t",
            r"\n" => "\n",
            r"\r" => "\r",
            r"\s" => " ",
            _ => "\\",
        })
        .into_owned()
}

/// Current-position literal set, recomputed by the harness whenever
/// the position moves.
#[derive(Debug, Default)]
struct PrefixCursor {
    pos: Option<usize>,
    set: Option<BitSet>,
}

/// Shared, interior-mutable side of the tokenizing stage.
#[derive(Debug)]
pub struct StringContext {
    source: Vec<u8>,
    line_breaks: Vec<usize>,
    row_cursor: Cell<usize>,
    token_ids: SharedSymbolMap,
    arena: RefCell<TokenArena>,
    cursor: RefCell<PrefixCursor>,
    next_number: Cell<u32>,
    calls: Cell<u64>,
    errors: Cell<u64>,
    depth: Cell<usize>,
    debug: bool,
}

impl StringContext {
    fn new(source: &str, token_ids: SharedSymbolMap, debug: bool) -> StringContext {
        let bytes = source.as_bytes().to_vec();
        let line_breaks = bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(i, _)| i)
            .collect();
        StringContext {
            source: bytes,
            line_breaks,
            row_cursor: Cell::new(0),
            token_ids,
            arena: RefCell::new(TokenArena::new()),
            cursor: RefCell::new(PrefixCursor::default()),
            next_number: Cell::new(0),
            calls: Cell::new(0),
            errors: Cell::new(0),
            depth: Cell::new(0),
            debug,
        }
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn line_count(&self) -> usize {
        self.line_breaks.len() + 1
    }

    pub fn token_ids(&self) -> SharedSymbolMap {
        Rc::clone(&self.token_ids)
    }

    pub fn arena(&self) -> std::cell::Ref<'_, TokenArena> {
        self.arena.borrow()
    }

    pub fn arena_mut(&self) -> std::cell::RefMut<'_, TokenArena> {
        self.arena.borrow_mut()
    }

    /// Successful harness invocations so far.
    pub fn calls(&self) -> u64 {
        self.calls.get()
    }

    /// Failed harness invocations so far (pruned rules not included).
    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Row/column for a byte offset. The row cursor is nudged rather
    /// than searched; consecutive queries are near each other.
    pub fn position(&self, offset: usize) -> Position {
        let breaks = &self.line_breaks;
        let mut row = self.row_cursor.get().min(breaks.len());
        while row < breaks.len() && offset > breaks[row] {
            row += 1;
        }
        while row > 0 && offset <= breaks[row - 1] {
            row -= 1;
        }
        self.row_cursor.set(row);
        let line_start = if row == 0 { 0 } else { breaks[row - 1] + 1 };
        Position { offset, row, column: offset - line_start }
    }

    fn new_token(&self, id: crate::set::SymbolId, ignore: bool, from: usize, to: usize) -> TokenRef {
        let from = self.position(from);
        let to = self.position(to);
        let number = self.next_number.get();
        self.next_number.set(number + 1);
        self.arena.borrow_mut().alloc(id, number, ignore, from, to)
    }
}

/// Tokenizing-stage parse state.
#[derive(Debug, Clone)]
pub struct StringState {
    pub pos: usize,
    indents: Vec<Vec<u8>>,
    ctx: Rc<StringContext>,
}

impl StringState {
    pub fn new(source: &str, token_ids: SharedSymbolMap, debug: bool) -> StringState {
        StringState {
            pos: 0,
            indents: vec![Vec::new()],
            ctx: Rc::new(StringContext::new(source, token_ids, debug)),
        }
    }

    pub fn context(&self) -> Rc<StringContext> {
        Rc::clone(&self.ctx)
    }

    /// Remaining input from the current position.
    pub fn rest(&self) -> &[u8] {
        &self.ctx.source[self.pos.min(self.ctx.source.len())..]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.ctx.source.len()
    }

    fn advanced(&self, by: usize) -> StringState {
        let mut next = self.clone();
        next.pos = (self.pos + by).min(self.ctx.source.len());
        next
    }
}

impl ParseState for StringState {
    type Handle = TokenRef;

    fn ast_mark(&self) -> usize {
        0
    }

    // AST construction belongs to the token-parsing stage; wrappers in
    // a tokenizer grammar are inert here.
    fn push_ast_node(&mut self, _node: AstNode, _mark: usize) -> Result<(), ParseError> {
        Ok(())
    }

    fn push_ast_property(&mut self, _property: AstProperty, _mark: usize) -> Result<(), ParseError> {
        Ok(())
    }

    fn chain_text(&self, head: TokenRef) -> String {
        let arena = self.ctx.arena.borrow();
        let token = arena.get(head);
        let bytes = &self.ctx.source[token.from.offset..token.to.offset];
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn append_chain(&self, chain: Chain<TokenRef>, next: Chain<TokenRef>) {
        self.ctx.arena.borrow_mut().append(chain.tail, next.head);
    }

    fn sever(&self, head: TokenRef) {
        self.ctx.arena.borrow_mut().sever(head);
    }
}

/// Stage plugin for the byte-level tokenizer.
pub struct StringStage {
    token_ids: SharedSymbolMap,
    prefix_ids: SharedSymbolMap,
    trie: Option<Rc<PrefixTrie>>,
}

impl StringStage {
    /// `token_ids` is shared with the token-parsing stage so both
    /// stages agree on token type ids.
    pub fn new(token_ids: SharedSymbolMap) -> StringStage {
        StringStage {
            token_ids,
            prefix_ids: crate::set::SymbolMap::shared(),
            trie: None,
        }
    }

    fn compile_literal(&self, text: &str) -> Result<(ParserFn<StringState>, LeafInfo), CompileError> {
        let literal = unescape_literal(text);
        if literal.is_empty() {
            return Err(CompileError::EmptyLiteral);
        }
        let len = literal.len();
        // The harness already proved the literal is present via the
        // prefix cursor; the parser itself only advances.
        let parser: ParserFn<StringState> =
            Rc::new(move |state: &StringState| Ok(Success { state: state.advanced(len), token: None }));
        Ok((parser, LeafInfo { name: literal, emit: true }))
    }

    fn compile_regex(&self, pattern: &str) -> Result<(ParserFn<StringState>, LeafInfo), CompileError> {
        let anchored = format!("(?s)^(?:{})", pattern);
        let regex = Regex::new(&anchored).map_err(|e| CompileError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let no_match = ParseError::NoMatch(format!("regex '{}' did not match", pattern));
        let parser: ParserFn<StringState> = Rc::new(move |state: &StringState| {
            match regex.find(state.rest()) {
                Some(found) if found.end() > 0 => {
                    Ok(Success { state: state.advanced(found.end()), token: None })
                }
                _ => Err(no_match.clone()),
            }
        });
        Ok((parser, LeafInfo { name: "regex".to_string(), emit: true }))
    }

    fn compile_eof(&self) -> (ParserFn<StringState>, LeafInfo) {
        let parser: ParserFn<StringState> = Rc::new(|state: &StringState| {
            if state.at_end() {
                Ok(Success { state: state.clone(), token: None })
            } else {
                Err(ParseError::NotAtEnd)
            }
        });
        (parser, LeafInfo { name: "eof".to_string(), emit: true })
    }

    /// Indentation leaf. Reads the whitespace run at the position and
    /// compares it against the indentation stack:
    ///
    /// * equal to the current level: one ignorable `current_indent`;
    /// * a strict extension: `current_indent` plus an `indent` token
    ///   covering the new suffix, and the level is pushed;
    /// * otherwise the run must equal an enclosing level, yielding one
    ///   `dedent` per popped level; anything else is a dedentation
    ///   mismatch.
    fn compile_indent(&mut self) -> (ParserFn<StringState>, LeafInfo) {
        let (indent_id, dedent_id, current_id) = {
            let mut ids = self.token_ids.borrow_mut();
            (
                ids.get_or_add(&Symbol::name("indent")),
                ids.get_or_add(&Symbol::name("dedent")),
                ids.get_or_add(&Symbol::name("current_indent")),
            )
        };
        let parser: ParserFn<StringState> = Rc::new(move |state: &StringState| {
            let source = state.ctx.source();
            let mut end = state.pos;
            while end < source.len() && (source[end] == b' ' || source[end] == b'\t') {
                end += 1;
            }
            let run = &source[state.pos..end];
            let current: &[u8] = match state.indents.last() {
                Some(level) => level,
                None => &[],
            };

            if run == current {
                let token = state.ctx.new_token(current_id, true, state.pos, end);
                let mut next = state.clone();
                next.pos = end;
                return Ok(Success { state: next, token: Some(Chain::single(token)) });
            }

            if run.len() > current.len() && run[..current.len()] == *current {
                let boundary = state.pos + current.len();
                let kept = state.ctx.new_token(current_id, true, state.pos, boundary);
                let opened = state.ctx.new_token(indent_id, false, boundary, end);
                state.ctx.arena.borrow_mut().append(kept, opened);
                let mut next = state.clone();
                next.pos = end;
                next.indents.push(run.to_vec());
                return Ok(Success {
                    state: next,
                    token: Some(Chain { head: kept, tail: opened }),
                });
            }

            // Dedentation: the run must be one of the enclosing levels.
            let enclosing = &state.indents[..state.indents.len().saturating_sub(1)];
            let matched = enclosing.iter().rposition(|level| level.as_slice() == run);
            let index = match matched {
                Some(index) => index,
                None => return Err(ParseError::DedentationMismatch),
            };
            let pops = enclosing.len() - index;
            let mut chain: Option<Chain<TokenRef>> = None;
            {
                let mut last: Option<TokenRef> = None;
                for _ in 0..pops {
                    let token = state.ctx.new_token(dedent_id, false, state.pos, state.pos);
                    if let Some(prev) = last {
                        state.ctx.arena.borrow_mut().append(prev, token);
                    }
                    match &mut chain {
                        Some(c) => c.tail = token,
                        None => chain = Some(Chain::single(token)),
                    }
                    last = Some(token);
                }
                let closed = state.ctx.new_token(current_id, true, state.pos, end);
                if let Some(prev) = last {
                    state.ctx.arena.borrow_mut().append(prev, closed);
                }
                match &mut chain {
                    Some(c) => c.tail = closed,
                    None => chain = Some(Chain::single(closed)),
                }
            }
            let mut next = state.clone();
            next.pos = end;
            next.indents.truncate(index + 1);
            Ok(Success { state: next, token: chain })
        });
        (parser, LeafInfo { name: "$indent".to_string(), emit: false })
    }
}

impl crate::compiler::PrefixDomain for StringStage {
    type Set = HashSymbolSet;

    fn empty_set(&self) -> HashSymbolSet {
        HashSymbolSet::new()
    }

    fn leaf_set(&self, leaf: &Leaf) -> HashSymbolSet {
        let mut set = HashSymbolSet::new();
        match leaf {
            Leaf::Literal(text) => set.add(&Symbol::name(&unescape_literal(text))),
            _ => set.add(&Symbol::Unknown),
        }
        set
    }

    fn name_set(&self, name: &str) -> HashSymbolSet {
        let mut set = HashSymbolSet::new();
        set.add(&Symbol::name(&unescape_literal(name)));
        set
    }
}

impl StagePlugin for StringStage {
    type State = StringState;

    fn fallback_leaf(&self, name: &str) -> Option<Leaf> {
        // A bare unresolved name in a tokenizer grammar is the literal
        // itself.
        Some(Leaf::Literal(name.to_string()))
    }

    fn prepare(&mut self, start_symbols: &HashSymbolSet) -> Result<(), CompileError> {
        let mut literals: Vec<String> = start_symbols
            .symbols()
            .into_iter()
            .filter_map(|symbol| match symbol {
                Symbol::Name(text) => Some(text),
                _ => None,
            })
            .collect();
        literals.sort();
        let mut ids = self.prefix_ids.borrow_mut();
        let pairs: Vec<(String, crate::set::SymbolId)> = literals
            .into_iter()
            .map(|text| {
                let id = ids.get_or_add(&Symbol::name(&text));
                (text, id)
            })
            .collect();
        self.trie = Some(Rc::new(PrefixTrie::build(
            pairs.iter().map(|(text, id)| (text.as_str(), *id)),
        )));
        Ok(())
    }

    fn compile_leaf(&mut self, leaf: &Leaf) -> Result<(ParserFn<StringState>, LeafInfo), CompileError> {
        match leaf {
            Leaf::Literal(text) => self.compile_literal(text),
            Leaf::Regex(pattern) => self.compile_regex(pattern),
            Leaf::Eof => Ok(self.compile_eof()),
            Leaf::Indent => Ok(self.compile_indent()),
            Leaf::Token(name) => Err(CompileError::InvalidShape(format!(
                "token rule '{}' is not available in the tokenizing stage",
                name
            ))),
        }
    }

    fn wrap(
        &mut self,
        inner: ParserFn<StringState>,
        name: &str,
        prefixes: &HashSymbolSet,
        emit: bool,
        _memo: Option<crate::compiler::FingerprintId>,
    ) -> ParserFn<StringState> {
        let ignore = name.starts_with("__");
        let pruning_off = prefixes.contains(&Symbol::Unknown)
            || prefixes.contains(&Symbol::Nullable)
            || prefixes.is_empty();
        let prefix_bits = if pruning_off {
            None
        } else {
            let mut bits = BitSet::new(Rc::clone(&self.prefix_ids));
            for symbol in prefixes.symbols() {
                if let Symbol::Name(_) = symbol {
                    bits.add(&symbol);
                }
            }
            Some(bits)
        };
        let trie = self.trie.clone();
        let emit_id = if emit {
            Some(self.token_ids.borrow_mut().get_or_add(&Symbol::name(name)))
        } else {
            None
        };
        let pruned = ParseError::CannotProceed(name.to_string());
        let name = name.to_string();

        Rc::new(move |state: &StringState| {
            let ctx = &state.ctx;
            if let (Some(bits), Some(trie)) = (&prefix_bits, &trie) {
                let possible = {
                    let mut cursor = ctx.cursor.borrow_mut();
                    if cursor.pos != Some(state.pos) {
                        let mut set = BitSet::new(bits.map());
                        trie.collect_at(ctx.source(), state.pos, &mut set);
                        cursor.pos = Some(state.pos);
                        cursor.set = Some(set);
                    }
                    match &cursor.set {
                        Some(set) => set.intersects(bits),
                        None => Ok(false),
                    }
                };
                match possible {
                    Ok(true) => {}
                    Ok(false) => return Err(pruned.clone()),
                    Err(e) => return Err(ParseError::Set(e)),
                }
            }

            if ctx.debug {
                eprintln!("{}> {} @{}", "  ".repeat(ctx.depth.get()), name, state.pos);
            }
            ctx.depth.set(ctx.depth.get() + 1);
            let result = inner(state);
            ctx.depth.set(ctx.depth.get().saturating_sub(1));

            match result {
                Err(e) => {
                    ctx.errors.set(ctx.errors.get() + 1);
                    if ctx.debug {
                        eprintln!("{}x {}: {}", "  ".repeat(ctx.depth.get()), name, e);
                    }
                    Err(e)
                }
                Ok(success) => {
                    ctx.calls.set(ctx.calls.get() + 1);
                    if ctx.debug {
                        eprintln!(
                            "{}= {} @{}..{}",
                            "  ".repeat(ctx.depth.get()),
                            name,
                            state.pos,
                            success.state.pos
                        );
                    }
                    match emit_id {
                        None => Ok(success),
                        Some(id) => {
                            let token = ctx.new_token(id, ignore, state.pos, success.state.pos);
                            if let Some(chain) = success.token {
                                ctx.arena.borrow_mut().adopt(token, chain.head);
                            }
                            Ok(Success { state: success.state, token: Some(Chain::single(token)) })
                        }
                    }
                }
            }
        })
    }
}
