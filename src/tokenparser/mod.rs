//! Token-level parsing stage.
//!
//! Runs the main grammar over the token tree the tokenizing stage
//! produced. Leaves are token-type matches; a bare unresolved rule
//! name means "a token of that type". Matching descends into token
//! children when the current token's type does not fit, so grammars
//! can address nested emissions directly. Named rules emit
//! second-level tokens into their own arena, and `$ast-node` /
//! `$ast-prop` wrappers fold the AST stack carried by the state.
//!
//! Rules listed under the grammar's `memoize` key get outcome
//! memoization: the harness records the result of the first attempt
//! (success or failure) keyed by the current token's sequence number
//! and the rule's structural fingerprint, and replays it on every
//! later attempt at the same token without re-running the body.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::ast::{self, AstNode, AstProperty, AstValue};
use crate::compiler::{Chain, FingerprintId, LeafInfo, ParseState, ParserFn, StagePlugin, Success};
use crate::error::{CompileError, ParseError};
use crate::grammar::Leaf;
use crate::set::{BitSet, SetOps, SharedSymbolMap, Symbol, SymbolId};
use crate::tokenizer::{StringContext, TokenRef};

/// Handle to a second-level token in an [`L2Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Ref(u32);

/// A second-level token: a named span over the low-level stream.
/// `from` is the first low-level token covered, `to` the first one
/// after the span (`None` when the span reaches the end).
#[derive(Debug, Clone)]
pub struct L2Data {
    pub type_name: String,
    pub ignore: bool,
    pub from: Option<TokenRef>,
    pub to: Option<TokenRef>,
    pub next: Option<L2Ref>,
    pub parent: Option<L2Ref>,
    pub children: Option<L2Ref>,
    pub first: Option<L2Ref>,
    pub last: Option<L2Ref>,
}

#[derive(Debug, Default)]
pub struct L2Arena {
    nodes: Vec<L2Data>,
}

impl L2Arena {
    pub fn new() -> L2Arena {
        L2Arena::default()
    }

    pub fn alloc(&mut self, type_name: &str, from: Option<TokenRef>, to: Option<TokenRef>) -> L2Ref {
        let handle = L2Ref(self.nodes.len() as u32);
        self.nodes.push(L2Data {
            type_name: type_name.to_string(),
            ignore: type_name.starts_with("__"),
            from,
            to,
            next: None,
            parent: None,
            children: None,
            first: Some(handle),
            last: Some(handle),
        });
        handle
    }

    pub fn get(&self, handle: L2Ref) -> &L2Data {
        &self.nodes[handle.0 as usize]
    }

    pub fn get_mut(&mut self, handle: L2Ref) -> &mut L2Data {
        &mut self.nodes[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Links `next` after the chain `head..tail`; head/tail shortcuts
    /// are kept on the chain ends.
    pub fn append(&mut self, chain: Chain<L2Ref>, next: Chain<L2Ref>) {
        self.get_mut(chain.tail).next = Some(next.head);
        self.get_mut(chain.head).last = Some(next.tail);
        self.get_mut(next.head).first = Some(chain.head);
    }

    /// Detaches the chain starting at `head`.
    pub fn sever(&mut self, head: L2Ref) {
        let mut current = Some(head);
        while let Some(handle) = current {
            let node = self.get_mut(handle);
            let next = node.next.take();
            node.parent = None;
            node.last = None;
            current = next;
        }
    }

    /// Makes `head`'s chain the children of `parent`.
    pub fn adopt(&mut self, parent: L2Ref, head: L2Ref) {
        self.get_mut(parent).children = Some(head);
        let mut current = Some(head);
        while let Some(handle) = current {
            self.get_mut(handle).parent = Some(parent);
            current = self.get(handle).next;
        }
    }
}

/// Renders a second-level token tree as an indented listing.
pub fn format_l2_tree(arena: &L2Arena, head: L2Ref) -> String {
    let mut out = String::new();
    format_level(arena, head, 0, &mut out);
    out
}

fn format_level(arena: &L2Arena, head: L2Ref, level: usize, out: &mut String) {
    let mut current = Some(head);
    while let Some(handle) = current {
        let node = arena.get(handle);
        let _ = writeln!(
            out,
            "{}{}{}",
            "  ".repeat(level),
            node.type_name,
            if node.ignore { " (ignored)" } else { "" }
        );
        if let Some(child) = node.children {
            format_level(arena, child, level + 1, out);
        }
        current = node.next;
    }
}

/// A memoized outcome: everything needed to reproduce the harness
/// result without running the rule body again.
#[derive(Debug, Clone)]
struct Outcome {
    current: Option<TokenRef>,
    ast_stack: Vec<AstValue>,
    token: Option<Chain<L2Ref>>,
    error: Option<ParseError>,
}

/// Shared, interior-mutable side of the token-parsing stage.
#[derive(Debug)]
pub struct TokenContext {
    string: Rc<StringContext>,
    l2: RefCell<L2Arena>,
    outcomes: RefCell<HashMap<(u32, FingerprintId), Outcome>>,
    calls: Cell<u64>,
    errors: Cell<u64>,
    depth: Cell<usize>,
    debug: bool,
}

impl TokenContext {
    pub fn string_context(&self) -> Rc<StringContext> {
        Rc::clone(&self.string)
    }

    pub fn l2(&self) -> std::cell::Ref<'_, L2Arena> {
        self.l2.borrow()
    }

    /// Completed harness invocations (replays not included).
    pub fn calls(&self) -> u64 {
        self.calls.get()
    }

    pub fn errors(&self) -> u64 {
        self.errors.get()
    }
}

/// Token-parsing stage state: the current low-level token plus the
/// AST stack. Cloning copies the handle and the stack; the arenas and
/// caches are shared through the context.
#[derive(Debug, Clone)]
pub struct TokenState {
    current: Option<TokenRef>,
    ast_stack: Vec<AstValue>,
    ctx: Rc<TokenContext>,
}

impl TokenState {
    pub fn new(head: Option<TokenRef>, string: Rc<StringContext>, debug: bool) -> TokenState {
        TokenState {
            current: head,
            ast_stack: Vec::new(),
            ctx: Rc::new(TokenContext {
                string,
                l2: RefCell::new(L2Arena::new()),
                outcomes: RefCell::new(HashMap::new()),
                calls: Cell::new(0),
                errors: Cell::new(0),
                depth: Cell::new(0),
                debug,
            }),
        }
    }

    pub fn context(&self) -> Rc<TokenContext> {
        Rc::clone(&self.ctx)
    }

    /// The next unconsumed, non-ignorable token.
    pub fn current(&self) -> Option<TokenRef> {
        self.ctx.string.arena().skip_ignored(self.current)
    }

    /// Nodes left on the AST stack after parsing.
    pub fn ast_nodes(&self) -> Vec<AstNode> {
        self.ast_stack
            .iter()
            .filter_map(|value| match value {
                AstValue::Node(node) => Some(node.clone()),
                AstValue::Property(_) => None,
            })
            .collect()
    }

    /// Finds a token of type `token_id` at the current position,
    /// descending into children until the type fits.
    fn get(&self, token_id: SymbolId) -> Option<TokenRef> {
        let arena = self.ctx.string.arena();
        let mut current = arena.skip_ignored(self.current)?;
        loop {
            if arena.get(current).id == token_id {
                return Some(current);
            }
            let child = arena.get(current).children?;
            current = arena.skip_ignored(Some(child))?;
        }
    }

    /// Steps past `matched` along the document-order chain. Ignorables
    /// are skipped lazily on every read, not here, so an emitted span's
    /// `to` stays on the first token after the match.
    fn advance_past(&mut self, matched: TokenRef) {
        self.current = self.ctx.string.arena().get(matched).next;
    }
}

impl ParseState for TokenState {
    type Handle = L2Ref;

    fn ast_mark(&self) -> usize {
        self.ast_stack.len()
    }

    fn push_ast_node(&mut self, node: AstNode, mark: usize) -> Result<(), ParseError> {
        ast::push_node(&mut self.ast_stack, mark, node)
    }

    fn push_ast_property(&mut self, property: AstProperty, mark: usize) -> Result<(), ParseError> {
        ast::push_property(&mut self.ast_stack, mark, property)
    }

    fn chain_text(&self, head: L2Ref) -> String {
        let l2 = self.ctx.l2.borrow();
        let node = l2.get(head);
        let from = match node.from {
            Some(from) => from,
            None => return String::new(),
        };
        let arena = self.ctx.string.arena();
        let source = self.ctx.string.source();
        let start = arena.get(from).from.offset;
        let end = match node.to {
            Some(to) => arena.get(to).from.offset,
            // The span reaches the end of the stream.
            None => source.len(),
        };
        String::from_utf8_lossy(&source[start..end]).into_owned()
    }

    fn append_chain(&self, chain: Chain<L2Ref>, next: Chain<L2Ref>) {
        self.ctx.l2.borrow_mut().append(chain, next);
    }

    fn sever(&self, head: L2Ref) {
        self.ctx.l2.borrow_mut().sever(head);
    }
}

/// First token a rule starting at `current` could actually consume:
/// ignorables are skipped and wrapper tokens are descended, so the
/// resulting span excludes leading ignorable content.
fn span_start(arena: &crate::tokenizer::TokenArena, current: Option<TokenRef>) -> Option<TokenRef> {
    let mut current = arena.skip_ignored(current)?;
    while let Some(child) = arena.get(current).children {
        match arena.skip_ignored(Some(child)) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    Some(current)
}

fn can_proceed(prefixes: &BitSet, state: &TokenState) -> bool {
    let arena = state.ctx.string.arena();
    let mut current = match arena.skip_ignored(state.current) {
        Some(handle) => handle,
        None => return false,
    };
    loop {
        if prefixes.contains_id(arena.get(current).id) {
            return true;
        }
        let child = match arena.get(current).children {
            Some(child) => child,
            None => return false,
        };
        current = match arena.skip_ignored(Some(child)) {
            Some(handle) => handle,
            None => return false,
        };
    }
}

/// Stage plugin for the token-level parser.
pub struct TokenStage {
    token_ids: SharedSymbolMap,
}

impl TokenStage {
    /// `token_ids` must be the map the tokenizing stage emitted its
    /// tokens under, so type names resolve to the same ids.
    pub fn new(token_ids: SharedSymbolMap) -> TokenStage {
        {
            let mut ids = token_ids.borrow_mut();
            ids.get_or_add(&Symbol::Unknown);
            ids.get_or_add(&Symbol::Nullable);
        }
        TokenStage { token_ids }
    }
}

impl crate::compiler::PrefixDomain for TokenStage {
    type Set = BitSet;

    fn empty_set(&self) -> BitSet {
        BitSet::new(Rc::clone(&self.token_ids))
    }

    fn leaf_set(&self, leaf: &Leaf) -> BitSet {
        let mut set = self.empty_set();
        match leaf {
            Leaf::Token(name) => set.add(&Symbol::name(name)),
            _ => set.add(&Symbol::Unknown),
        }
        set
    }

    fn name_set(&self, name: &str) -> BitSet {
        let mut set = self.empty_set();
        set.add(&Symbol::name(name));
        set
    }
}

impl StagePlugin for TokenStage {
    type State = TokenState;

    fn fallback_leaf(&self, name: &str) -> Option<Leaf> {
        // A bare unresolved name in the main grammar is a token type.
        Some(Leaf::Token(name.to_string()))
    }

    fn prepare(&mut self, _start_symbols: &BitSet) -> Result<(), CompileError> {
        Ok(())
    }

    fn compile_leaf(&mut self, leaf: &Leaf) -> Result<(ParserFn<TokenState>, LeafInfo), CompileError> {
        let name = match leaf {
            Leaf::Token(name) => name.clone(),
            other => {
                return Err(CompileError::InvalidShape(format!(
                    "{:?} is not available in the token-parsing stage",
                    other
                )));
            }
        };
        let token_id = self.token_ids.borrow_mut().get_or_add(&Symbol::name(&name));
        let expected = ParseError::ExpectedToken(name.clone());
        let parser: ParserFn<TokenState> = Rc::new(move |state: &TokenState| {
            match state.get(token_id) {
                None => Err(expected.clone()),
                Some(matched) => {
                    let mut next = state.clone();
                    next.advance_past(matched);
                    Ok(Success { state: next, token: None })
                }
            }
        });
        Ok((parser, LeafInfo { name, emit: true }))
    }

    fn wrap(
        &mut self,
        inner: ParserFn<TokenState>,
        name: &str,
        prefixes: &BitSet,
        emit: bool,
        memo: Option<FingerprintId>,
    ) -> ParserFn<TokenState> {
        let emit = emit && !name.starts_with("__");
        let pruning_off = prefixes.contains(&Symbol::Unknown)
            || prefixes.contains(&Symbol::Nullable)
            || prefixes.is_empty();
        let bits = if pruning_off { None } else { Some(prefixes.clone()) };
        let pruned = ParseError::CannotProceed(name.to_string());
        let name = name.to_string();

        Rc::new(move |state: &TokenState| {
            let ctx = &state.ctx;
            if let Some(bits) = &bits {
                if !can_proceed(bits, state) {
                    return Err(pruned.clone());
                }
            }

            let memo_key = match (memo, state.current) {
                (Some(fingerprint), Some(token)) => {
                    let number = ctx.string.arena().get(token).number;
                    let key = (number, fingerprint);
                    let cached = ctx.outcomes.borrow().get(&key).cloned();
                    if let Some(outcome) = cached {
                        return match outcome.error {
                            Some(error) => Err(error),
                            None => Ok(Success {
                                state: TokenState {
                                    current: outcome.current,
                                    ast_stack: outcome.ast_stack,
                                    ctx: Rc::clone(ctx),
                                },
                                token: outcome.token,
                            }),
                        };
                    }
                    Some(key)
                }
                _ => None,
            };

            if ctx.debug {
                eprintln!("{}> {}", "  ".repeat(ctx.depth.get()), name);
            }
            ctx.depth.set(ctx.depth.get() + 1);
            let result = inner(state);
            ctx.depth.set(ctx.depth.get().saturating_sub(1));
            ctx.calls.set(ctx.calls.get() + 1);

            match result {
                Err(error) => {
                    ctx.errors.set(ctx.errors.get() + 1);
                    if ctx.debug {
                        eprintln!("{}x {}: {}", "  ".repeat(ctx.depth.get()), name, error);
                    }
                    if let Some(key) = memo_key {
                        let outcome = Outcome {
                            current: state.current,
                            ast_stack: state.ast_stack.clone(),
                            token: None,
                            error: Some(error.clone()),
                        };
                        ctx.outcomes.borrow_mut().entry(key).or_insert(outcome);
                    }
                    Err(error)
                }
                Ok(success) => {
                    if ctx.debug {
                        eprintln!("{}= {}", "  ".repeat(ctx.depth.get()), name);
                    }
                    let (final_state, token) = if emit {
                        let emitted = {
                            let from = span_start(&ctx.string.arena(), state.current);
                            let mut l2 = ctx.l2.borrow_mut();
                            let handle = l2.alloc(&name, from, success.state.current);
                            if let Some(chain) = success.token {
                                l2.adopt(handle, chain.head);
                            }
                            handle
                        };
                        (success.state, Some(Chain::single(emitted)))
                    } else {
                        (success.state, success.token)
                    };
                    if let Some(key) = memo_key {
                        let outcome = Outcome {
                            current: final_state.current,
                            ast_stack: final_state.ast_stack.clone(),
                            token,
                            error: None,
                        };
                        ctx.outcomes.borrow_mut().entry(key).or_insert(outcome);
                    }
                    Ok(Success { state: final_state, token })
                }
            }
        })
    }
}
