//! Compiles grammar rules into parser closures.
//!
//! The compiler is generic over a [`StagePlugin`] that supplies the
//! stage-specific pieces: how leaves parse, which symbol domain prefix
//! analysis runs over, and the harness that wraps every compiled rule
//! with pruning, counting, and token emission. Control combinators
//! (sequence, `$or`, `$and`, `$not`, `$optional`, `$repeat`) and the
//! AST wrappers are stage-independent and live here.
//!
//! Parsers are pure with respect to their input state: they take a
//! borrowed state and return a fresh one only on success, so a failed
//! branch can never leak position, indentation, or AST effects into
//! its caller. Alternation is plain first-match-wins over that
//! contract.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ast::{AstNode, AstProperty, PropertyValue};
use crate::error::{CompileError, ParseError};
use crate::grammar::{Grammar, Leaf, Rule};
use crate::set::SetOps;

pub mod prefix;

pub use prefix::{first_set, PrefixDomain};

/// A compiled parser. Takes the current state by reference and returns
/// a new state (plus any emitted token chain) only on success.
pub type ParserFn<S> = Rc<dyn Fn(&S) -> ParseResult<S>>;

pub type ParseResult<S> = Result<Success<S>, ParseError>;

/// A successful match: the advanced state and the chain of tokens the
/// rule emitted, if any.
pub struct Success<S: ParseState> {
    pub state: S,
    pub token: Option<Chain<S::Handle>>,
}

/// Head and tail of a forward-linked token chain, kept together so
/// appending is O(1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chain<H> {
    pub head: H,
    pub tail: H,
}

impl<H: Copy> Chain<H> {
    pub fn single(handle: H) -> Chain<H> {
        Chain { head: handle, tail: handle }
    }
}

/// Appends `next` to the chain under construction.
pub fn extend_chain<S: ParseState>(
    state: &S,
    chain: &mut Option<Chain<S::Handle>>,
    next: Chain<S::Handle>,
) {
    match chain {
        Some(current) => {
            state.append_chain(*current, next);
            current.tail = next.tail;
        }
        None => *chain = Some(next),
    }
}

/// State threaded through a stage's parsers. Cloning must be cheap:
/// positional fields are copied, everything heavy sits behind a shared
/// context.
pub trait ParseState: Clone + 'static {
    /// Handle to an emitted token in this stage's arena.
    type Handle: Copy + PartialEq + std::fmt::Debug + 'static;

    /// Current AST stack height; wrappers fold everything above it.
    fn ast_mark(&self) -> usize;
    fn push_ast_node(&mut self, node: AstNode, mark: usize) -> Result<(), ParseError>;
    fn push_ast_property(&mut self, property: AstProperty, mark: usize)
        -> Result<(), ParseError>;

    /// Source text covered by the token at `head`.
    fn chain_text(&self, head: Self::Handle) -> String;
    /// Links `next` after `chain` in the stage's arena.
    fn append_chain(&self, chain: Chain<Self::Handle>, next: Chain<Self::Handle>);
    /// Detaches the chain starting at `head` from the tree.
    fn sever(&self, head: Self::Handle);
}

/// Compile-time id for structurally identical rules.
pub type FingerprintId = u32;

/// Interns structural rule hashes to small ids. Computed once per rule
/// at compile time; the memo cache keys on these at parse time.
#[derive(Debug, Default)]
pub struct Fingerprints {
    ids: HashMap<u64, FingerprintId>,
}

impl Fingerprints {
    pub fn new() -> Fingerprints {
        Fingerprints::default()
    }

    pub fn id_of(&mut self, rule: &Rule) -> FingerprintId {
        let mut hasher = DefaultHasher::new();
        rule.hash(&mut hasher);
        let structural = hasher.finish();
        let next = self.ids.len() as FingerprintId;
        *self.ids.entry(structural).or_insert(next)
    }
}

/// What a stage reports about one of its leaves: the name its emitted
/// tokens carry and whether the harness should emit at all.
pub struct LeafInfo {
    pub name: String,
    pub emit: bool,
}

/// The stage-specific half of the compiler.
pub trait StagePlugin: PrefixDomain {
    type State: ParseState;

    /// Leaf a bare, otherwise-unresolved rule name falls back to.
    fn fallback_leaf(&self, name: &str) -> Option<Leaf>;

    /// Called once before rule compilation with the first-symbol set of
    /// the whole grammar (full traversal, not first-only). The
    /// tokenizing stage builds its literal trie from this.
    fn prepare(&mut self, start_symbols: &Self::Set) -> Result<(), CompileError>;

    fn compile_leaf(&mut self, leaf: &Leaf)
        -> Result<(ParserFn<Self::State>, LeafInfo), CompileError>;

    /// Wraps a compiled rule body with the stage harness: prefix
    /// pruning, call counting, debug tracing, token emission, and
    /// (token stage, when `memo` is set) outcome memoization.
    fn wrap(
        &mut self,
        inner: ParserFn<Self::State>,
        name: &str,
        prefixes: &Self::Set,
        emit: bool,
        memo: Option<FingerprintId>,
    ) -> ParserFn<Self::State>;
}

/// A compiled stage: the start parser plus the analyzer's per-rule
/// first-symbol record for diagnostics.
pub struct Compiled<S: ParseState> {
    pub parser: ParserFn<S>,
    pub rule_prefixes: BTreeMap<String, Vec<String>>,
}

/// Compiles `grammar` against a stage plugin, starting from `start`.
pub fn compile_stage<P: StagePlugin>(
    grammar: &Grammar,
    plugin: &mut P,
) -> Result<Compiled<P::State>, CompileError> {
    if !grammar.has_start() {
        return Err(CompileError::MissingStart);
    }
    let start = Rule::Ref("start".to_string());
    let mut visited = HashSet::new();
    let start_symbols = first_set(grammar, plugin, &start, &mut visited, false)?;
    plugin.prepare(&start_symbols)?;

    let mut compiler = Compiler {
        grammar,
        plugin,
        slots: HashMap::new(),
        rule_prefixes: BTreeMap::new(),
        fingerprints: Fingerprints::new(),
    };
    let parser = compiler.compile_rule(&start)?;
    Ok(Compiled { parser, rule_prefixes: compiler.rule_prefixes })
}

type Slot<S> = Rc<std::cell::RefCell<Option<ParserFn<S>>>>;

struct Compiler<'a, P: StagePlugin> {
    grammar: &'a Grammar,
    plugin: &'a mut P,
    /// Pre-registered parser slots; recursive references read through
    /// these, so a rule can mention itself before its body is built.
    slots: HashMap<String, Slot<P::State>>,
    rule_prefixes: BTreeMap<String, Vec<String>>,
    fingerprints: Fingerprints,
}

impl<'a, P: StagePlugin> Compiler<'a, P> {
    fn compile_rule(&mut self, rule: &Rule) -> Result<ParserFn<P::State>, CompileError> {
        match rule {
            Rule::Ref(name) => self.compile_reference(name),
            Rule::Sequence(items) => {
                let parsers = self.compile_all(items)?;
                let body = sequence_parser(parsers);
                self.wrap_control(body, "seq", rule)
            }
            Rule::Or(branches) => {
                let parsers = self.compile_all(branches)?;
                let body = or_parser(parsers);
                self.wrap_control(body, "or", rule)
            }
            Rule::And(sub) => {
                let parser = self.compile_rule(sub)?;
                let body = and_parser(parser);
                self.wrap_control(body, "and", rule)
            }
            Rule::Not(sub) => {
                let parser = self.compile_rule(sub)?;
                let body = not_parser(parser);
                self.wrap_control(body, "not", rule)
            }
            Rule::Optional(sub) => {
                let parser = self.compile_rule(sub)?;
                let body = optional_parser(parser);
                self.wrap_control(body, "optional", rule)
            }
            Rule::Repeat(sub) => {
                let parser = self.compile_rule(sub)?;
                let body = repeat_parser(parser);
                self.wrap_control(body, "repeat", rule)
            }
            Rule::AstNode { node_type, value } => {
                let parser = self.compile_rule(value)?;
                Ok(ast_node_parser(parser, node_type.clone()))
            }
            Rule::AstProperty { name, as_list, as_literal, value } => {
                let parser = self.compile_rule(value)?;
                Ok(ast_property_parser(parser, name.clone(), *as_list, *as_literal))
            }
            Rule::Leaf(leaf) => self.compile_leaf(leaf),
        }
    }

    fn compile_all(&mut self, rules: &[Rule]) -> Result<Vec<ParserFn<P::State>>, CompileError> {
        rules.iter().map(|r| self.compile_rule(r)).collect()
    }

    fn compile_reference(&mut self, name: &str) -> Result<ParserFn<P::State>, CompileError> {
        if let Some(slot) = self.slots.get(name) {
            return Ok(slot_parser(Rc::clone(slot)));
        }
        let grammar = self.grammar;
        if let Some(definition) = grammar.rules.get(name) {
            let slot: Slot<P::State> = Rc::new(std::cell::RefCell::new(None));
            self.slots.insert(name.to_string(), Rc::clone(&slot));

            let inner = self.compile_rule(definition)?;
            let mut visited = HashSet::new();
            let prefixes = first_set(grammar, &*self.plugin, definition, &mut visited, true)?;
            self.rule_prefixes.insert(
                name.to_string(),
                prefixes.symbols().iter().map(|s| s.to_string()).collect(),
            );
            let memo = if grammar.memoize.contains(name) {
                Some(self.fingerprints.id_of(definition))
            } else {
                None
            };
            let wrapped = self.plugin.wrap(inner, name, &prefixes, true, memo);
            *slot.borrow_mut() = Some(Rc::clone(&wrapped));
            return Ok(wrapped);
        }
        match self.plugin.fallback_leaf(name) {
            Some(leaf) => self.compile_leaf(&leaf),
            None => Err(CompileError::UnknownRule(name.to_string())),
        }
    }

    fn compile_leaf(&mut self, leaf: &Leaf) -> Result<ParserFn<P::State>, CompileError> {
        let (inner, info) = self.plugin.compile_leaf(leaf)?;
        let rule = Rule::Leaf(leaf.clone());
        let mut visited = HashSet::new();
        let prefixes = first_set(self.grammar, &*self.plugin, &rule, &mut visited, true)?;
        Ok(self.plugin.wrap(inner, &info.name, &prefixes, info.emit, None))
    }

    fn wrap_control(
        &mut self,
        body: ParserFn<P::State>,
        name: &str,
        rule: &Rule,
    ) -> Result<ParserFn<P::State>, CompileError> {
        let mut visited = HashSet::new();
        let prefixes = first_set(self.grammar, &*self.plugin, rule, &mut visited, true)?;
        Ok(self.plugin.wrap(body, name, &prefixes, false, None))
    }
}

fn slot_parser<S: ParseState>(slot: Slot<S>) -> ParserFn<S> {
    Rc::new(move |state: &S| {
        let parser = slot.borrow().clone();
        match parser {
            Some(p) => p(state),
            None => Err(ParseError::NoMatch("rule referenced before compilation".to_string())),
        }
    })
}

fn sequence_parser<S: ParseState>(parsers: Vec<ParserFn<S>>) -> ParserFn<S> {
    Rc::new(move |state: &S| {
        let mut current = state.clone();
        let mut chain = None;
        for parser in &parsers {
            match parser(&current) {
                Ok(success) => {
                    current = success.state;
                    if let Some(emitted) = success.token {
                        extend_chain(&current, &mut chain, emitted);
                    }
                }
                Err(e) => {
                    if let Some(built) = chain {
                        current.sever(built.head);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Success { state: current, token: chain })
    })
}

fn or_parser<S: ParseState>(parsers: Vec<ParserFn<S>>) -> ParserFn<S> {
    Rc::new(move |state: &S| {
        for parser in &parsers {
            if let Ok(success) = parser(state) {
                return Ok(success);
            }
        }
        Err(ParseError::NoAlternative)
    })
}

fn and_parser<S: ParseState>(parser: ParserFn<S>) -> ParserFn<S> {
    Rc::new(move |state: &S| match parser(state) {
        Ok(_) => Ok(Success { state: state.clone(), token: None }),
        Err(e) => Err(e),
    })
}

fn not_parser<S: ParseState>(parser: ParserFn<S>) -> ParserFn<S> {
    Rc::new(move |state: &S| match parser(state) {
        Ok(_) => Err(ParseError::NotMatched),
        Err(_) => Ok(Success { state: state.clone(), token: None }),
    })
}

fn optional_parser<S: ParseState>(parser: ParserFn<S>) -> ParserFn<S> {
    Rc::new(move |state: &S| match parser(state) {
        Ok(success) => Ok(success),
        Err(_) => Ok(Success { state: state.clone(), token: None }),
    })
}

fn repeat_parser<S: ParseState>(parser: ParserFn<S>) -> ParserFn<S> {
    Rc::new(move |state: &S| {
        let mut current = state.clone();
        let mut chain = None;
        let mut matched = false;
        while let Ok(success) = parser(&current) {
            current = success.state;
            if let Some(emitted) = success.token {
                extend_chain(&current, &mut chain, emitted);
            }
            matched = true;
        }
        if !matched {
            return Err(ParseError::RepeatDidNotMatch);
        }
        Ok(Success { state: current, token: chain })
    })
}

fn ast_node_parser<S: ParseState>(parser: ParserFn<S>, node_type: String) -> ParserFn<S> {
    Rc::new(move |state: &S| {
        let mark = state.ast_mark();
        let mut success = parser(state)?;
        success.state.push_ast_node(AstNode::new(&node_type), mark)?;
        Ok(success)
    })
}

fn ast_property_parser<S: ParseState>(
    parser: ParserFn<S>,
    name: String,
    as_list: bool,
    as_literal: bool,
) -> ParserFn<S> {
    Rc::new(move |state: &S| {
        let mark = state.ast_mark();
        let mut success = parser(state)?;
        let value = if as_literal {
            let text = match success.token {
                Some(chain) => success.state.chain_text(chain.head),
                None => String::new(),
            };
            PropertyValue::Text(text)
        } else {
            PropertyValue::Pending
        };
        let property = AstProperty { name: name.clone(), as_list, value };
        success.state.push_ast_property(property, mark)?;
        Ok(success)
    })
}
