//! Symbol sets used by prefix analysis and pruning.
//!
//! The analyzer works over an abstract symbol domain: named symbols
//! (literal text in the tokenizing stage, token type names in the
//! token-parsing stage) plus two sentinels. `Unknown` stands for a rule
//! whose first input cannot be predicted, `Nullable` for a rule that
//! can match empty input. Either sentinel in a first-symbol set
//! disables pruning for the rule that owns it.
//!
//! Two implementations back the same contract: a dense [`BitSet`] over
//! a shared [`SymbolMap`] (hot path, O(words) operations) and a
//! [`HashSymbolSet`] for map-free analysis domains.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::error::SetError;

/// An element of the prefix-analysis domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// A concrete named symbol.
    Name(String),
    /// The rule's first input cannot be predicted.
    Unknown,
    /// The rule can match empty input.
    Nullable,
}

impl Symbol {
    pub fn name(text: &str) -> Symbol {
        Symbol::Name(text.to_string())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Name(s) => write!(f, "{}", s),
            Symbol::Unknown => write!(f, "(unknown)"),
            Symbol::Nullable => write!(f, "(empty)"),
        }
    }
}

/// Dense id assigned by a [`SymbolMap`].
pub type SymbolId = u32;

/// Interns symbols to dense, monotonically increasing ids.
///
/// Ids are assigned in first-seen order and never change, so parses
/// over the same grammar are reproducible.
#[derive(Debug, Default)]
pub struct SymbolMap {
    ids: HashMap<Symbol, SymbolId>,
    symbols: Vec<Symbol>,
}

/// Symbol maps are shared between the compiler, the emitted parser
/// closures, and runtime state. Single-threaded by design, hence `Rc`.
pub type SharedSymbolMap = Rc<RefCell<SymbolMap>>;

impl SymbolMap {
    pub fn new() -> SymbolMap {
        SymbolMap::default()
    }

    pub fn shared() -> SharedSymbolMap {
        Rc::new(RefCell::new(SymbolMap::new()))
    }

    /// Returns the id for `symbol`, interning it if unseen.
    pub fn get_or_add(&mut self, symbol: &Symbol) -> SymbolId {
        if let Some(id) = self.ids.get(symbol) {
            return *id;
        }
        let id = self.symbols.len() as SymbolId;
        self.ids.insert(symbol.clone(), id);
        self.symbols.push(symbol.clone());
        id
    }

    pub fn get(&self, symbol: &Symbol) -> Option<SymbolId> {
        self.ids.get(symbol).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Common contract of the two set representations.
pub trait SetOps: Clone {
    fn add(&mut self, symbol: &Symbol);
    /// Removes the symbol; returns whether it was present.
    fn remove(&mut self, symbol: &Symbol) -> bool;
    fn contains(&self, symbol: &Symbol) -> bool;
    fn union(&self, other: &Self) -> Result<Self, SetError>;
    fn intersect(&self, other: &Self) -> Result<Self, SetError>;
    fn subtract(&self, other: &Self) -> Result<Self, SetError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Snapshot of the members, sorted for deterministic iteration.
    fn symbols(&self) -> Vec<Symbol>;
}

/// Dense bitset over a shared symbol map.
///
/// The word vector grows lazily; bits past the end are absent. Binary
/// operations require the identical backing map (`Rc` identity) and
/// report [`SetError::MapMismatch`] otherwise.
#[derive(Debug, Clone)]
pub struct BitSet {
    words: Vec<u64>,
    map: SharedSymbolMap,
}

const WORD_BITS: usize = 64;

impl BitSet {
    pub fn new(map: SharedSymbolMap) -> BitSet {
        BitSet { words: Vec::new(), map }
    }

    pub fn map(&self) -> SharedSymbolMap {
        Rc::clone(&self.map)
    }

    pub fn add_id(&mut self, id: SymbolId) {
        let word = id as usize / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (id as usize % WORD_BITS);
    }

    pub fn contains_id(&self, id: SymbolId) -> bool {
        let word = id as usize / WORD_BITS;
        word < self.words.len() && self.words[word] & (1u64 << (id as usize % WORD_BITS)) != 0
    }

    pub fn remove_id(&mut self, id: SymbolId) -> bool {
        let word = id as usize / WORD_BITS;
        if word >= self.words.len() {
            return false;
        }
        let mask = 1u64 << (id as usize % WORD_BITS);
        let present = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        present
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// True when the two sets share at least one member. Faster than
    /// materializing the intersection.
    pub fn intersects(&self, other: &BitSet) -> Result<bool, SetError> {
        if !Rc::ptr_eq(&self.map, &other.map) {
            return Err(SetError::MapMismatch);
        }
        let n = self.words.len().min(other.words.len());
        for i in 0..n {
            if self.words[i] & other.words[i] != 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn check_backing(&self, other: &BitSet) -> Result<(), SetError> {
        if Rc::ptr_eq(&self.map, &other.map) {
            Ok(())
        } else {
            Err(SetError::MapMismatch)
        }
    }
}

impl SetOps for BitSet {
    fn add(&mut self, symbol: &Symbol) {
        let id = self.map.borrow_mut().get_or_add(symbol);
        self.add_id(id);
    }

    fn remove(&mut self, symbol: &Symbol) -> bool {
        let id = match self.map.borrow().get(symbol) {
            Some(id) => id,
            None => return false,
        };
        self.remove_id(id)
    }

    fn contains(&self, symbol: &Symbol) -> bool {
        match self.map.borrow().get(symbol) {
            Some(id) => self.contains_id(id),
            None => false,
        }
    }

    fn union(&self, other: &Self) -> Result<Self, SetError> {
        self.check_backing(other)?;
        let mut words = vec![0u64; self.words.len().max(other.words.len())];
        for (i, w) in words.iter_mut().enumerate() {
            let a = self.words.get(i).copied().unwrap_or(0);
            let b = other.words.get(i).copied().unwrap_or(0);
            *w = a | b;
        }
        Ok(BitSet { words, map: Rc::clone(&self.map) })
    }

    fn intersect(&self, other: &Self) -> Result<Self, SetError> {
        self.check_backing(other)?;
        let n = self.words.len().min(other.words.len());
        let mut words = vec![0u64; n];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.words[i] & other.words[i];
        }
        Ok(BitSet { words, map: Rc::clone(&self.map) })
    }

    fn subtract(&self, other: &Self) -> Result<Self, SetError> {
        self.check_backing(other)?;
        let mut words = self.words.clone();
        for (i, w) in words.iter_mut().enumerate() {
            *w &= !other.words.get(i).copied().unwrap_or(0);
        }
        Ok(BitSet { words, map: Rc::clone(&self.map) })
    }

    fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn symbols(&self) -> Vec<Symbol> {
        let map = self.map.borrow();
        let mut out = Vec::new();
        for id in 0..map.len() as SymbolId {
            if self.contains_id(id) {
                if let Some(sym) = map.symbol(id) {
                    out.push(sym.clone());
                }
            }
        }
        out.sort();
        out
    }
}

/// Hash-backed symbol set. Needs no shared map, so binary operations
/// never fail; used for the tokenizing stage's analysis domain where
/// symbols are arbitrary literal strings.
#[derive(Debug, Clone, Default)]
pub struct HashSymbolSet {
    items: HashSet<Symbol>,
}

impl HashSymbolSet {
    pub fn new() -> HashSymbolSet {
        HashSymbolSet::default()
    }
}

impl SetOps for HashSymbolSet {
    fn add(&mut self, symbol: &Symbol) {
        self.items.insert(symbol.clone());
    }

    fn remove(&mut self, symbol: &Symbol) -> bool {
        self.items.remove(symbol)
    }

    fn contains(&self, symbol: &Symbol) -> bool {
        self.items.contains(symbol)
    }

    fn union(&self, other: &Self) -> Result<Self, SetError> {
        let mut items = self.items.clone();
        items.extend(other.items.iter().cloned());
        Ok(HashSymbolSet { items })
    }

    fn intersect(&self, other: &Self) -> Result<Self, SetError> {
        let items = self.items.intersection(&other.items).cloned().collect();
        Ok(HashSymbolSet { items })
    }

    fn subtract(&self, other: &Self) -> Result<Self, SetError> {
        let items = self.items.difference(&other.items).cloned().collect();
        Ok(HashSymbolSet { items })
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn symbols(&self) -> Vec<Symbol> {
        let mut out: Vec<Symbol> = self.items.iter().cloned().collect();
        out.sort();
        out
    }
}
