//! End-to-end driver: grammar in, token trees and AST out.
//!
//! A [`Pipeline`] compiles both stages once and can then run any
//! number of sources. The tokenizer grammar is the grammar's
//! `tokenizer` section when present, otherwise the main grammar
//! doubles as its own tokenizer. Both stages share one token-type
//! symbol map, so the token ids the tokenizer emits are the ids the
//! token-level parsers match on.
//!
//! The pipeline performs no I/O; formatting helpers return strings
//! and counters are exposed read-only, for callers like the CLI to
//! print.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;

use crate::ast::AstNode;
use crate::compiler::{compile_stage, ParserFn};
use crate::error::{ParseError, PipelineError};
use crate::grammar::{load_grammar, Grammar};
use crate::set::{SharedSymbolMap, SymbolMap};
use crate::tokenizer::{
    format_token_tree, link_tokens, StringStage, StringState, TokenRef,
};
use crate::tokenparser::{format_l2_tree, L2Ref, TokenStage, TokenState};

/// Per-rule first-symbol sets of both stages, for diagnostics.
#[derive(Debug, Serialize)]
pub struct PrefixReport {
    pub tokenizer: BTreeMap<String, Vec<String>>,
    pub parser: BTreeMap<String, Vec<String>>,
}

/// Counter snapshot of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub tokenizer_calls: u64,
    pub tokenizer_errors: u64,
    pub parser_calls: u64,
    pub parser_errors: u64,
    pub lines: usize,
    pub tokens: usize,
}

/// Output of the tokenizing stage.
#[derive(Debug)]
pub struct Tokenized {
    pub state: StringState,
    pub head: TokenRef,
}

impl Tokenized {
    pub fn format_tree(&self) -> String {
        let ctx = self.state.context();
        let arena = ctx.arena();
        let ids = ctx.token_ids();
        let map = ids.borrow();
        format_token_tree(&arena, &map, self.head)
    }
}

/// Output of a full run.
#[derive(Debug)]
pub struct ParseRun {
    pub tokenized: Tokenized,
    pub state: TokenState,
    pub l2_head: Option<L2Ref>,
    pub ast: Vec<AstNode>,
}

impl ParseRun {
    /// True when token-level parsing stopped short of the end of the
    /// token stream.
    pub fn has_leftover(&self) -> bool {
        self.state.current().is_some()
    }

    pub fn format_l2_tree(&self) -> Option<String> {
        let head = self.l2_head?;
        let ctx = self.state.context();
        let arena = ctx.l2();
        Some(format_l2_tree(&arena, head))
    }

    pub fn stats(&self) -> RunStats {
        let string_ctx = self.tokenized.state.context();
        let token_ctx = self.state.context();
        let tokens = string_ctx.arena().len();
        RunStats {
            tokenizer_calls: string_ctx.calls(),
            tokenizer_errors: string_ctx.errors(),
            parser_calls: token_ctx.calls(),
            parser_errors: token_ctx.errors(),
            lines: string_ctx.line_count(),
            tokens,
        }
    }
}

/// A compiled two-stage parser for one grammar.
pub struct Pipeline {
    tokenizer: ParserFn<StringState>,
    parser: ParserFn<TokenState>,
    token_ids: SharedSymbolMap,
    tokenizer_prefixes: BTreeMap<String, Vec<String>>,
    parser_prefixes: BTreeMap<String, Vec<String>>,
    debug_tokenizer: bool,
    debug_parser: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("tokenizer_prefixes", &self.tokenizer_prefixes)
            .field("parser_prefixes", &self.parser_prefixes)
            .field("debug_tokenizer", &self.debug_tokenizer)
            .field("debug_parser", &self.debug_parser)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn from_yaml(text: &str) -> Result<Pipeline, PipelineError> {
        let grammar = load_grammar(text)?;
        Pipeline::from_grammar(&grammar)
    }

    pub fn from_grammar(grammar: &Grammar) -> Result<Pipeline, PipelineError> {
        let token_ids = SymbolMap::shared();
        let mut string_stage = StringStage::new(Rc::clone(&token_ids));
        let tokenizer_grammar: &Grammar = grammar.tokenizer.as_deref().unwrap_or(grammar);
        let tokenizer = compile_stage(tokenizer_grammar, &mut string_stage)?;
        let mut token_stage = TokenStage::new(Rc::clone(&token_ids));
        let parser = compile_stage(grammar, &mut token_stage)?;
        Ok(Pipeline {
            tokenizer: tokenizer.parser,
            parser: parser.parser,
            token_ids,
            tokenizer_prefixes: tokenizer.rule_prefixes,
            parser_prefixes: parser.rule_prefixes,
            debug_tokenizer: false,
            debug_parser: false,
        })
    }

    /// Enables stderr tracing per stage.
    pub fn with_debug(mut self, tokenizer: bool, parser: bool) -> Pipeline {
        self.debug_tokenizer = tokenizer;
        self.debug_parser = parser;
        self
    }

    pub fn prefix_report(&self) -> PrefixReport {
        PrefixReport {
            tokenizer: self.tokenizer_prefixes.clone(),
            parser: self.parser_prefixes.clone(),
        }
    }

    /// Runs the tokenizing stage only.
    pub fn tokenize(&self, source: &str) -> Result<Tokenized, PipelineError> {
        let state = StringState::new(source, Rc::clone(&self.token_ids), self.debug_tokenizer);
        let success = (self.tokenizer)(&state).map_err(PipelineError::Tokenize)?;
        let head = match success.token {
            Some(chain) => chain.head,
            None => {
                return Err(PipelineError::Tokenize(ParseError::NoMatch(
                    "tokenizer emitted no tokens".to_string(),
                )));
            }
        };
        Ok(Tokenized { state: success.state, head })
    }

    /// Tokenizes, links, and parses `source`.
    pub fn run(&self, source: &str) -> Result<ParseRun, PipelineError> {
        let tokenized = self.tokenize(source)?;
        let string_ctx = tokenized.state.context();
        link_tokens(&mut string_ctx.arena_mut(), tokenized.head);

        let token_state =
            TokenState::new(Some(tokenized.head), Rc::clone(&string_ctx), self.debug_parser);
        let success = (self.parser)(&token_state).map_err(PipelineError::Parse)?;
        let ast = success.state.ast_nodes();
        Ok(ParseRun {
            tokenized,
            l2_head: success.token.map(|chain| chain.head),
            ast,
            state: success.state,
        })
    }
}
