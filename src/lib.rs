//! # parsegen
//!
//! A grammar-driven parser generator. Grammars are declarative YAML
//! documents; compiling one yields ordinary parser closures, so the
//! grammar can change without regenerating or rebuilding anything.
//!
//! Parsing runs in two stages. The byte-level tokenizing stage turns
//! source text into a token tree, handling literals, regexes,
//! end-of-input, and indentation. The token-level stage runs the main
//! grammar over that tree, emits second-level tokens, and builds a
//! typed AST where the grammar asks for one. Both stages share the
//! compiler core: backtracking combinators wrapped in a harness that
//! prunes rules which cannot match at the current position.
//!
//! [`pipeline::Pipeline`] ties the stages together:
//!
//! ```yaml
//! tokenizer:
//!   start: [words, $eof]
//!   words:
//!     $repeat: word
//!   word:
//!     $regex: "[a-z]+ ?"
//! start: [word, word]
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod grammar;
pub mod pipeline;
pub mod set;
pub mod tokenizer;
pub mod tokenparser;

pub use error::{CompileError, ParseError, PipelineError, SetError};
pub use grammar::{load_grammar, Grammar, Leaf, Rule};
pub use pipeline::{ParseRun, Pipeline, PrefixReport, RunStats, Tokenized};
