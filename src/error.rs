//! Error types for grammar compilation and parsing.
//!
//! Compilation errors are fatal: they mean the grammar itself is broken.
//! Parse errors are ordinary control flow: alternation and optional
//! combinators consume them while backtracking, and only an error that
//! escapes the start rule is a real failure.

use std::error::Error;
use std::fmt;

/// Mismatch between set backings. Dense bitsets only combine with sets
/// built over the identical symbol map instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetError {
    MapMismatch,
}

impl fmt::Display for SetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetError::MapMismatch => {
                write!(f, "sets are backed by different symbol maps")
            }
        }
    }
}

impl Error for SetError {}

/// A grammar could not be loaded or compiled into parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// YAML document could not be parsed at all.
    InvalidYaml(String),
    /// A rule value has a shape no combinator accepts.
    InvalidShape(String),
    /// A mapping key was not a string.
    NonStringKey(String),
    /// A rule name resolves to nothing in this stage.
    UnknownRule(String),
    /// Literals must advance the input; an empty literal never can.
    EmptyLiteral,
    /// A regex leaf failed to compile.
    InvalidRegex { pattern: String, reason: String },
    /// The grammar has no `start` rule.
    MissingStart,
    Set(SetError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::InvalidYaml(reason) => write!(f, "invalid grammar YAML: {}", reason),
            CompileError::InvalidShape(what) => write!(f, "invalid rule shape: {}", what),
            CompileError::NonStringKey(key) => {
                write!(f, "grammar mapping keys must be strings, got {}", key)
            }
            CompileError::UnknownRule(name) => write!(f, "unknown rule '{}'", name),
            CompileError::EmptyLiteral => write!(f, "literal rules must not be empty"),
            CompileError::InvalidRegex { pattern, reason } => {
                write!(f, "invalid regex '{}': {}", pattern, reason)
            }
            CompileError::MissingStart => write!(f, "grammar has no 'start' rule"),
            CompileError::Set(e) => write!(f, "set error during prefix analysis: {}", e),
        }
    }
}

impl Error for CompileError {}

impl From<SetError> for CompileError {
    fn from(e: SetError) -> Self {
        CompileError::Set(e)
    }
}

/// A rule did not match at the current position.
///
/// Cheap to construct and clone; harnesses pre-build their error value
/// at compile time and clone it on the failure path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Generic mismatch with a human-readable reason.
    NoMatch(String),
    /// The rule was pruned: no first-symbol of the rule is possible here.
    CannotProceed(String),
    /// No branch of an alternation matched.
    NoAlternative,
    /// A one-or-more repetition matched zero times.
    RepeatDidNotMatch,
    /// A negation lookahead saw its sub-rule match.
    NotMatched,
    /// Dedentation does not line up with any enclosing indentation level.
    DedentationMismatch,
    /// The token stream holds no token of the expected type here.
    ExpectedToken(String),
    /// End-of-input was required but input remains.
    NotAtEnd,
    Set(SetError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoMatch(reason) => write!(f, "no match: {}", reason),
            ParseError::CannotProceed(rule) => {
                write!(f, "cannot proceed with rule '{}'", rule)
            }
            ParseError::NoAlternative => write!(f, "no alternative matched"),
            ParseError::RepeatDidNotMatch => write!(f, "repetition did not match"),
            ParseError::NotMatched => write!(f, "negated rule matched"),
            ParseError::DedentationMismatch => {
                write!(f, "dedentation does not match any enclosing indentation level")
            }
            ParseError::ExpectedToken(name) => write!(f, "expected token '{}'", name),
            ParseError::NotAtEnd => write!(f, "expected end of input"),
            ParseError::Set(e) => write!(f, "set error during parsing: {}", e),
        }
    }
}

impl Error for ParseError {}

impl From<SetError> for ParseError {
    fn from(e: SetError) -> Self {
        ParseError::Set(e)
    }
}

/// Failure of a complete grammar-compile-tokenize-parse run.
#[derive(Debug)]
pub enum PipelineError {
    Compile(CompileError),
    Tokenize(ParseError),
    Parse(ParseError),
    Io(std::io::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Compile(e) => write!(f, "compile error: {}", e),
            PipelineError::Tokenize(e) => write!(f, "tokenizer error: {}", e),
            PipelineError::Parse(e) => write!(f, "parse error: {}", e),
            PipelineError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl Error for PipelineError {}

impl From<CompileError> for PipelineError {
    fn from(e: CompileError) -> Self {
        PipelineError::Compile(e)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_informative() {
        let e = CompileError::UnknownRule("expr".to_string());
        assert!(e.to_string().contains("expr"));

        let e = ParseError::CannotProceed("term".to_string());
        assert!(e.to_string().contains("term"));

        let e = PipelineError::Compile(CompileError::MissingStart);
        assert!(e.to_string().contains("start"));
    }

    #[test]
    fn set_error_converts_into_both_phases() {
        let c: CompileError = SetError::MapMismatch.into();
        assert_eq!(c, CompileError::Set(SetError::MapMismatch));
        let p: ParseError = SetError::MapMismatch.into();
        assert_eq!(p, ParseError::Set(SetError::MapMismatch));
    }
}
