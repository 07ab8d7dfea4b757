//! Code-aware tokenization.
//!
//! The scanner in [`code`] turns source text into raw tokens that keep
//! programming-language constructs intact (`: IFoo`, `std::cout`,
//! `List<T>`, `[Fact]`, `#[derive(Debug)]`). The filters in [`filters`]
//! handle camelCase/snake_case expansion, operator-preserving lowercasing
//! and the short-token drop. [`analyzer`] binds both into the three
//! tantivy tokenizers registered on every index.

pub mod analyzer;
pub mod code;
pub mod filters;

pub use analyzer::{register_tokenizers, ContentTokenizer, PatternTokenizer, SymbolTokenizer};

/// Identifier characters: alphanumerics and `_`.
pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters that participate in operator tokens.
pub(crate) fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        ':' | '.'
            | '-'
            | '>'
            | '='
            | '<'
            | '?'
            | '|'
            | '['
            | ']'
            | '@'
            | '#'
            | '('
            | ')'
            | '{'
            | '}'
            | '*'
            | '&'
            | '!'
            | '~'
            | '+'
            | '/'
            | '\\'
            | '^'
            | '%'
    )
}

/// Multi-character operator runs recognized as single tokens.
///
/// Ordered longest first so greedy matching picks `<<<` over `<<` and
/// `...` over `..`. This list doubles as the escaping allow-list in the
/// query builder: these substrings always survive sanitization.
pub const OPERATOR_RUNS: &[&str] = &[
    "<<<", ">>>", "...", "::", "->", "=>", "..", "?.", "??", "<-", "|>", ":=", ">=", "<=", "==",
    "!=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "<<", ">>",
];

/// Operator runs that glue two adjacent identifiers into one compound
/// token (`std::cout`, `this->field`, `user?.name`).
pub(crate) const GLUE_RUNS: &[&str] = &["::", "->", "?.", "=>"];

/// Maximum nesting depth inside a generic cluster before the scanner
/// gives up and treats `<` as a plain operator.
pub(crate) const MAX_ANGLE_DEPTH: usize = 8;

/// Returns the operator run starting at `rest`, if any.
pub(crate) fn match_operator_run(rest: &str) -> Option<&'static str> {
    OPERATOR_RUNS.iter().copied().find(|run| rest.starts_with(run))
}
