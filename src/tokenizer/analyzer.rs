//! Field analyzers: the scanner plus filter pipeline bound per field.
//!
//! Three tokenizers are registered on every index:
//!
//! - `code` (content): full rules, camelCase expansion, operator-preserving
//!   lowercase, length filter. Compound tokens additionally emit their
//!   inner identifiers so plain terms still reach them.
//! - `code_symbols` (content_symbols): identifiers only, always split.
//! - `code_patterns` (content_patterns): verbatim tokens, no expansion and
//!   no lowercasing; phrase queries over this field see exactly the
//!   preserved constructs.
//!
//! Position model: a parent identifier sits at position `p`, its split
//! parts at `p, p+1, …`, and the next token continues after the run, so a
//! phrase query for `Current User` aligns inside `GetCurrentUserId`.

use tantivy::tokenizer::{Token, TokenStream, Tokenizer};
use tantivy::Index;

use super::code::{scan, RawKind};
use super::filters::{keep_token, lowercase_preserving_operators, split_identifier};

pub const CONTENT_TOKENIZER: &str = "code";
pub const SYMBOL_TOKENIZER: &str = "code_symbols";
pub const PATTERN_TOKENIZER: &str = "code_patterns";

fn push(tokens: &mut Vec<Token>, text: String, start: usize, end: usize, position: usize) {
    tokens.push(Token {
        offset_from: start,
        offset_to: end,
        position,
        text,
        position_length: 1,
    });
}

/// Emit an identifier plus its split parts starting at `pos`; returns the
/// number of positions consumed.
fn emit_identifier(
    tokens: &mut Vec<Token>,
    ident: &str,
    start: usize,
    end: usize,
    pos: usize,
) -> usize {
    let parts = split_identifier(ident);
    if keep_token(ident) {
        push(tokens, ident.to_lowercase(), start, end, pos);
    }
    for (k, part) in parts.iter().enumerate() {
        if keep_token(part) {
            push(tokens, part.to_lowercase(), start, end, pos + k);
        }
    }
    parts.len().max(1)
}

/// Token stream for the `content` field.
pub(crate) fn content_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    for raw in scan(text) {
        match raw.kind {
            RawKind::Ident => {
                pos += emit_identifier(&mut tokens, &raw.text, raw.start, raw.end, pos);
            }
            RawKind::Operator => {
                push(&mut tokens, raw.text, raw.start, raw.end, pos);
                pos += 1;
            }
            RawKind::Compound => {
                push(
                    &mut tokens,
                    lowercase_preserving_operators(&raw.text),
                    raw.start,
                    raw.end,
                    pos,
                );
                let mut inner_pos = pos;
                for ident in &raw.parts {
                    inner_pos += emit_identifier(&mut tokens, ident, raw.start, raw.end, inner_pos);
                }
                pos = (pos + 1).max(inner_pos);
            }
        }
    }
    tokens
}

/// Token stream for the `content_symbols` field.
pub(crate) fn symbol_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    for raw in scan(text) {
        let whole;
        let idents: &[String] = match raw.kind {
            RawKind::Ident => {
                whole = [raw.text.clone()];
                &whole
            }
            RawKind::Compound => &raw.parts,
            RawKind::Operator => continue,
        };
        for ident in idents {
            pos += emit_identifier(&mut tokens, ident, raw.start, raw.end, pos);
        }
    }
    tokens
}

/// Token stream for the `content_patterns` field.
pub(crate) fn pattern_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    for raw in scan(text) {
        if keep_token(&raw.text) {
            push(&mut tokens, raw.text, raw.start, raw.end, pos);
            pos += 1;
        }
    }
    tokens
}

/// Parent tokens of the content analyzer with their positions. The
/// camelCase expansion is skipped but still consumes positions, so
/// phrase offsets built from this line up with indexed documents.
pub(crate) fn parent_tokens_with_positions(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    for raw in scan(text) {
        match raw.kind {
            RawKind::Ident => {
                if keep_token(&raw.text) {
                    out.push((pos, raw.text.to_lowercase()));
                }
                pos += split_identifier(&raw.text).len().max(1);
            }
            RawKind::Operator => {
                out.push((pos, raw.text.clone()));
                pos += 1;
            }
            RawKind::Compound => {
                out.push((pos, lowercase_preserving_operators(&raw.text)));
                let mut inner = pos;
                for ident in &raw.parts {
                    inner += split_identifier(ident).len().max(1);
                }
                pos = (pos + 1).max(inner);
            }
        }
    }
    out
}

/// Eagerly produced token stream, the shape tantivy's tokenizer trait
/// expects. `advance` is called before the first `token()` read.
pub struct CodeTokenStream<'a> {
    _text: &'a str,
    tokens: Vec<Token>,
    index: usize,
}

impl<'a> CodeTokenStream<'a> {
    fn new(text: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            _text: text,
            tokens,
            index: 0,
        }
    }
}

impl<'a> TokenStream for CodeTokenStream<'a> {
    fn advance(&mut self) -> bool {
        if self.index < self.tokens.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.index - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.index - 1]
    }
}

#[derive(Clone, Default)]
pub struct ContentTokenizer;

impl Tokenizer for ContentTokenizer {
    type TokenStream<'a> = CodeTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        CodeTokenStream::new(text, content_tokens(text))
    }
}

#[derive(Clone, Default)]
pub struct SymbolTokenizer;

impl Tokenizer for SymbolTokenizer {
    type TokenStream<'a> = CodeTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        CodeTokenStream::new(text, symbol_tokens(text))
    }
}

#[derive(Clone, Default)]
pub struct PatternTokenizer;

impl Tokenizer for PatternTokenizer {
    type TokenStream<'a> = CodeTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        CodeTokenStream::new(text, pattern_tokens(text))
    }
}

/// Register the three analyzers on a freshly opened index. Must run
/// before the first reader or writer is built.
pub fn register_tokenizers(index: &Index) {
    index
        .tokenizers()
        .register(CONTENT_TOKENIZER, ContentTokenizer::default());
    index
        .tokenizers()
        .register(SYMBOL_TOKENIZER, SymbolTokenizer::default());
    index
        .tokenizers()
        .register(PATTERN_TOKENIZER, PatternTokenizer::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_and_pos(tokens: &[Token]) -> Vec<(String, usize)> {
        tokens.iter().map(|t| (t.text.clone(), t.position)).collect()
    }

    #[test]
    fn token_streams_are_deterministic() {
        let input = "fn push_back(&mut self, item: T) -> Option<usize>";
        assert_eq!(text_and_pos(&content_tokens(input)), text_and_pos(&content_tokens(input)));
        assert_eq!(text_and_pos(&symbol_tokens(input)), text_and_pos(&symbol_tokens(input)));
        assert_eq!(text_and_pos(&pattern_tokens(input)), text_and_pos(&pattern_tokens(input)));
    }

    #[test]
    fn camel_parts_share_the_base_position() {
        let tokens = content_tokens("GetCurrentUserId");
        let got = text_and_pos(&tokens);
        assert!(got.contains(&("getcurrentuserid".into(), 0)));
        assert!(got.contains(&("get".into(), 0)));
        assert!(got.contains(&("current".into(), 1)));
        assert!(got.contains(&("user".into(), 2)));
        assert!(got.contains(&("id".into(), 3)));
    }

    #[test]
    fn following_token_clears_the_subtoken_run() {
        let tokens = content_tokens("GetCurrentUserId next");
        let next = tokens.iter().find(|t| t.text == "next").unwrap();
        assert_eq!(next.position, 4);
    }

    #[test]
    fn content_keeps_compounds_and_their_identifiers() {
        let got = text_and_pos(&content_tokens("class UserService : IUserService"));
        let texts: Vec<&str> = got.iter().map(|(t, _)| t.as_str()).collect();
        assert!(texts.contains(&": IUserService"));
        assert!(texts.contains(&"iuserservice"));
        assert!(texts.contains(&"user"));
        assert!(texts.contains(&"service"));
    }

    #[test]
    fn symbols_skip_operators_and_always_split() {
        let tokens = symbol_tokens("let total = std::cout; get_user_data(x)");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert!(texts.contains(&"std"));
        assert!(texts.contains(&"cout"));
        assert!(texts.contains(&"get_user_data"));
        assert!(texts.contains(&"user"));
        assert!(!texts.iter().any(|t| t.contains("::") || *t == "="));
    }

    #[test]
    fn patterns_emit_verbatim_without_expansion() {
        let tokens = pattern_tokens("std::cout << endl");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["std::cout", "<<", "endl"]);
    }

    #[test]
    fn tokenizer_trait_streams_match_the_builders() {
        let mut tokenizer = ContentTokenizer::default();
        let mut stream = tokenizer.token_stream("List<string> items");
        let mut streamed = Vec::new();
        while stream.advance() {
            streamed.push(stream.token().clone());
        }
        assert_eq!(text_and_pos(&streamed), text_and_pos(&content_tokens("List<string> items")));
    }
}
