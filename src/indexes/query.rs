//! Query construction: request text plus mode into a tantivy query tree
//! and the highlight terms the line resolver works with.

use serde::{Deserialize, Serialize};
use tantivy::query::{
    BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

use crate::error::{Error, Result};
use crate::indexes::schema::FileSchema;
use crate::tokenizer::code::{scan, RawKind};
use crate::tokenizer::filters::{lowercase_preserving_operators, split_identifier};
use crate::tokenizer::analyzer::{parent_tokens_with_positions, pattern_tokens};

const CONTENT_BOOST: f32 = 1.0;
const FILENAME_BOOST: f32 = 2.0;
const SYMBOL_BOOST: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Literal,
    Code,
    Standard,
    Wildcard,
    Regex,
    Fuzzy,
    Phrase,
}

impl Default for QueryMode {
    fn default() -> Self {
        QueryMode::Standard
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    pub text: String,
    #[serde(default)]
    pub mode: QueryMode,
    /// Restrict standard-mode clauses to these fields (`content`,
    /// `filename`, `content_symbols`). All three when empty.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl QuerySpec {
    pub fn new(text: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            text: text.into(),
            mode,
            fields: Vec::new(),
            case_sensitive: false,
        }
    }

    fn wants_field(&self, name: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == name)
    }
}

/// A compiled query plus the terms the line resolver highlights with.
#[derive(Debug)]
pub struct BuiltQuery {
    pub query: Box<dyn Query>,
    pub highlight_terms: Vec<String>,
    pub diagnostics: Vec<String>,
}

pub struct QueryBuilder {
    schema: FileSchema,
}

impl QueryBuilder {
    pub fn new(schema: FileSchema) -> Self {
        Self { schema }
    }

    pub fn build(&self, spec: &QuerySpec) -> Result<BuiltQuery> {
        let text = spec.text.trim();
        if text.is_empty() {
            return Err(Error::QueryMalformed("empty query text".to_owned()));
        }
        match spec.mode {
            QueryMode::Literal => self.literal(text, false),
            QueryMode::Code => self.literal(text, true),
            QueryMode::Standard => self.standard(spec, text),
            QueryMode::Wildcard => self.wildcard(text),
            QueryMode::Regex => self.regex(text),
            QueryMode::Fuzzy => self.fuzzy(text),
            QueryMode::Phrase => self.phrase(text),
        }
    }

    /// Literal and code modes: a phrase over `content_patterns`, whose
    /// analyzer preserves `: IFoo` and `std::cout` as single terms. Code
    /// mode additionally ORs a `content_symbols` phrase over the
    /// camelCase sub-tokens found in the text.
    fn literal(&self, text: &str, with_symbols: bool) -> Result<BuiltQuery> {
        let tokens = pattern_tokens(text);
        if tokens.is_empty() {
            return Err(Error::QueryMalformed(format!(
                "no searchable tokens in {text:?}"
            )));
        }

        let highlight_terms: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
        let terms: Vec<Term> = tokens
            .iter()
            .map(|t| Term::from_field_text(self.schema.content_patterns, &t.text))
            .collect();
        let pattern_query = phrase_or_term(terms);

        if !with_symbols {
            return Ok(BuiltQuery {
                query: pattern_query,
                highlight_terms,
                diagnostics: Vec::new(),
            });
        }

        let mut subtokens: Vec<String> = Vec::new();
        for raw in scan(text) {
            let idents: Vec<&String> = match raw.kind {
                RawKind::Ident => vec![&raw.text],
                RawKind::Compound => raw.parts.iter().collect(),
                RawKind::Operator => Vec::new(),
            };
            for ident in idents {
                for part in split_identifier(ident) {
                    subtokens.push(part.to_lowercase());
                }
            }
        }

        let query = if subtokens.is_empty() {
            pattern_query
        } else {
            let symbol_terms: Vec<Term> = subtokens
                .iter()
                .map(|t| Term::from_field_text(self.schema.content_symbols, t))
                .collect();
            let symbol_query = phrase_or_term(symbol_terms);
            Box::new(BooleanQuery::new(vec![
                (Occur::Should, pattern_query),
                (Occur::Should, symbol_query),
            ]))
        };

        Ok(BuiltQuery {
            query,
            highlight_terms,
            diagnostics: Vec::new(),
        })
    }

    /// Standard mode: per term, an OR across `content` (1.0),
    /// `filename` (2.0) and `content_symbols` (1.5); terms combine with
    /// AND.
    fn standard(&self, spec: &QuerySpec, text: &str) -> Result<BuiltQuery> {
        let raws = scan(text);
        if raws.is_empty() {
            return Err(Error::QueryMalformed(format!(
                "no searchable tokens in {text:?}"
            )));
        }

        if !["content", "filename", "content_symbols"]
            .iter()
            .any(|field| spec.wants_field(field))
        {
            return Err(Error::QueryMalformed(format!(
                "no usable fields among {:?}",
                spec.fields
            )));
        }

        let mut highlight_terms = Vec::new();
        let mut must_clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for raw in &raws {
            highlight_terms.push(raw.text.clone());
            let mut should: Vec<(Occur, Box<dyn Query>)> = Vec::new();

            if spec.wants_field("content") {
                let content_term = lowercase_preserving_operators(&raw.text);
                should.push((
                    Occur::Should,
                    boosted(
                        term_query(self.schema.content, &content_term),
                        CONTENT_BOOST,
                    ),
                ));
            }
            if spec.wants_field("filename") {
                should.push((
                    Occur::Should,
                    boosted(
                        term_query(self.schema.filename_lower, &raw.text.to_lowercase()),
                        FILENAME_BOOST,
                    ),
                ));
            }

            if spec.wants_field("content_symbols") {
                let symbol_idents: Vec<&String> = match raw.kind {
                    RawKind::Ident => vec![&raw.text],
                    RawKind::Compound => raw.parts.iter().collect(),
                    RawKind::Operator => Vec::new(),
                };
                for ident in symbol_idents {
                    should.push((
                        Occur::Should,
                        boosted(
                            term_query(self.schema.content_symbols, &ident.to_lowercase()),
                            SYMBOL_BOOST,
                        ),
                    ));
                }
            }

            if should.is_empty() {
                continue;
            }
            must_clauses.push((Occur::Must, Box::new(BooleanQuery::new(should))));
        }

        Ok(BuiltQuery {
            query: Box::new(BooleanQuery::new(must_clauses)),
            highlight_terms,
            diagnostics: Vec::new(),
        })
    }

    /// Wildcard mode: `*`/`?` translated to a token regex over `content`
    /// and `filename`.
    fn wildcard(&self, text: &str) -> Result<BuiltQuery> {
        let mut diagnostics = Vec::new();
        if text.starts_with('*') || text.starts_with('?') {
            diagnostics.push("leading wildcard may be slow".to_owned());
        }

        let pattern = wildcard_to_regex(&text.to_lowercase());
        let content_query = RegexQuery::from_pattern(&pattern, self.schema.content)
            .map_err(|err| Error::QueryMalformed(err.to_string()))?;
        let filename_query = RegexQuery::from_pattern(&pattern, self.schema.filename_lower)
            .map_err(|err| Error::QueryMalformed(err.to_string()))?;

        let query: Box<dyn Query> = Box::new(BooleanQuery::new(vec![
            (Occur::Should, boosted(Box::new(content_query), CONTENT_BOOST)),
            (
                Occur::Should,
                boosted(Box::new(filename_query), FILENAME_BOOST),
            ),
        ]));

        Ok(BuiltQuery {
            query,
            highlight_terms: literal_fragments(text),
            diagnostics,
        })
    }

    /// Regex mode: the pattern runs against individual tokens of
    /// `content`, never across token boundaries.
    fn regex(&self, text: &str) -> Result<BuiltQuery> {
        // Validate eagerly for a readable error before handing the
        // pattern to the index.
        regex::Regex::new(text).map_err(|err| Error::QueryMalformed(err.to_string()))?;
        let query = RegexQuery::from_pattern(text, self.schema.content)
            .map_err(|err| Error::QueryMalformed(err.to_string()))?;

        Ok(BuiltQuery {
            query: Box::new(query),
            highlight_terms: literal_fragments(text),
            diagnostics: vec![
                "regex matches individual tokens, not across token boundaries".to_owned(),
            ],
        })
    }

    /// Fuzzy mode: Damerau-Levenshtein per identifier term, distance 2
    /// (1 for short terms); terms combine with AND.
    fn fuzzy(&self, text: &str) -> Result<BuiltQuery> {
        let raws = scan(text);
        if raws.is_empty() {
            return Err(Error::QueryMalformed(format!(
                "no searchable tokens in {text:?}"
            )));
        }

        let mut highlight_terms = Vec::new();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for raw in &raws {
            highlight_terms.push(raw.text.clone());
            let term_text = lowercase_preserving_operators(&raw.text);
            let term = Term::from_field_text(self.schema.content, &term_text);
            let clause: Box<dyn Query> = if raw.kind == RawKind::Ident {
                let distance = if term_text.chars().count() < 4 { 1 } else { 2 };
                Box::new(FuzzyTermQuery::new(term, distance, true))
            } else {
                term_query(self.schema.content, &term_text)
            };
            clauses.push((Occur::Must, clause));
        }

        Ok(BuiltQuery {
            query: Box::new(BooleanQuery::new(clauses)),
            highlight_terms,
            diagnostics: Vec::new(),
        })
    }

    /// Phrase mode: slop 0 over `content`, with term offsets taken from
    /// the content analyzer so camelCase expansion cannot shift them.
    fn phrase(&self, text: &str) -> Result<BuiltQuery> {
        let parents = parent_tokens_with_positions(text);
        if parents.is_empty() {
            return Err(Error::QueryMalformed(format!(
                "no searchable tokens in {text:?}"
            )));
        }

        let highlight_terms: Vec<String> = parents.iter().map(|(_, t)| t.clone()).collect();
        let query: Box<dyn Query> = if parents.len() == 1 {
            term_query(self.schema.content, &parents[0].1)
        } else {
            let terms: Vec<(usize, Term)> = parents
                .iter()
                .map(|(pos, t)| (*pos, Term::from_field_text(self.schema.content, t)))
                .collect();
            Box::new(PhraseQuery::new_with_offset(terms))
        };

        Ok(BuiltQuery {
            query,
            highlight_terms,
            diagnostics: Vec::new(),
        })
    }
}

fn term_query(field: tantivy::schema::Field, text: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, text),
        IndexRecordOption::WithFreqs,
    ))
}

fn boosted(query: Box<dyn Query>, boost: f32) -> Box<dyn Query> {
    if (boost - 1.0).abs() < f32::EPSILON {
        query
    } else {
        Box::new(BoostQuery::new(query, boost))
    }
}

fn phrase_or_term(mut terms: Vec<Term>) -> Box<dyn Query> {
    if terms.len() == 1 {
        Box::new(TermQuery::new(
            terms.remove(0),
            IndexRecordOption::WithFreqs,
        ))
    } else {
        Box::new(PhraseQuery::new(terms))
    }
}

/// `*` to `.*`, `?` to `.`, everything else regex-escaped.
fn wildcard_to_regex(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern
}

/// Literal alphanumeric fragments of a pattern, for line highlighting.
fn literal_fragments(pattern: &str) -> Vec<String> {
    pattern
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|frag| frag.chars().count() > 1)
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::OPERATOR_RUNS;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(FileSchema::new())
    }

    #[test]
    fn empty_text_is_malformed() {
        let err = builder()
            .build(&QuerySpec::new("   ", QueryMode::Standard))
            .unwrap_err();
        assert_eq!(err.discriminant(), "QueryMalformed");
    }

    #[test]
    fn literal_mode_keeps_code_patterns_whole() {
        let built = builder()
            .build(&QuerySpec::new(": IUserService", QueryMode::Literal))
            .unwrap();
        assert_eq!(built.highlight_terms, vec![": IUserService"]);

        let built = builder()
            .build(&QuerySpec::new("std::cout", QueryMode::Literal))
            .unwrap();
        assert_eq!(built.highlight_terms, vec!["std::cout"]);
    }

    #[test]
    fn operator_allow_list_survives_query_building() {
        for run in OPERATOR_RUNS {
            let text = format!("lhs {run} rhs");
            let built = builder()
                .build(&QuerySpec::new(text.as_str(), QueryMode::Literal))
                .unwrap();
            assert!(
                built.highlight_terms.iter().any(|t| t.contains(run)),
                "operator {run:?} was lost: {:?}",
                built.highlight_terms
            );
        }
    }

    #[test]
    fn standard_mode_ands_terms_and_keeps_highlights() {
        let built = builder()
            .build(&QuerySpec::new("UserService repository", QueryMode::Standard))
            .unwrap();
        assert_eq!(built.highlight_terms, vec!["UserService", "repository"]);
    }

    #[test]
    fn wildcard_mode_flags_leading_wildcards() {
        let built = builder()
            .build(&QuerySpec::new("*Service", QueryMode::Wildcard))
            .unwrap();
        assert_eq!(built.diagnostics, vec!["leading wildcard may be slow"]);
        assert_eq!(built.highlight_terms, vec!["Service"]);

        let built = builder()
            .build(&QuerySpec::new("User*", QueryMode::Wildcard))
            .unwrap();
        assert!(built.diagnostics.is_empty());
    }

    #[test]
    fn invalid_regex_is_malformed() {
        let err = builder()
            .build(&QuerySpec::new("User[", QueryMode::Regex))
            .unwrap_err();
        assert_eq!(err.discriminant(), "QueryMalformed");
    }

    #[test]
    fn regex_mode_documents_its_token_scope() {
        let built = builder()
            .build(&QuerySpec::new("User.*Service", QueryMode::Regex))
            .unwrap();
        assert_eq!(
            built.diagnostics,
            vec!["regex matches individual tokens, not across token boundaries"]
        );
    }

    #[test]
    fn fuzzy_mode_builds_for_each_term() {
        let built = builder()
            .build(&QuerySpec::new("UserServcie lookup", QueryMode::Fuzzy))
            .unwrap();
        assert_eq!(built.highlight_terms, vec!["UserServcie", "lookup"]);
    }

    #[test]
    fn phrase_mode_accepts_multi_word_text() {
        let built = builder()
            .build(&QuerySpec::new("Current User", QueryMode::Phrase))
            .unwrap();
        assert_eq!(built.highlight_terms, vec!["current", "user"]);
    }
}
