//! Query execution: collect candidates over a snapshot, resolve lines,
//! rescore and rank.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tantivy::collector::TopDocs;
use tantivy::schema::{Document, Field};
use tracing::debug;

use crate::error::Result;
use crate::indexes::query::{QueryBuilder, QuerySpec};
use crate::indexes::store::IndexStore;
use crate::search::line_resolver::{LineMatch, LineResolver};
use crate::search::scorer::Scorer;

/// Over-fetch factor before post-scoring reranks the candidates.
const CANDIDATE_FACTOR: usize = 2;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub context_lines: usize,
    pub include_context: bool,
    pub deadline: Option<Instant>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            context_lines: 3,
            include_context: true,
            deadline: None,
        }
    }
}

/// One document-level hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub path: String,
    pub relative_path: String,
    pub score: f32,
    /// 1-based; absent when the text match never surfaced on a line.
    pub line_number: Option<usize>,
    pub line_text: Option<String>,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_fragments: Option<Vec<String>>,
    pub last_modified: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub hits: Vec<Hit>,
    pub truncated: bool,
    pub diagnostics: Vec<String>,
}

/// One line-level hit (grep-like).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineHit {
    pub path: String,
    pub relative_path: String,
    pub score: f32,
    #[serde(flatten)]
    pub line: LineMatch,
}

#[derive(Debug, Default, Serialize)]
pub struct LineSearchResults {
    pub hits: Vec<LineHit>,
    pub truncated: bool,
    pub diagnostics: Vec<String>,
}

/// Executes queries against one workspace's index.
pub struct Searcher {
    store: Arc<IndexStore>,
    query_builder: QueryBuilder,
}

impl Searcher {
    pub fn new(store: Arc<IndexStore>) -> Self {
        let query_builder = QueryBuilder::new(store.schema().clone());
        Self {
            store,
            query_builder,
        }
    }

    /// Document-level search: top candidates by text score, reranked by
    /// the multiplicative factors, with the first matching line each.
    pub fn search(&self, spec: &QuerySpec, options: &SearchOptions) -> Result<SearchResults> {
        let built = self.query_builder.build(spec)?;
        let searcher = self.store.acquire_searcher();
        let collector = TopDocs::with_limit(options.limit.max(1) * CANDIDATE_FACTOR);
        let candidates = searcher.search(&built.query, &collector)?;
        debug!(candidates = candidates.len(), "collected candidates");

        let schema = self.store.schema();
        let scorer = Scorer::new(&spec.text);
        let resolver = LineResolver::new(options.context_lines, spec.case_sensitive);

        let mut truncated = false;
        let mut hits = Vec::with_capacity(candidates.len());
        for (text_score, address) in candidates {
            if deadline_passed(options.deadline) {
                truncated = true;
                break;
            }

            let doc = searcher.doc(address)?;
            let content = get_text(&doc, schema.content);
            let line = resolver.first_match(&content, &built.highlight_terms);
            if text_score <= 0.0 && line.is_none() {
                continue;
            }

            let filename = get_text(&doc, schema.filename);
            let modified = get_i64(&doc, schema.modified);
            let size = get_i64(&doc, schema.size);
            let score = scorer.score(text_score, &filename, modified, size);

            hits.push(assemble_hit(
                &doc,
                schema,
                score,
                line,
                modified,
                options.include_context,
            ));
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.limit);

        Ok(SearchResults {
            hits,
            truncated,
            diagnostics: built.diagnostics,
        })
    }

    /// Line-level search: every matching line of every candidate,
    /// ordered by file score then line number.
    pub fn search_lines(&self, spec: &QuerySpec, options: &SearchOptions) -> Result<LineSearchResults> {
        let built = self.query_builder.build(spec)?;
        let searcher = self.store.acquire_searcher();
        let collector = TopDocs::with_limit(options.limit.max(1) * CANDIDATE_FACTOR);
        let candidates = searcher.search(&built.query, &collector)?;

        let schema = self.store.schema();
        let scorer = Scorer::new(&spec.text);
        let resolver = LineResolver::new(options.context_lines, spec.case_sensitive);

        let mut truncated = false;
        let mut scored_docs = Vec::with_capacity(candidates.len());
        for (text_score, address) in candidates {
            if deadline_passed(options.deadline) {
                truncated = true;
                break;
            }
            let doc = searcher.doc(address)?;
            let filename = get_text(&doc, schema.filename);
            let modified = get_i64(&doc, schema.modified);
            let size = get_i64(&doc, schema.size);
            let score = scorer.score(text_score, &filename, modified, size);
            scored_docs.push((score, doc));
        }

        scored_docs
            .sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut hits = Vec::new();
        'outer: for (score, doc) in &scored_docs {
            let content = get_text(doc, schema.content);
            let path = get_text(doc, schema.path);
            let relative_path = get_text(doc, schema.relative_path);
            for line in resolver.all_matches(&content, &built.highlight_terms) {
                if hits.len() >= options.limit {
                    break 'outer;
                }
                hits.push(LineHit {
                    path: path.clone(),
                    relative_path: relative_path.clone(),
                    score: *score,
                    line,
                });
            }
        }

        Ok(LineSearchResults {
            hits,
            truncated,
            diagnostics: built.diagnostics,
        })
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map(|d| Instant::now() >= d).unwrap_or(false)
}

fn assemble_hit(
    doc: &Document,
    schema: &crate::indexes::schema::FileSchema,
    score: f32,
    line: Option<LineMatch>,
    modified: i64,
    include_context: bool,
) -> Hit {
    let (line_number, line_text, context_before, context_after, start_line, end_line) = match &line
    {
        Some(m) => {
            let start = m.line_number - m.context_before.len();
            let end = m.line_number + m.context_after.len();
            (
                Some(m.line_number),
                Some(m.line_text.clone()),
                m.context_before.clone(),
                m.context_after.clone(),
                Some(start),
                Some(end),
            )
        }
        None => (None, None, Vec::new(), Vec::new(), None, None),
    };

    let highlighted_fragments = match (&line, include_context) {
        (Some(m), true) => Some(render_fragments(m)),
        _ => None,
    };

    Hit {
        path: get_text(doc, schema.path),
        relative_path: get_text(doc, schema.relative_path),
        score,
        line_number,
        line_text,
        context_before,
        context_after,
        start_line,
        end_line,
        highlighted_fragments,
        last_modified: modified,
    }
}

/// The matched line plus its context, numbered grep-style with an arrow
/// on the match.
fn render_fragments(m: &LineMatch) -> Vec<String> {
    let mut fragments = Vec::with_capacity(m.context_before.len() + 1 + m.context_after.len());
    let first = m.line_number - m.context_before.len();
    for (offset, line) in m.context_before.iter().enumerate() {
        fragments.push(format!("{}: {line}", first + offset));
    }
    fragments.push(format!("{}→ {}", m.line_number, m.line_text));
    for (offset, line) in m.context_after.iter().enumerate() {
        fragments.push(format!("{}: {line}", m.line_number + 1 + offset));
    }
    fragments
}

fn get_text(doc: &Document, field: Field) -> String {
    doc.get_first(field)
        .and_then(|value| value.as_text())
        .unwrap_or_default()
        .to_owned()
}

fn get_i64(doc: &Document, field: Field) -> i64 {
    doc.get_first(field).and_then(|value| value.as_i64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexes::query::QueryMode;
    use crate::indexes::store::IndexStoreOptions;
    use tantivy::doc;

    async fn add_file(store: &IndexStore, path: &str, filename: &str, content: &str) {
        let schema = store.schema();
        let document = doc!(
            schema.path => path,
            schema.relative_path => filename,
            schema.filename => filename,
            schema.filename_lower => filename.to_lowercase(),
            schema.extension => ".cs",
            schema.directory => "/w",
            schema.relative_directory => "",
            schema.directory_name => "w",
            schema.size => content.len() as i64,
            schema.modified => 1_700_000_000i64,
            schema.line_count => content.matches('\n').count() as u64 + 1,
            schema.content => content,
            schema.content_symbols => content,
            schema.content_patterns => content,
        );
        store.add_or_replace(path, document).await.unwrap();
    }

    async fn demo_store() -> (tempfile::TempDir, Arc<IndexStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            IndexStore::open_or_create(tmp.path(), IndexStoreOptions::default()).unwrap(),
        );

        add_file(
            &store,
            "/w/UserService.cs",
            "UserService.cs",
            "public class UserService : IUserService\n{\n    public int GetCurrentUserId() { return 0; }\n}\n",
        )
        .await;
        add_file(
            &store,
            "/w/Program.cs",
            "Program.cs",
            "var s = new UserService();\ns.GetCurrentUserId();\n",
        )
        .await;
        add_file(
            &store,
            "/w/notes.txt",
            "notes.txt",
            "UserService is great\n",
        )
        .await;
        store.commit().await.unwrap();
        (tmp, store)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn standard_search_finds_every_document_with_line_numbers() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let results = searcher
            .search(
                &QuerySpec::new("UserService", QueryMode::Standard),
                &SearchOptions::default(),
            )
            .unwrap();

        assert_eq!(results.hits.len(), 3);
        for hit in &results.hits {
            assert_eq!(hit.line_number, Some(1), "first match is on line 1 in {}", hit.path);
            let text = hit.line_text.as_deref().unwrap();
            assert!(text.to_lowercase().contains("userservice"));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn literal_search_hits_the_annotation_line_only() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let results = searcher
            .search(
                &QuerySpec::new(": IUserService", QueryMode::Literal),
                &SearchOptions::default(),
            )
            .unwrap();

        assert_eq!(results.hits.len(), 1);
        let hit = &results.hits[0];
        assert_eq!(hit.path, "/w/UserService.cs");
        assert_eq!(hit.line_number, Some(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn phrase_query_aligns_with_camel_case_subtokens() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let results = searcher
            .search(
                &QuerySpec::new("Current User", QueryMode::Phrase),
                &SearchOptions::default(),
            )
            .unwrap();

        let paths: Vec<&str> = results.hits.iter().map(|h| h.path.as_str()).collect();
        assert!(paths.contains(&"/w/UserService.cs"));
        assert!(paths.contains(&"/w/Program.cs"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn regex_does_not_cross_token_boundaries() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let results = searcher
            .search(
                &QuerySpec::new("User.*Service", QueryMode::Regex),
                &SearchOptions::default(),
            )
            .unwrap();

        assert!(results.hits.is_empty());
        assert_eq!(
            results.diagnostics,
            vec!["regex matches individual tokens, not across token boundaries"]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_lines_enumerates_matches_in_line_order() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store.clone());

        add_file(
            &store,
            "/w/Extra.cs",
            "Extra.cs",
            "// helper\nvar a = new UserService();\nvar b = 1;\nvar c = 2;\nvar d = 3;\nvar e = 4;\nUserService x;\n",
        )
        .await;
        store.commit().await.unwrap();

        let results = searcher
            .search_lines(
                &QuerySpec::new("UserService", QueryMode::Standard),
                &SearchOptions::default(),
            )
            .unwrap();

        let extra: Vec<usize> = results
            .hits
            .iter()
            .filter(|h| h.path == "/w/Extra.cs")
            .map(|h| h.line.line_number)
            .collect();
        assert_eq!(extra, vec![2, 7]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_deadline_reports_truncation() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let options = SearchOptions {
            deadline: Some(Instant::now() - std::time::Duration::from_secs(1)),
            ..Default::default()
        };
        let results = searcher
            .search(&QuerySpec::new("UserService", QueryMode::Standard), &options)
            .unwrap();

        assert!(results.truncated);
        assert!(results.hits.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fuzzy_search_tolerates_transpositions() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let results = searcher
            .search(
                &QuerySpec::new("UserServcie", QueryMode::Fuzzy),
                &SearchOptions::default(),
            )
            .unwrap();
        assert!(!results.hits.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wildcard_search_matches_token_prefixes() {
        let (_tmp, store) = demo_store().await;
        let searcher = Searcher::new(store);

        let results = searcher
            .search(
                &QuerySpec::new("UserSer*", QueryMode::Wildcard),
                &SearchOptions::default(),
            )
            .unwrap();
        assert!(!results.hits.is_empty());
    }
}
