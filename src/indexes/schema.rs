//! The document schema: one document per indexed file.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, STORED, STRING,
};

use crate::tokenizer::analyzer::{CONTENT_TOKENIZER, PATTERN_TOKENIZER, SYMBOL_TOKENIZER};

/// Schema for indexing the files of a single workspace.
///
/// The full text is stored once, on `content`; `content_symbols` and
/// `content_patterns` index the same bytes through their own analyzers
/// but are never stored.
#[derive(Clone)]
pub struct FileSchema {
    pub schema: Schema,

    /// Absolute file path, exact match. Unique per workspace.
    pub path: Field,
    /// Path relative to the workspace root.
    pub relative_path: Field,
    /// Case-preserved base name.
    pub filename: Field,
    /// Lowercased base name for case-insensitive lookup.
    pub filename_lower: Field,
    /// Lowercased extension including the dot.
    pub extension: Field,

    /// Directory facets.
    pub directory: Field,
    pub relative_directory: Field,
    pub directory_name: Field,

    /// Size in bytes.
    pub size: Field,
    /// Modification time, Unix epoch seconds (UTC).
    pub modified: Field,
    /// Precomputed line count of the stored content.
    pub line_count: Field,

    /// Full file text, stored and analyzed with the content analyzer.
    pub content: Field,
    /// Same bytes, identifier-splitting analyzer, not stored.
    pub content_symbols: Field,
    /// Same bytes, pattern-preserving analyzer, not stored.
    pub content_patterns: Field,
}

impl FileSchema {
    pub fn new() -> Self {
        let mut builder = Schema::builder();

        let analyzed = |tokenizer: &str| {
            TextOptions::default().set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(tokenizer)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
        };

        let path = builder.add_text_field("path", STRING | STORED);
        let relative_path = builder.add_text_field("relative_path", STRING | STORED);
        let filename = builder.add_text_field("filename", STRING | STORED);
        let filename_lower = builder.add_text_field("filename_lower", STRING);
        let extension = builder.add_text_field("extension", STRING | STORED);

        let directory = builder.add_text_field("directory", STRING | STORED);
        let relative_directory = builder.add_text_field("relative_directory", STRING | STORED);
        let directory_name = builder.add_text_field("directory_name", STRING | STORED);

        let size = builder.add_i64_field("size", STORED | FAST);
        let modified = builder.add_i64_field("modified", STORED | FAST);
        let line_count = builder.add_u64_field("line_count", STORED);

        let content = builder.add_text_field("content", analyzed(CONTENT_TOKENIZER).set_stored());
        let content_symbols = builder.add_text_field("content_symbols", analyzed(SYMBOL_TOKENIZER));
        let content_patterns =
            builder.add_text_field("content_patterns", analyzed(PATTERN_TOKENIZER));

        Self {
            schema: builder.build(),
            path,
            relative_path,
            filename,
            filename_lower,
            extension,
            directory,
            relative_directory,
            directory_name,
            size,
            modified,
            line_count,
            content,
            content_symbols,
            content_patterns,
        }
    }
}

impl Default for FileSchema {
    fn default() -> Self {
        Self::new()
    }
}
