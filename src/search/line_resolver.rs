//! Line-accurate retrieval from stored content.
//!
//! Line numbers derive from the indexed `content` field, never from
//! re-reading files, so results are deterministic against the snapshot
//! the query ran on.

use serde::Serialize;

/// One matching line with its clamped context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMatch {
    /// 1-based line number.
    pub line_number: usize,
    /// The line exactly as stored, untrimmed.
    pub line_text: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

/// Locates query terms inside stored content by substring containment.
///
/// The tokenizer's role upstream is only to isolate searchable fragments
/// (`: IFoo`, `std::cout`) from the punctuation around them; here those
/// fragments are matched against the raw line text.
#[derive(Debug, Clone)]
pub struct LineResolver {
    context_lines: usize,
    case_sensitive: bool,
}

impl LineResolver {
    pub fn new(context_lines: usize, case_sensitive: bool) -> Self {
        Self {
            context_lines,
            case_sensitive,
        }
    }

    /// First line containing any of the terms, with context.
    pub fn first_match(&self, content: &str, terms: &[String]) -> Option<LineMatch> {
        self.all_matches(content, terms).next()
    }

    /// Every matching line in order, lazily.
    pub fn all_matches<'a>(&self, content: &'a str, terms: &[String]) -> AllMatches<'a> {
        let needles = if self.case_sensitive {
            terms.to_vec()
        } else {
            terms.iter().map(|t| t.to_lowercase()).collect()
        };
        AllMatches {
            lines: content.split('\n').collect(),
            needles,
            next_index: 0,
            context_lines: self.context_lines,
            case_sensitive: self.case_sensitive,
        }
    }
}

/// Lazy iterator over matching lines.
pub struct AllMatches<'a> {
    lines: Vec<&'a str>,
    needles: Vec<String>,
    next_index: usize,
    context_lines: usize,
    case_sensitive: bool,
}

impl<'a> AllMatches<'a> {
    fn line_matches(&self, line: &str) -> bool {
        if self.needles.is_empty() {
            return false;
        }
        if self.case_sensitive {
            self.needles.iter().any(|needle| line.contains(needle))
        } else {
            let lowered = line.to_lowercase();
            self.needles.iter().any(|needle| lowered.contains(needle))
        }
    }

    fn match_at(&self, index: usize) -> LineMatch {
        let start = index.saturating_sub(self.context_lines);
        let end = (index + self.context_lines + 1).min(self.lines.len());
        LineMatch {
            line_number: index + 1,
            line_text: self.lines[index].to_owned(),
            context_before: self.lines[start..index].iter().map(|l| (*l).to_owned()).collect(),
            context_after: self.lines[index + 1..end].iter().map(|l| (*l).to_owned()).collect(),
        }
    }
}

impl<'a> Iterator for AllMatches<'a> {
    type Item = LineMatch;

    fn next(&mut self) -> Option<LineMatch> {
        while self.next_index < self.lines.len() {
            let index = self.next_index;
            self.next_index += 1;
            if self.line_matches(self.lines[index]) {
                return Some(self.match_at(index));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = "fn alpha() {}\n\nfn beta() {\n    alpha();\n}\nconst GAMMA: usize = 3;\n";

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn first_match_returns_the_exact_stored_line() {
        let resolver = LineResolver::new(1, false);
        let m = resolver.first_match(CONTENT, &terms(&["beta"])).unwrap();
        assert_eq!(m.line_number, 3);
        assert_eq!(m.line_text, "fn beta() {");
        assert_eq!(CONTENT.split('\n').nth(m.line_number - 1).unwrap(), m.line_text);
    }

    #[test]
    fn context_windows_clamp_to_file_bounds() {
        let resolver = LineResolver::new(3, false);
        let m = resolver.first_match(CONTENT, &terms(&["alpha"])).unwrap();
        assert_eq!(m.line_number, 1);
        assert!(m.context_before.is_empty());
        assert_eq!(m.context_after.len(), 3);

        let m = resolver.first_match(CONTENT, &terms(&["GAMMA"])).unwrap();
        assert_eq!(m.line_number, 6);
        assert_eq!(m.context_before.len(), 3);
        // One trailing empty line after the final newline.
        assert_eq!(m.context_after.len(), 1);
    }

    #[test]
    fn matching_is_case_insensitive_by_default() {
        let resolver = LineResolver::new(0, false);
        assert!(resolver.first_match(CONTENT, &terms(&["gamma"])).is_some());

        let sensitive = LineResolver::new(0, true);
        assert!(sensitive.first_match(CONTENT, &terms(&["gamma"])).is_none());
    }

    #[test]
    fn preserved_code_patterns_match_substring_wise() {
        let resolver = LineResolver::new(0, false);
        let m = resolver
            .first_match(CONTENT, &terms(&[": usize"]))
            .unwrap();
        assert_eq!(m.line_number, 6);
    }

    #[test]
    fn all_matches_yields_every_line_in_order() {
        let resolver = LineResolver::new(0, false);
        let numbers: Vec<usize> = resolver
            .all_matches(CONTENT, &terms(&["alpha"]))
            .map(|m| m.line_number)
            .collect();
        assert_eq!(numbers, vec![1, 4]);
    }

    #[test]
    fn no_matching_line_returns_none() {
        let resolver = LineResolver::new(2, false);
        assert!(resolver.first_match(CONTENT, &terms(&["delta"])).is_none());
        assert!(resolver.first_match(CONTENT, &[]).is_none());
    }

    #[test]
    fn line_text_is_returned_untrimmed() {
        let resolver = LineResolver::new(0, false);
        let m = resolver.first_match(CONTENT, &terms(&["alpha();"])).unwrap();
        assert_eq!(m.line_text, "    alpha();");
    }
}
