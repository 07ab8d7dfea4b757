//! The raw scanner: source text to code-aware tokens.
//!
//! Offsets are byte-exact into the input. The same input always produces
//! the same token stream; there is no configuration and no state carried
//! between calls.

use super::{
    is_ident_char, is_operator_char, match_operator_run, GLUE_RUNS, MAX_ANGLE_DEPTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawKind {
    /// A plain identifier run.
    Ident,
    /// An operator run or single operator character.
    Operator,
    /// A preserved construct: type annotation, generic cluster, attribute,
    /// decorator or operator-glued path. `parts` holds the inner
    /// identifiers so plain term search still reaches them.
    Compound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawToken {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub kind: RawKind,
    pub parts: Vec<String>,
}

impl RawToken {
    fn ident(text: &str, start: usize, end: usize) -> Self {
        Self {
            text: text.to_owned(),
            start,
            end,
            kind: RawKind::Ident,
            parts: Vec::new(),
        }
    }

    fn operator(text: &str, start: usize, end: usize) -> Self {
        Self {
            text: text.to_owned(),
            start,
            end,
            kind: RawKind::Operator,
            parts: Vec::new(),
        }
    }

    fn compound(text: String, start: usize, end: usize, parts: Vec<String>) -> Self {
        Self {
            text,
            start,
            end,
            kind: RawKind::Compound,
            parts,
        }
    }
}

fn char_at(text: &str, i: usize) -> Option<char> {
    text[i..].chars().next()
}

/// End offset of the identifier run starting at `i`, or `i` if none.
fn ident_end(text: &str, i: usize) -> usize {
    let mut j = i;
    while let Some(c) = char_at(text, j) {
        if !is_ident_char(c) {
            break;
        }
        j += c.len_utf8();
    }
    j
}

/// Skips spaces and tabs only; annotations never cross lines.
fn skip_inline_space(text: &str, i: usize) -> usize {
    let mut j = i;
    while let Some(c) = char_at(text, j) {
        if c != ' ' && c != '\t' {
            break;
        }
        j += c.len_utf8();
    }
    j
}

/// Identifier runs inside a slice, in order.
fn idents_in(slice: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut j = 0;
    while j < slice.len() {
        let c = match char_at(slice, j) {
            Some(c) => c,
            None => break,
        };
        if is_ident_char(c) {
            let e = ident_end(slice, j);
            parts.push(slice[j..e].to_owned());
            j = e;
        } else {
            j += c.len_utf8();
        }
    }
    parts
}

/// Balanced `<...>` starting at `start` (which must point at `<`).
///
/// Returns the offset just past the closing `>`. Bails out on anything
/// that does not look like a type argument list, on newlines, and past
/// a nesting depth of [`MAX_ANGLE_DEPTH`], so comparisons like `a < b`
/// degrade to plain operator tokens.
fn generic_cluster_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = start;
    while let Some(c) = char_at(text, j) {
        match c {
            '<' => {
                depth += 1;
                if depth > MAX_ANGLE_DEPTH {
                    return None;
                }
            }
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            ',' | ' ' | '\t' | '.' | ':' | '?' | '[' | ']' => {}
            c if is_ident_char(c) => {}
            _ => return None,
        }
        j += c.len_utf8();
    }
    None
}

/// Balanced `(...)` starting at `start` (which must point at `(`).
fn paren_group_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = start;
    while let Some(c) = char_at(text, j) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            '\n' => return None,
            _ => {}
        }
        j += c.len_utf8();
    }
    None
}

/// Balanced `[...]` starting at `start` (which must point at `[`).
fn bracket_group_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = start;
    while let Some(c) = char_at(text, j) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j + 1);
                }
            }
            '\n' => return None,
            _ => {}
        }
        j += c.len_utf8();
    }
    None
}

/// Type annotation starting at `i`: the marker (`:` or `->`), optional
/// inline spacing, an identifier, an optional generic cluster. The token
/// text is normalized to `<marker> <type>` with a single space.
fn annotation(text: &str, i: usize, marker: &str) -> Option<RawToken> {
    let after_marker = i + marker.len();
    let ident_start = skip_inline_space(text, after_marker);
    let c = char_at(text, ident_start)?;
    if !is_ident_char(c) {
        return None;
    }
    let mut end = ident_end(text, ident_start);
    if char_at(text, end) == Some('<') {
        if let Some(ge) = generic_cluster_end(text, end) {
            end = ge;
        }
    }
    let ty = &text[ident_start..end];
    Some(RawToken::compound(
        format!("{marker} {ty}"),
        i,
        end,
        idents_in(ty),
    ))
}

/// Bracketed attribute at `i`: `[Ident]` or `[Ident(...)]`.
fn attribute(text: &str, i: usize) -> Option<RawToken> {
    let name_start = i + 1;
    let c = char_at(text, name_start)?;
    if !is_ident_char(c) {
        return None;
    }
    let name_end = ident_end(text, name_start);
    let mut end = name_end;
    if char_at(text, end) == Some('(') {
        end = paren_group_end(text, end)?;
    }
    if char_at(text, end) != Some(']') {
        return None;
    }
    end += 1;
    let name = text[name_start..name_end].to_owned();
    Some(RawToken::compound(
        text[i..end].to_owned(),
        i,
        end,
        vec![name],
    ))
}

/// Scan `text` into raw tokens. Whitespace separates tokens and is never
/// emitted; characters outside the identifier and operator classes
/// (quotes, commas, semicolons) are boundaries as well.
pub(crate) fn scan(text: &str) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(c) = char_at(text, i) {
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }

        // Identifiers, possibly extended into a generic cluster or an
        // operator-glued path.
        if is_ident_char(c) {
            let e = ident_end(text, i);
            if char_at(text, e) == Some('<') {
                if let Some(ge) = generic_cluster_end(text, e) {
                    let mut parts = vec![text[i..e].to_owned()];
                    parts.extend(idents_in(&text[e..ge]));
                    tokens.push(RawToken::compound(text[i..ge].to_owned(), i, ge, parts));
                    i = ge;
                    continue;
                }
            }

            let mut glue_end = e;
            let mut parts = vec![text[i..e].to_owned()];
            loop {
                let Some(run) = GLUE_RUNS.iter().find(|run| text[glue_end..].starts_with(**run))
                else {
                    break;
                };
                let after = glue_end + run.len();
                match char_at(text, after) {
                    Some(c) if is_ident_char(c) => {
                        let ne = ident_end(text, after);
                        parts.push(text[after..ne].to_owned());
                        glue_end = ne;
                    }
                    _ => break,
                }
            }
            if glue_end > e {
                tokens.push(RawToken::compound(
                    text[i..glue_end].to_owned(),
                    i,
                    glue_end,
                    parts,
                ));
                i = glue_end;
            } else {
                tokens.push(RawToken::ident(&text[i..e], i, e));
                i = e;
            }
            continue;
        }

        // `: Type` annotation; `::` and `:=` stay operator runs.
        if c == ':' && !text[i..].starts_with("::") && !text[i..].starts_with(":=") {
            if let Some(tok) = annotation(text, i, ":") {
                i = tok.end;
                tokens.push(tok);
                continue;
            }
        }

        // `-> Type` annotation; a bare `->` stays an operator run.
        if text[i..].starts_with("->") {
            if let Some(tok) = annotation(text, i, "->") {
                i = tok.end;
                tokens.push(tok);
                continue;
            }
        }

        // `[Attr]` / `[Attr(...)]`.
        if c == '[' {
            if let Some(tok) = attribute(text, i) {
                i = tok.end;
                tokens.push(tok);
                continue;
            }
        }

        // `@Decorator`.
        if c == '@' {
            if let Some(nc) = char_at(text, i + 1) {
                if is_ident_char(nc) {
                    let e = ident_end(text, i + 1);
                    let name = text[i + 1..e].to_owned();
                    tokens.push(RawToken::compound(text[i..e].to_owned(), i, e, vec![name]));
                    i = e;
                    continue;
                }
            }
        }

        // `#[...]` and `#Directive`.
        if c == '#' {
            match char_at(text, i + 1) {
                Some('[') => {
                    if let Some(be) = bracket_group_end(text, i + 1) {
                        let inner = idents_in(&text[i + 1..be]);
                        tokens.push(RawToken::compound(text[i..be].to_owned(), i, be, inner));
                        i = be;
                        continue;
                    }
                }
                Some(nc) if is_ident_char(nc) => {
                    let e = ident_end(text, i + 1);
                    let name = text[i + 1..e].to_owned();
                    tokens.push(RawToken::compound(text[i..e].to_owned(), i, e, vec![name]));
                    i = e;
                    continue;
                }
                _ => {}
            }
        }

        // Multi-character operator runs, then single operator characters.
        if let Some(run) = match_operator_run(&text[i..]) {
            tokens.push(RawToken::operator(run, i, i + run.len()));
            i += run.len();
            continue;
        }
        if is_operator_char(c) {
            let e = i + c.len_utf8();
            tokens.push(RawToken::operator(&text[i..e], i, e));
            i = e;
            continue;
        }

        i += c.len_utf8();
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[RawToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn scanning_is_deterministic_with_sane_offsets() {
        let input = "pub fn resolve(&self, path: &Path) -> Result<Vec<String>> { path.to_owned() }";
        let a = scan(input);
        let b = scan(input);
        assert_eq!(a, b);

        let mut last = 0;
        for tok in &a {
            assert!(tok.start <= tok.end);
            assert!(tok.end <= input.len());
            assert!(tok.start >= last, "offsets must be monotone");
            last = tok.start;
        }
    }

    #[test]
    fn type_annotation_is_one_token() {
        let tokens = scan("public class UserService : IUserService");
        assert!(texts(&tokens).contains(&": IUserService"));
        let anno = tokens.iter().find(|t| t.text == ": IUserService").unwrap();
        assert_eq!(anno.kind, RawKind::Compound);
        assert_eq!(anno.parts, vec!["IUserService"]);
    }

    #[test]
    fn annotation_without_space_normalizes() {
        let tokens = scan("let x:IFoo = make();");
        assert!(texts(&tokens).contains(&": IFoo"));
    }

    #[test]
    fn qualified_path_glues_into_one_token() {
        let tokens = scan("std::cout << value;");
        let glued = tokens.iter().find(|t| t.text == "std::cout").unwrap();
        assert_eq!(glued.parts, vec!["std", "cout"]);
        assert!(texts(&tokens).contains(&"<<"));
    }

    #[test]
    fn arrow_annotation_keeps_generic_cluster() {
        let tokens = scan("fn load() -> Result<Config> {");
        let anno = tokens.iter().find(|t| t.text == "-> Result<Config>").unwrap();
        assert_eq!(anno.parts, vec!["Result", "Config"]);
    }

    #[test]
    fn generic_cluster_emits_inner_identifiers() {
        let tokens = scan("List<string> items = new Dictionary<string,int>();");
        let list = tokens.iter().find(|t| t.text == "List<string>").unwrap();
        assert_eq!(list.parts, vec!["List", "string"]);
        let dict = tokens.iter().find(|t| t.text == "Dictionary<string,int>").unwrap();
        assert_eq!(dict.parts, vec!["Dictionary", "string", "int"]);
    }

    #[test]
    fn comparison_is_not_a_generic_cluster() {
        let tokens = scan("if a<b && c>d {");
        assert!(texts(&tokens).contains(&"a"));
        assert!(texts(&tokens).contains(&"&&"));
        assert!(!texts(&tokens).iter().any(|t| t.contains("a<b")));
    }

    #[test]
    fn attribute_is_preserved_with_inner_name() {
        let tokens = scan("[Fact]\npublic void Run() {}");
        let attr = tokens.iter().find(|t| t.text == "[Fact]").unwrap();
        assert_eq!(attr.kind, RawKind::Compound);
        assert_eq!(attr.parts, vec!["Fact"]);

        let tokens = scan("[InlineData(1, \"a\")]");
        let attr = tokens.iter().find(|t| t.text.starts_with("[InlineData")).unwrap();
        assert_eq!(attr.parts, vec!["InlineData"]);
    }

    #[test]
    fn decorators_and_rust_attributes_stay_intact() {
        let tokens = scan("@Injectable()\nclass Service {}");
        assert!(texts(&tokens).contains(&"@Injectable"));

        let tokens = scan("#[derive(Debug, Clone)]");
        let attr = tokens.iter().find(|t| t.text == "#[derive(Debug, Clone)]").unwrap();
        assert!(attr.parts.contains(&"derive".to_owned()));
        assert!(attr.parts.contains(&"Debug".to_owned()));
    }

    #[test]
    fn operator_runs_are_single_tokens() {
        for (input, run) in [
            ("a == b", "=="),
            ("x != y", "!="),
            ("p && q", "&&"),
            ("m || n", "||"),
            ("v <- chan", "<-"),
            ("xs |> map", "|>"),
            ("n := 1", ":="),
            ("i++", "++"),
            ("bits >>> 2", ">>>"),
            ("rest...", "..."),
        ] {
            let tokens = scan(input);
            assert!(
                texts(&tokens).contains(&run),
                "{input:?} should contain {run:?}, got {:?}",
                texts(&tokens)
            );
        }
    }

    #[test]
    fn spaced_lambda_arrow_stays_an_operator() {
        let tokens = scan("xs.Select(x => x.Id)");
        assert!(texts(&tokens).contains(&"=>"));
        assert!(texts(&tokens).contains(&"Select"));
    }
}
