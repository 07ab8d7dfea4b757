//! Token filters: identifier splitting, operator-preserving lowercasing
//! and the short-token drop.

use super::is_operator_char;

/// Split an identifier on camelCase/snake_case/kebab boundaries.
///
/// Boundaries are `_` and `-` separators, lower-to-upper transitions,
/// letter-to-digit transitions, and the end of an acronym run
/// (`ABCValue` splits into `ABC`, `Value`). Returns an empty vector when
/// the identifier has a single part, so callers can tell "nothing to
/// expand" from a real split.
pub(crate) fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = ident.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }

        let boundary = match chars.get(i.wrapping_sub(1)) {
            Some(&prev) if i > 0 => {
                let lower_to_upper = prev.is_lowercase() && c.is_uppercase();
                let letter_to_digit = prev.is_alphabetic() && c.is_numeric();
                // `ABCValue`: the last upper of a run starts a new word
                // when a lowercase letter follows it.
                let acronym_end = prev.is_uppercase()
                    && c.is_uppercase()
                    && matches!(chars.get(i + 1), Some(next) if next.is_lowercase());
                lower_to_upper || letter_to_digit || acronym_end
            }
            _ => false,
        };

        if boundary && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    // A single part identical to the input means there was no boundary;
    // a single differing part (separators stripped, as in `__init__`)
    // is still worth emitting.
    if parts.len() == 1 && parts[0] == ident {
        return Vec::new();
    }
    parts
}

/// Length filter: drop single-character tokens unless they contain an
/// operator character.
pub(crate) fn keep_token(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(_), Some(_)) => true,
        (Some(only), None) => is_operator_char(only),
        _ => false,
    }
}

/// Lowercase a token unless it contains an operator character; preserved
/// constructs like `: IFoo` and `List<string>` keep their case.
pub(crate) fn lowercase_preserving_operators(text: &str) -> String {
    if text.chars().any(is_operator_char) {
        text.to_owned()
    } else {
        text.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_splits_on_transitions() {
        assert_eq!(
            split_identifier("GetCurrentUserId"),
            vec!["Get", "Current", "User", "Id"]
        );
        assert_eq!(split_identifier("parseJson"), vec!["parse", "Json"]);
    }

    #[test]
    fn snake_and_kebab_case_split_on_separators() {
        assert_eq!(split_identifier("get_user_data"), vec!["get", "user", "data"]);
        assert_eq!(split_identifier("dry-run"), vec!["dry", "run"]);
        assert_eq!(split_identifier("__init__"), vec!["init"]);
    }

    #[test]
    fn acronym_runs_split_before_the_next_word() {
        assert_eq!(split_identifier("ABCValue"), vec!["ABC", "Value"]);
        assert_eq!(split_identifier("XMLHttpRequest"), vec!["XML", "Http", "Request"]);
        assert_eq!(split_identifier("HTML"), Vec::<String>::new());
    }

    #[test]
    fn digits_split_from_preceding_letters() {
        assert_eq!(split_identifier("sha256sum"), vec!["sha", "256sum"]);
    }

    #[test]
    fn single_part_identifiers_do_not_split() {
        assert_eq!(split_identifier("resolver"), Vec::<String>::new());
        assert_eq!(split_identifier("x"), Vec::<String>::new());
    }

    #[test]
    fn length_filter_keeps_operators_only() {
        assert!(!keep_token("x"));
        assert!(keep_token("xs"));
        assert!(keep_token("+"));
        assert!(keep_token("::"));
        assert!(!keep_token(""));
    }

    #[test]
    fn lowercasing_preserves_operator_tokens() {
        assert_eq!(lowercase_preserving_operators("UserService"), "userservice");
        assert_eq!(lowercase_preserving_operators(": IFoo"), ": IFoo");
        assert_eq!(lowercase_preserving_operators("List<string>"), "List<string>");
    }
}
