//! Query sanitization.

/// Characters removed outright: they are significant to HTML and script
/// contexts and never needed for retrieval.
const STRIPPED: [char; 4] = ['<', '>', '"', '\''];

/// Strip markup-significant characters, collapse whitespace (control
/// characters count as whitespace) and truncate to `max_chars` characters.
///
/// The result has no leading or trailing whitespace and
/// `sanitize_query(&sanitize_query(x, n), n) == sanitize_query(x, n)`.
pub fn sanitize_query(input: &str, max_chars: usize) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}

/// Whether a sanitized query is long enough to be worth a retrieval call.
pub fn meets_min_length(sanitized: &str, min_chars: usize) -> bool {
    !sanitized.is_empty() && sanitized.chars().count() >= min_chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_markup_characters() {
        assert_eq!(
            sanitize_query(r#"<script>alert("hi")</script> refunds"#, 500),
            "scriptalert(hi)/script refunds"
        );
        assert_eq!(sanitize_query("it's \"quoted\"", 500), "its quoted");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            sanitize_query("  how\t\tdo\n\nrefunds   work  ", 500),
            "how do refunds work"
        );
        assert_eq!(sanitize_query("a\u{0}b", 500), "a b");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        assert_eq!(sanitize_query("héllo wörld", 7), "héllo w");
        assert_eq!(sanitize_query("hello world", 6), "hello");
        assert_eq!(sanitize_query("日本語のテキスト", 3), "日本語");
    }

    #[test]
    fn test_min_length() {
        assert!(!meets_min_length("", 0));
        assert!(!meets_min_length("ab", 3));
        assert!(meets_min_length("abc", 3));
        assert!(meets_min_length("日本語", 3));
    }

    proptest! {
        #[test]
        fn test_sanitize_is_idempotent(input in ".{0,300}", max in 1usize..200) {
            let once = sanitize_query(&input, max);
            let twice = sanitize_query(&once, max);
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.chars().count() <= max);
            prop_assert!(!once.contains(STRIPPED));
        }
    }
}
