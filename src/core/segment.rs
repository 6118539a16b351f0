//! Splitting candidate answers into positional segments.

/// Number of segments the default weight vector covers.
pub const MAX_SEGMENTS: usize = 4;

/// Lazily yields the trimmed, non-empty, newline-separated segments of
/// `text`, stopping after `limit` segments.
pub fn split_segments(text: &str, limit: usize) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .take(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_lines_dropped_and_truncated() {
        let segments: Vec<_> = split_segments("a\n\nb\nc\nd\ne", MAX_SEGMENTS).collect();
        assert_eq!(segments, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_single_line() {
        let segments: Vec<_> = split_segments("  one answer  ", MAX_SEGMENTS).collect();
        assert_eq!(segments, vec!["one answer"]);
    }

    #[test]
    fn test_windows_line_endings_and_whitespace_lines() {
        let segments: Vec<_> = split_segments("first\r\n   \r\nsecond\r\n", MAX_SEGMENTS).collect();
        assert_eq!(segments, vec!["first", "second"]);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(split_segments("", MAX_SEGMENTS).count(), 0);
        assert_eq!(split_segments("\n \n\t\n", MAX_SEGMENTS).count(), 0);
    }
}
