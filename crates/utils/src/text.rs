/// Decode process output, replacing invalid UTF-8 sequences.
pub fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Return at most the last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_output_replaces_invalid_bytes() {
        let decoded = decode_output(b"ok \xff done");
        assert_eq!(decoded, "ok \u{fffd} done");
    }

    #[test]
    fn test_tail_chars_shorter_than_limit() {
        assert_eq!(tail_chars("abc", 10), "abc");
    }

    #[test]
    fn test_tail_chars_truncates_from_front() {
        assert_eq!(tail_chars("abcdef", 3), "def");
    }

    #[test]
    fn test_tail_chars_respects_multibyte_boundaries() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
    }

    #[test]
    fn test_tail_chars_zero() {
        assert_eq!(tail_chars("abc", 0), "");
    }
}
