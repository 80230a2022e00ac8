//! Boundary-aware truncation, counted in characters.

/// Cut points earlier than this fraction of the limit are not worth keeping;
/// the next, finer boundary kind is tried instead.
const MIN_KEEP_RATIO: usize = 2;

/// Byte offset just after the last sentence terminator in `text[..limit]`
/// that is followed by whitespace or the end of `text`.
pub(crate) fn last_sentence_end(text: &str, limit: usize) -> Option<usize> {
    let mut best = None;
    for (i, c) in text[..limit].char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let followed_by_space = match text[end..].chars().next() {
                None => true,
                Some(next) => next.is_whitespace(),
            };
            if followed_by_space {
                best = Some(end);
            }
        }
    }
    best
}

/// Byte offset of the `n`th character, or the length when shorter.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

/// Truncate `text` to at most `max_chars` characters, preferring a sentence
/// end, then a line end, then whitespace, then a hard cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let limit = byte_offset(text, max_chars);
    let floor = byte_offset(text, max_chars / MIN_KEEP_RATIO);
    let head = &text[..limit];

    let cut = last_sentence_end(text, limit)
        .filter(|&end| end >= floor)
        .or_else(|| head.rfind('\n').filter(|&pos| pos >= floor))
        .or_else(|| head.rfind(char::is_whitespace).filter(|&pos| pos >= floor))
        .unwrap_or(limit);

    head[..cut].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("", 0), "");
    }

    #[test]
    fn prefers_sentence_boundary() {
        let text = "First sentence here. Second sentence is longer than the rest.";
        assert_eq!(truncate(text, 40), "First sentence here.");
    }

    #[test]
    fn ignores_dots_inside_tokens() {
        let text = "see http://purl.org/ontology for details and more words here";
        let out = truncate(text, 30);
        assert!(!out.ends_with("purl."));
        assert!(out.chars().count() <= 30);
    }

    #[test]
    fn falls_back_to_line_then_whitespace() {
        let text = "line one without stop\nline two without stop either";
        assert_eq!(truncate(text, 30), "line one without stop");

        let text = "words without any line or sentence breaks at all";
        assert_eq!(truncate(text, 20), "words without any");
    }

    #[test]
    fn hard_cut_when_no_boundary() {
        assert_eq!(truncate("abcdefghijklmnop", 5), "abcde");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "ééééééééé";
        assert_eq!(truncate(text, 4).chars().count(), 4);
    }

    #[test]
    fn zero_budget_is_empty() {
        assert_eq!(truncate("something", 0), "");
    }
}
