//! Terminal-safe rendering of text that came from the backend or from
//! free-text notes fields.

use std::sync::LazyLock;

use regex::Regex;

const MAX_SERVER_TEXT_CHARS: usize = 512;

// CSI, OSC (BEL or ST terminated) and other ESC-introduced sequences.
static ESCAPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[PX^_][^\x1b]*\x1b\\|.)")
        .expect("escape regex")
});

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

/// One line, no escape sequences or control characters, capped in length.
pub fn sanitize_server_text(input: &str) -> String {
    single_line(input, MAX_SERVER_TEXT_CHARS)
}

/// Same cleaning with a caller-chosen cap, for table cells.
pub fn single_line(input: &str, max_chars: usize) -> String {
    let stripped = ESCAPES.replace_all(input, "");
    let mut out = String::with_capacity(stripped.len().min(max_chars));
    let mut count = 0usize;
    for c in stripped.chars() {
        let c = match c {
            '\t' | '\n' | '\r' => ' ',
            c if c.is_control() || is_bidi_control(c) => continue,
            c => c,
        };
        if count == max_chars {
            out.push_str("...");
            break;
        }
        out.push(c);
        count += 1;
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_and_title_sequences() {
        let input = "\u{1b}[31mNest not found\u{1b}[0m\u{1b}]0;pwned\u{7}";
        assert_eq!(sanitize_server_text(input), "Nest not found");
    }

    #[test]
    fn flattens_newlines_and_drops_bidi() {
        assert_eq!(sanitize_server_text("Tag\nKF-1\u{202e} in use"), "Tag KF-1 in use");
    }

    #[test]
    fn caps_length() {
        assert_eq!(single_line("abcdef", 3), "abc...");
        assert_eq!(single_line("abc", 3), "abc");
    }
}
