//! Reply formatting for Telegram HTML
//!
//! The persona marks actions as `\...\`. Those spans become italics; anything
//! else the HTML parser could choke on is escaped. The output always carries
//! matched, non-nested `<i>` tags.

use lazy_regex::regex;
use std::borrow::Cow;

const OPEN_TAG: &str = "<i>";
const CLOSE_TAG: &str = "</i>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(Cow<'a, str>),
    Open,
    Close,
}

/// Format raw model output as Telegram HTML
#[must_use]
pub fn format_reply(raw: &str) -> String {
    balance(tokenize(raw))
}

fn tokenize(raw: &str) -> Vec<Token<'_>> {
    let special = regex!(r"(?i)</?i>|[\\*_`\[\]]");

    let delimiters = raw.matches('\\').count();
    // an odd delimiter count leaves the last backslash unpaired
    let paired = delimiters - delimiters % 2;
    let mut seen = 0usize;

    let mut tokens = Vec::new();
    let mut last = 0;
    for m in special.find_iter(raw) {
        if m.start() > last {
            tokens.push(Token::Text(html_escape::encode_text(&raw[last..m.start()])));
        }
        last = m.end();

        let token = match m.as_str() {
            "\\" => {
                seen += 1;
                if seen > paired {
                    Token::Text(Cow::Borrowed("\\"))
                } else if seen % 2 == 1 {
                    Token::Open
                } else {
                    Token::Close
                }
            }
            tag if tag.len() == OPEN_TAG.len() => Token::Open,
            tag if tag.len() == CLOSE_TAG.len() => Token::Close,
            markup => Token::Text(Cow::Owned(format!("\\{markup}"))),
        };
        tokens.push(token);
    }
    if last < raw.len() {
        tokens.push(Token::Text(html_escape::encode_text(&raw[last..])));
    }
    tokens
}

fn balance(tokens: Vec<Token<'_>>) -> String {
    let mut out = String::new();
    // byte offset of the currently open `<i>`
    let mut open_at: Option<usize> = None;

    for token in tokens {
        match token {
            Token::Text(text) => out.push_str(&text),
            Token::Open => {
                if open_at.is_none() {
                    open_at = Some(out.len());
                    out.push_str(OPEN_TAG);
                }
            }
            Token::Close => {
                if let Some(start) = open_at.take() {
                    if out.len() == start + OPEN_TAG.len() {
                        out.truncate(start);
                    } else {
                        out.push_str(CLOSE_TAG);
                    }
                }
            }
        }
    }

    if let Some(start) = open_at {
        out.replace_range(start..start + OPEN_TAG.len(), "");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_backslash_spans_become_italics() {
        assert_eq!(format_reply(r"\smiles\ Hello"), "<i>smiles</i> Hello");
    }

    #[test]
    fn test_markup_characters_are_escaped() {
        assert_eq!(format_reply(r"a \*hi\* b"), r"a <i>\*hi</i>\* b");
        assert_eq!(format_reply("x_y [z] `c`"), r"x\_y \[z\] \`c\`");
    }

    #[test]
    fn test_html_is_escaped() {
        assert_eq!(format_reply("1 < 2 & 3 > 2"), "1 &lt; 2 &amp; 3 &gt; 2");
        assert_eq!(format_reply("<b>bold</b>"), "&lt;b&gt;bold&lt;/b&gt;");
    }

    #[test]
    fn test_unpaired_trailing_backslash_stays_literal() {
        assert_eq!(format_reply(r"\a\ b\ c"), r"<i>a</i> b\ c");
        assert_eq!(format_reply(r"end\"), r"end\");
    }

    #[test]
    fn test_repeated_open_tags_collapse() {
        assert_eq!(format_reply("<i><i><i>x</i>"), "<i>x</i>");
    }

    #[test]
    fn test_stray_close_is_dropped() {
        assert_eq!(format_reply("a</i> b"), "a b");
    }

    #[test]
    fn test_unclosed_tag_is_removed() {
        assert_eq!(format_reply("<i>dangling"), "dangling");
        assert_eq!(format_reply(r"\one\ <i>two"), "<i>one</i> two");
    }

    #[test]
    fn test_empty_span_is_removed() {
        assert_eq!(format_reply(r"a \\ b"), "a  b");
        assert_eq!(format_reply("<i></i>x"), "x");
    }

    #[test]
    fn test_literal_tags_mix_with_delimiters() {
        assert_eq!(format_reply(r"<I>a\b\"), "<i>ab</i>");
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(format_reply("Hello there, Sire."), "Hello there, Sire.");
    }

    fn tags_balanced(html: &str) -> bool {
        let tags = regex!(r"</?i>");
        let mut depth = 0i32;
        for tag in tags.find_iter(html) {
            depth += if tag.as_str() == OPEN_TAG { 1 } else { -1 };
            if !(0..=1).contains(&depth) {
                return false;
            }
        }
        depth == 0
    }

    proptest! {
        #[test]
        fn prop_tags_always_balanced(raw in r"[a-z \\*_<>/&i]{0,40}") {
            prop_assert!(tags_balanced(&format_reply(&raw)));
        }

        #[test]
        fn prop_no_raw_angle_brackets_outside_tags(raw in r"[a-z <>&\\]{0,40}") {
            let out = format_reply(&raw);
            let stripped = regex!(r"</?i>").replace_all(&out, "");
            prop_assert!(!stripped.contains('<') && !stripped.contains('>'));
        }
    }
}
