//! Tag scanning for narration scripts.
//!
//! Scripts mix two tag families: control tags (`<split>`, `<voice=2>`,
//! `<service=1>`, `<label=10>`, `<vid=name>`, `<comment=...>`) and ordinary
//! SSML markup (`<emphasis>`, `<break/>`, ...). The scanner finds every tag
//! occurrence and classifies it; comment stripping and `<delay=Xsec>`
//! extraction live here too since they run before segmentation.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Unified pattern for both tag families. Tag names may contain hyphens
    // (say-as) and digits; values (`name=value`) stop at the closing '>'.
    static ref TAG_RE: Regex =
        Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)(?:=([^>]*?))?(\s+[^>]*?)?\s*(/?)>").unwrap();

    // Comments come in a quoted and an unquoted form. The quoted form may
    // contain '>' inside the quotes, so it must be removed first.
    static ref COMMENT_QUOTED_RE: Regex =
        Regex::new(r#"(?i)<comment\s*=\s*"[^"]*">"#).unwrap();
    static ref COMMENT_BARE_RE: Regex =
        Regex::new(r"(?i)<comment\s*=\s*[^>]+>").unwrap();

    static ref DELAY_RE: Regex =
        Regex::new(r"(?i)<\s*delay\s*=\s*([0-9]*\.?[0-9]+)\s*sec\s*>").unwrap();
}

/// Control tags that carry a `name=value` payload. Together with `split`
/// they never have a closing form.
const VALUE_CONTROL_TAGS: &[&str] = &["voice", "service", "label", "vid", "comment"];

/// How a tag occurrence participates in nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Routing/output instruction; never nests.
    Control,
    Opening,
    Closing,
    SelfClosing,
}

/// One tag occurrence in a text buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TagToken {
    /// Lowercased tag name.
    pub name: String,
    pub kind: TagKind,
    /// Payload of the `name=value` control syntax, if present.
    pub value: Option<String>,
    /// Raw attribute string (everything after the name, before any `/>`).
    pub attributes: String,
    /// Byte offset of the `<` in the input.
    pub position: usize,
    /// Length of the full tag text.
    pub len: usize,
}

/// Find and classify every tag occurrence in `text`, in document order.
pub fn scan(text: &str) -> Vec<TagToken> {
    let mut tokens = Vec::new();

    for caps in TAG_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let closing = &caps[1] == "/";
        let name = caps[2].to_lowercase();
        let value = caps.get(3).map(|m| m.as_str().to_string());
        let attributes = caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string();
        let self_closed = caps.get(5).map(|m| m.as_str()) == Some("/");

        // Value-carrying control tags and <split> have no closing form,
        // whatever the author wrote after them.
        let kind = if (value.is_some() && VALUE_CONTROL_TAGS.contains(&name.as_str()))
            || name == "split"
        {
            TagKind::Control
        } else if closing {
            TagKind::Closing
        } else if self_closed {
            TagKind::SelfClosing
        } else {
            TagKind::Opening
        };

        tokens.push(TagToken {
            name,
            kind,
            value,
            attributes,
            position: whole.start(),
            len: whole.len(),
        });
    }

    tokens
}

/// Remove every `<comment=...>` span. Runs before segmentation so comment
/// bodies never leak into segment text. Idempotent; no error conditions.
pub fn strip_comments(text: &str) -> String {
    let text = COMMENT_QUOTED_RE.replace_all(text, "");
    COMMENT_BARE_RE.replace_all(&text, "").into_owned()
}

/// Sum every `<delay=Xsec>` tag in `text` and strip them, returning the
/// total delay in seconds and the cleaned text.
pub fn extract_delay(text: &str) -> (f64, String) {
    let mut total = 0.0;
    for caps in DELAY_RE.captures_iter(text) {
        if let Ok(secs) = caps[1].parse::<f64>() {
            total += secs;
        }
    }
    (total, DELAY_RE.replace_all(text, "").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_classifies_both_families() {
        let tokens = scan("<voice=2>Hi <emphasis level=\"strong\">there</emphasis><break/>");
        assert_eq!(tokens.len(), 4);

        assert_eq!(tokens[0].name, "voice");
        assert_eq!(tokens[0].kind, TagKind::Control);
        assert_eq!(tokens[0].value.as_deref(), Some("2"));

        assert_eq!(tokens[1].name, "emphasis");
        assert_eq!(tokens[1].kind, TagKind::Opening);
        assert!(tokens[1].attributes.contains("level"));

        assert_eq!(tokens[2].kind, TagKind::Closing);
        assert_eq!(tokens[3].kind, TagKind::SelfClosing);
    }

    #[test]
    fn scan_reports_positions() {
        let tokens = scan("abc<split>def</p>");
        assert_eq!(tokens[0].position, 3);
        assert_eq!(tokens[0].len, "<split>".len());
        assert_eq!(tokens[1].position, 13);
    }

    #[test]
    fn split_is_control_even_when_self_closed() {
        let tokens = scan("<split/>");
        assert_eq!(tokens[0].kind, TagKind::Control);
    }

    #[test]
    fn ssml_voice_with_attributes_is_an_opener() {
        let tokens = scan("<voice name=\"en-US\">x</voice>");
        assert_eq!(tokens[0].kind, TagKind::Opening);
        assert!(tokens[0].value.is_none());
    }

    #[test]
    fn strip_removes_quoted_and_bare_comments() {
        let out = strip_comments("a<comment=\"note > with bracket\">b<COMMENT=plain note>c");
        assert_eq!(out, "abc");
    }

    #[test]
    fn strip_is_idempotent() {
        let input = "x<comment=one>y<comment=\"two\">z";
        let once = strip_comments(input);
        assert_eq!(strip_comments(&once), once);
        assert!(!once.contains("<comment"));
    }

    #[test]
    fn delay_tags_are_summed_and_stripped() {
        let (total, clean) = extract_delay("<delay=1.5sec>Hello<Delay = 2 sec> world");
        assert!((total - 3.5).abs() < 1e-9);
        assert_eq!(clean, "Hello world");
    }

    #[test]
    fn no_delay_is_zero() {
        let (total, clean) = extract_delay("plain text");
        assert_eq!(total, 0.0);
        assert_eq!(clean, "plain text");
    }
}
