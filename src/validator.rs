//! Well-formedness checking for the script tag grammar.
//!
//! Runs on the raw text, independent of segmentation. Problems are data:
//! nothing here ever fails, the caller gets ordered error and warning lists
//! with byte-accurate positions.

use serde::{Deserialize, Serialize};

use crate::tags::{scan, TagKind};

/// Tags the validator recognizes: SSML markup plus the control family.
const VALID_TAGS: &[&str] = &[
    "speak", "emphasis", "break", "prosody", "say-as", "phoneme", "sub", "audio", "p", "s",
    "voice", "mark", "desc", "lexicon", "metadata", "meta", "split", "service", "label", "vid",
    "comment",
];

/// Tags that are conventionally written self-closed.
const SELF_CLOSING_TAGS: &[&str] = &["break", "phoneme", "audio", "mark", "meta"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsmlError {
    pub message: String,
    /// Byte offset into the validated text.
    pub position: usize,
    pub length: usize,
    /// Best-effort snippet or reason.
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<SsmlError>,
    pub warnings: Vec<String>,
}

struct OpenTag {
    name: String,
    position: usize,
}

/// Validate the tag structure of `text`.
pub fn validate(text: &str) -> ValidationResult {
    let mut errors: Vec<SsmlError> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut stack: Vec<OpenTag> = Vec::new();

    for token in scan(text) {
        let name = token.name.as_str();

        if !VALID_TAGS.contains(&name) {
            errors.push(SsmlError {
                message: format!("Unknown tag: <{}>", name),
                position: token.position,
                length: token.len,
                context: text[token.position..token.position + token.len].to_string(),
            });
            continue;
        }

        // Comments carry arbitrary payloads; never validated, never nested.
        if name == "comment" {
            continue;
        }

        match token.kind {
            TagKind::Control => {}
            TagKind::SelfClosing => {
                if !SELF_CLOSING_TAGS.contains(&name) {
                    warnings.push(format!("Tag <{}> is not typically self-closing", name));
                }
            }
            TagKind::Closing => match stack.pop() {
                None => errors.push(SsmlError {
                    message: format!("Closing tag </{}> has no matching opening tag", name),
                    position: token.position,
                    length: token.len,
                    context: text[token.position..token.position + token.len].to_string(),
                }),
                Some(open) => {
                    if open.name != name {
                        errors.push(SsmlError {
                            message: format!(
                                "Mismatched closing tag: expected </{}>, found </{}>",
                                open.name, name
                            ),
                            position: token.position,
                            length: token.len,
                            context: format!("Opened at position {}", open.position),
                        });
                        // Leave the opener in place: a single stray closer
                        // must not cascade into errors for everything below.
                        stack.push(open);
                    }
                }
            },
            TagKind::Opening => {
                if SELF_CLOSING_TAGS.contains(&name) {
                    warnings.push(format!(
                        "Tag <{}> should be self-closing (use <{} />)",
                        name, name
                    ));
                }
                stack.push(OpenTag {
                    name: token.name.clone(),
                    position: token.position,
                });
                check_attributes(name, &token.attributes, token.position, &mut errors);
            }
        }
    }

    // Anything still open never closed; report most-recently-opened first.
    while let Some(open) = stack.pop() {
        errors.push(SsmlError {
            message: format!("Unclosed tag: <{}> at position {}", open.name, open.position),
            position: open.position,
            length: open.name.len() + 2,
            context: "Tag was never closed".to_string(),
        });
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_attributes(name: &str, attributes: &str, position: usize, errors: &mut Vec<SsmlError>) {
    match name {
        "say-as" => {
            if !attributes.contains("interpret-as") {
                errors.push(SsmlError {
                    message: "<say-as> tag missing required 'interpret-as' attribute".to_string(),
                    position,
                    length: name.len() + 2,
                    context: "Required: interpret-as=\"type\"".to_string(),
                });
            }
        }
        "sub" => {
            if !attributes.contains("alias") {
                errors.push(SsmlError {
                    message: "<sub> tag missing required 'alias' attribute".to_string(),
                    position,
                    length: name.len() + 2,
                    context: "Required: alias=\"replacement text\"".to_string(),
                });
            }
        }
        _ => {}
    }

    if !attributes.trim().is_empty() {
        let singles = attributes.chars().filter(|&c| c == '\'').count();
        let doubles = attributes.chars().filter(|&c| c == '"').count();
        if singles % 2 != 0 || doubles % 2 != 0 {
            errors.push(SsmlError {
                message: format!("Unpaired quotes in attributes for <{}>", name),
                position,
                length: name.len() + attributes.len() + 2,
                context: attributes.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_pairs_are_valid() {
        let result = validate("<speak><p><s>Hello</s></p></speak>");
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn control_tags_are_accepted_silently() {
        let result = validate("<voice=2>Hi<split><service=1>there<label=5><vid=me>");
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let result = validate("Hello <frobnicate>world</frobnicate>");
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .all(|e| e.message.contains("frobnicate")));
        // The closer is also unknown; neither touches the stack.
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn removing_a_closer_reports_the_opener_position() {
        let valid = validate("<speak><emphasis>a</emphasis></speak>");
        assert!(valid.is_valid);

        let broken = validate("<speak><emphasis>a</speak>");
        // One mismatch for </speak> against <emphasis>, then both unclosed.
        assert!(!broken.is_valid);
        let unclosed: Vec<_> = broken
            .errors
            .iter()
            .filter(|e| e.message.starts_with("Unclosed"))
            .collect();
        assert_eq!(unclosed.len(), 2);
        // Most-recently-opened first.
        assert!(unclosed[0].message.contains("<emphasis> at position 7"));
        assert_eq!(unclosed[0].position, 7);
    }

    #[test]
    fn stray_closer_does_not_cascade() {
        let result = validate("<speak><emphasis>a</prosody>b</emphasis></speak>");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0]
            .message
            .contains("expected </emphasis>, found </prosody>"));
        assert!(result.errors[0].context.contains("Opened at position 7"));
    }

    #[test]
    fn closer_with_empty_stack_is_an_error() {
        let result = validate("plain </emphasis> text");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0]
            .message
            .contains("has no matching opening tag"));
        assert_eq!(result.errors[0].position, 6);
    }

    #[test]
    fn say_as_requires_interpret_as() {
        let missing = validate("<say-as>5</say-as>");
        assert_eq!(missing.errors.len(), 1);
        assert!(missing.errors[0].message.contains("interpret-as"));

        let present = validate("<say-as interpret-as=\"cardinal\">5</say-as>");
        assert!(present.is_valid);
    }

    #[test]
    fn sub_requires_alias() {
        let missing = validate("<sub>W3C</sub>");
        assert_eq!(missing.errors.len(), 1);
        assert!(missing.errors[0].message.contains("alias"));

        let present = validate("<sub alias=\"World Wide Web Consortium\">W3C</sub>");
        assert!(present.is_valid);
    }

    #[test]
    fn unpaired_quotes_are_an_error() {
        let result = validate("<prosody rate=\"slow>text</prosody>");
        assert!(result
            .errors
            .iter()
            .any(|e| e.message.contains("Unpaired quotes")));
    }

    #[test]
    fn break_written_as_opener_warns_but_still_nests() {
        let result = validate("<break>");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("should be self-closing"));
        // It was written as an opener, so it is tracked as one.
        assert!(result.errors[0].message.starts_with("Unclosed tag: <break>"));

        let closed = validate("<break>x</break>");
        assert!(closed.is_valid);
        assert_eq!(closed.warnings.len(), 1);
    }

    #[test]
    fn self_closed_break_is_silent() {
        let result = validate("a<break/>b<break />c");
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn self_closed_paired_tag_warns() {
        let result = validate("<emphasis/>");
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("not typically self-closing"));
    }

    #[test]
    fn warnings_never_affect_validity() {
        let result = validate("<break><emphasis/>x</break>");
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn comment_payloads_are_ignored() {
        let result = validate("<comment=\"anything at all\">ok<comment=bare>");
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }
}
