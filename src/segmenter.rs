//! Partitions a script into renderable segments.
//!
//! `<split>` boundaries open a new output group, `<label=N>` renumbers the
//! group, and `<voice=N>`/`<service=N>`/`<vid=id>` switch the speaker state
//! carried by every segment that follows. Tag values are 1-based in source
//! text and stored 0-based.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::tags::strip_comments;

/// Backend index selected when `<vid=...>` appears before any `<service=N>`.
/// Matches the position of the engine that accepts raw voice ids in the
/// conventional engine list.
pub const VID_DEFAULT_SERVICE: i32 = 3;

lazy_static! {
    static ref SPLIT_RE: Regex = Regex::new(r"(?i)<split\s*/?>").unwrap();
    static ref LABEL_RE: Regex = Regex::new(r"(?i)^\s*<label=(\d+)>").unwrap();
    static ref STATE_RE: Regex = Regex::new(r"(?i)<(voice|service|vid)=([^>]+)>").unwrap();
}

/// One contiguous run of speakable text plus its routing state.
///
/// Control tags are already removed from `text`; SSML markup stays in and is
/// passed through to the synthesis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    /// Zero-based index into the engine's voice list.
    pub voice_index: i32,
    /// Zero-based engine index; -1 means "use the caller's default engine".
    pub service_index: i32,
    /// Raw voice id from `<vid=...>`; takes precedence over `voice_index`.
    pub custom_voice_id: Option<String>,
    /// Output-group number, starting at 1.
    pub split_index: u32,
    /// Order of this segment within its group.
    pub sub_index: u32,
    /// Set when the group began with an explicit `<label=N>`.
    pub label_number: Option<u32>,
}

impl Default for TextSegment {
    fn default() -> Self {
        Self {
            text: String::new(),
            voice_index: 0,
            service_index: -1,
            custom_voice_id: None,
            split_index: 1,
            sub_index: 0,
            label_number: None,
        }
    }
}

/// A control tag whose value could not be used. Segmentation continues with
/// the prior state; the occurrence is reported here instead of being
/// silently defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagProblem {
    pub message: String,
    /// Byte offset of the offending tag in the comment-stripped text.
    pub position: usize,
}

/// Output of one segmentation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub segments: Vec<TextSegment>,
    pub problems: Vec<TagProblem>,
}

/// Running speaker state threaded through one segmentation pass. A tag's
/// effect persists until overridden, including across `<split>` boundaries.
#[derive(Debug, Clone)]
struct SpeakerState {
    voice_index: i32,
    service_index: i32,
    custom_voice_id: Option<String>,
}

impl Default for SpeakerState {
    fn default() -> Self {
        Self {
            voice_index: 0,
            service_index: -1,
            custom_voice_id: None,
        }
    }
}

pub struct Segmenter {
    vid_default_service: i32,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(VID_DEFAULT_SERVICE)
    }
}

impl Segmenter {
    pub fn new(vid_default_service: i32) -> Self {
        Self {
            vid_default_service,
        }
    }

    /// Compile `text` into an ordered segment list.
    pub fn segment(&self, text: &str) -> Segmentation {
        let stripped = strip_comments(text);

        let mut segments: Vec<TextSegment> = Vec::new();
        let mut problems: Vec<TagProblem> = Vec::new();
        let mut state = SpeakerState::default();
        let mut current_output: u32 = 1;

        for (part, part_start) in split_parts(&stripped) {
            // Blank boundary parts produce nothing and consume no index.
            if part.trim().is_empty() {
                continue;
            }

            let mut label_number = None;
            let mut body = part;
            let mut base = part_start;

            if let Some(caps) = LABEL_RE.captures(part) {
                let whole = caps.get(0).unwrap();
                match caps[1].parse::<u32>() {
                    Ok(n) if n >= 1 => {
                        label_number = Some(n);
                        current_output = n;
                    }
                    _ => problems.push(TagProblem {
                        message: format!("label number '{}' is not a positive integer", &caps[1]),
                        position: part_start + whole.start(),
                    }),
                }
                body = &part[whole.end()..];
                base += whole.end();
            }

            self.emit_runs(
                body,
                base,
                current_output,
                label_number,
                &mut state,
                &mut segments,
                &mut problems,
            );

            current_output = current_output.saturating_add(1);
        }

        // Empty or whitespace-only document: one segment, default routing.
        if segments.is_empty() {
            segments.push(TextSegment {
                text: stripped,
                ..TextSegment::default()
            });
        }

        debug!(
            "segmented into {} segment(s), {} problem(s)",
            segments.len(),
            problems.len()
        );

        Segmentation { segments, problems }
    }

    /// Scan one split part for voice/service/vid changes, emitting a segment
    /// for every text run with the state as it stood when the run started.
    #[allow(clippy::too_many_arguments)]
    fn emit_runs(
        &self,
        body: &str,
        base: usize,
        output_number: u32,
        label_number: Option<u32>,
        state: &mut SpeakerState,
        segments: &mut Vec<TextSegment>,
        problems: &mut Vec<TagProblem>,
    ) {
        let mut sub_index: u32 = 0;
        let mut last_end = 0;

        let mut push_run = |run: &str, sub: &mut u32, state: &SpeakerState| {
            let clean = run.trim();
            if clean.is_empty() {
                return;
            }
            segments.push(TextSegment {
                text: clean.to_string(),
                voice_index: state.voice_index,
                service_index: state.service_index,
                custom_voice_id: state.custom_voice_id.clone(),
                split_index: output_number,
                sub_index: *sub,
                label_number,
            });
            *sub += 1;
        };

        for caps in STATE_RE.captures_iter(body) {
            let whole = caps.get(0).unwrap();
            push_run(&body[last_end..whole.start()], &mut sub_index, state);

            let tag = caps[1].to_lowercase();
            let value = caps[2].trim_matches(|c| c == '"' || c == ' ').to_string();
            let position = base + whole.start();

            match tag.as_str() {
                "voice" => match value.parse::<i32>() {
                    Ok(n) if n >= 1 => {
                        state.voice_index = n - 1;
                        state.custom_voice_id = None;
                    }
                    _ => problems.push(TagProblem {
                        message: format!("voice number '{}' is not a positive integer", value),
                        position,
                    }),
                },
                "service" => match value.parse::<i32>() {
                    Ok(n) if n >= 1 => state.service_index = n - 1,
                    _ => problems.push(TagProblem {
                        message: format!("service number '{}' is not a positive integer", value),
                        position,
                    }),
                },
                "vid" => {
                    if value.is_empty() {
                        problems.push(TagProblem {
                            message: "vid tag requires a voice id".to_string(),
                            position,
                        });
                    } else {
                        state.custom_voice_id = Some(value);
                        if state.service_index < 0 {
                            state.service_index = self.vid_default_service;
                        }
                    }
                }
                _ => unreachable!(),
            }

            last_end = whole.end();
        }

        push_run(&body[last_end..], &mut sub_index, state);
    }
}

/// Split on `<split>` boundaries, keeping each part's byte offset into the
/// stripped text.
fn split_parts(text: &str) -> Vec<(&str, usize)> {
    let mut parts = Vec::new();
    let mut start = 0;
    for m in SPLIT_RE.find_iter(text) {
        parts.push((&text[start..m.start()], start));
        start = m.end();
    }
    parts.push((&text[start..], start));
    parts
}
