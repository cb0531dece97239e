//! Drives a full conversion run: segments the script, routes each segment to
//! a synthesis engine, and assembles per-group outputs into final files.
//!
//! Failure isolation is the rule here: one bad segment or group is logged
//! and skipped, never allowed to abort a long run. Only argument-shape
//! problems (no engines, unusable output directory) surface as errors.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use thiserror::Error;

use crate::backends::BackendRegistry;
use crate::merge::AudioMerger;
use crate::segmenter::{Segmenter, TagProblem, TextSegment};

/// Extension stamped onto final group files. Selecting `Mp3` only changes
/// the final name; transcoding is the backend's concern, not ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Wav,
    Mp3,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
        }
    }
}

/// Per-run knobs, owned by the caller.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    /// Engine used for segments that never saw a `<service=N>` tag.
    pub engine_index: i32,
    pub output_format: OutputFormat,
    /// Speaking rate, -10..10 around the engine's default.
    pub rate_value: f32,
    /// Volume, 0..100.
    pub volume_value: f32,
    pub output_dir: PathBuf,
    /// Keep per-segment files after a successful merge.
    pub retain_unmerged: bool,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            engine_index: 0,
            output_format: OutputFormat::Wav,
            rate_value: 0.0,
            volume_value: 100.0,
            output_dir: PathBuf::from("."),
            retain_unmerged: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("no synthesis backends registered")]
    EmptyRegistry,
    #[error("output directory {path} is unusable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a run produced, for the caller's post-hoc summary. An empty `files`
/// list is the "no audio produced at all" signal.
#[derive(Debug)]
pub struct ConversionReport {
    /// Final group output paths, ascending split order.
    pub files: Vec<PathBuf>,
    pub expected_groups: usize,
    pub failed_segments: usize,
    pub problems: Vec<TagProblem>,
}

pub struct Orchestrator {
    segmenter: Segmenter,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Segmenter::default())
    }
}

impl Orchestrator {
    pub fn new(segmenter: Segmenter) -> Self {
        Self { segmenter }
    }

    /// Run the whole pipeline over `text`. Checks `cancel` between segments
    /// and groups; on cancellation, already-produced files stay in place.
    pub async fn convert(
        &self,
        text: &str,
        settings: &ConversionSettings,
        registry: &BackendRegistry,
        merger: &dyn AudioMerger,
        cancel: &AtomicBool,
    ) -> Result<ConversionReport, ConvertError> {
        if registry.is_empty() {
            return Err(ConvertError::EmptyRegistry);
        }
        std::fs::create_dir_all(&settings.output_dir).map_err(|source| {
            ConvertError::OutputDir {
                path: settings.output_dir.clone(),
                source,
            }
        })?;

        let segmentation = self.segmenter.segment(text);
        for problem in &segmentation.problems {
            warn!(
                "tag problem at offset {}: {}",
                problem.position, problem.message
            );
        }

        let mut groups: BTreeMap<u32, Vec<TextSegment>> = BTreeMap::new();
        for segment in segmentation.segments {
            groups.entry(segment.split_index).or_default().push(segment);
        }

        let expected_groups = groups.len();
        let mut files: Vec<PathBuf> = Vec::new();
        let mut failed_segments = 0usize;

        'groups: for (split_index, segments) in &groups {
            if cancel.load(Ordering::Relaxed) {
                info!("conversion cancelled before group {}", split_index);
                break;
            }

            let base = format!("output_{:03}", split_index);
            let multi = segments.len() > 1;
            let mut produced: Vec<PathBuf> = Vec::new();

            for (emission, segment) in segments.iter().enumerate() {
                if cancel.load(Ordering::Relaxed) {
                    info!(
                        "conversion cancelled at group {} segment {}",
                        split_index, emission
                    );
                    break 'groups;
                }

                let stem = if multi {
                    format!("{}{}", base, letter_suffix(emission))
                } else {
                    base.clone()
                };
                let out_no_ext = settings.output_dir.join(&stem);

                match self
                    .render_segment(segment, &out_no_ext, settings, registry)
                    .await
                {
                    Ok(path) => produced.push(path),
                    Err(e) => {
                        error!(
                            "group {} segment {} failed: {}",
                            split_index, segment.sub_index, e
                        );
                        failed_segments += 1;
                    }
                }
            }

            let final_path = settings
                .output_dir
                .join(format!("{}.{}", base, settings.output_format.extension()));

            if let Some(path) = self
                .finish_group(*split_index, produced, &final_path, settings, merger)
                .await
            {
                files.push(path);
            }
        }

        info!(
            "created {} of {} expected output files ({} segment failures)",
            files.len(),
            expected_groups,
            failed_segments
        );

        Ok(ConversionReport {
            files,
            expected_groups,
            failed_segments,
            problems: segmentation.problems,
        })
    }

    /// Resolve the engine for one segment and render it, verifying the
    /// engine actually produced the file it reported.
    async fn render_segment(
        &self,
        segment: &TextSegment,
        out_no_ext: &Path,
        settings: &ConversionSettings,
        registry: &BackendRegistry,
    ) -> io::Result<PathBuf> {
        let index = if segment.service_index >= 0 {
            segment.service_index
        } else {
            settings.engine_index
        };

        let backend = registry.get(index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no synthesis engine at index {}", index),
            )
        })?;

        if !backend.is_configured() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("engine '{}' is not configured", backend.name()),
            ));
        }

        backend.convert_to_audio(segment, out_no_ext, settings).await?;

        let path = out_no_ext.with_extension(backend.output_extension());
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "engine '{}' reported success but produced no file at {}",
                    backend.name(),
                    path.display()
                ),
            ));
        }
        Ok(path)
    }

    /// Merge, rename, or skip one group's produced files. Returns the final
    /// path when the group yielded output.
    async fn finish_group(
        &self,
        split_index: u32,
        produced: Vec<PathBuf>,
        final_path: &Path,
        settings: &ConversionSettings,
        merger: &dyn AudioMerger,
    ) -> Option<PathBuf> {
        match produced.len() {
            0 => {
                info!("group {}: no output produced, skipping", split_index);
                None
            }
            1 => {
                let single = produced.into_iter().next().unwrap();
                if single.as_path() == final_path {
                    return Some(single);
                }
                match std::fs::rename(&single, final_path) {
                    Ok(()) => Some(final_path.to_path_buf()),
                    Err(e) => {
                        warn!(
                            "group {}: could not rename {} to {}: {}",
                            split_index,
                            single.display(),
                            final_path.display(),
                            e
                        );
                        // The rendered file still exists; hand it back as-is.
                        Some(single)
                    }
                }
            }
            _ => match merger.merge_files(&produced, final_path).await {
                Ok(()) => {
                    if !settings.retain_unmerged {
                        for file in &produced {
                            if let Err(e) = std::fs::remove_file(file) {
                                warn!("could not delete {}: {}", file.display(), e);
                            }
                        }
                    }
                    Some(final_path.to_path_buf())
                }
                Err(e) => {
                    error!(
                        "group {}: merge of {} files failed: {}",
                        split_index,
                        produced.len(),
                        e
                    );
                    None
                }
            },
        }
    }
}

/// Emission-order suffix for multi-segment groups: a..z, then aa, ab, ...
fn letter_suffix(index: usize) -> String {
    if index < 26 {
        ((b'a' + index as u8) as char).to_string()
    } else {
        let first = (index / 26 - 1).min(25);
        let second = index % 26;
        format!(
            "{}{}",
            (b'a' + first as u8) as char,
            (b'a' + second as u8) as char
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_suffixes_follow_emission_order() {
        assert_eq!(letter_suffix(0), "a");
        assert_eq!(letter_suffix(1), "b");
        assert_eq!(letter_suffix(25), "z");
        assert_eq!(letter_suffix(26), "aa");
        assert_eq!(letter_suffix(27), "ab");
    }

    #[test]
    fn output_names_are_zero_padded() {
        assert_eq!(format!("output_{:03}", 7u32), "output_007");
        assert_eq!(format!("output_{:03}", 123u32), "output_123");
    }

    #[test]
    fn format_extensions() {
        assert_eq!(OutputFormat::Wav.extension(), "wav");
        assert_eq!(OutputFormat::Mp3.extension(), "mp3");
    }
}
