use super::{SynthesisBackend, VoiceInfo};

use std::io::{Error, ErrorKind, Result, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use wait_timeout::ChildExt;

use crate::convert::ConversionSettings;
use crate::segmenter::TextSegment;

const FALLBACK_VOICE: &str = "en_US-lessac-medium";

pub struct PiperBackend {
    binary_path: String,
    models_dir: PathBuf,
    timeout: Duration,
}

impl PiperBackend {
    pub fn new() -> Self {
        let defaults_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local/share/piper/models");

        let (binary_path, models_dir, timeout_secs) = {
            match crate::config_loader::SETTINGS.read() {
                Ok(s) => {
                    let dir = if s.piper_models_dir.is_empty() {
                        defaults_dir
                    } else {
                        PathBuf::from(&s.piper_models_dir)
                    };
                    (s.piper_binary.clone(), dir, s.synth_timeout_secs)
                }
                Err(_) => ("piper".to_string(), defaults_dir, 30),
            }
        };

        Self {
            binary_path,
            models_dir,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn find_model(&self, voice_id: &str) -> Option<PathBuf> {
        let onnx = self.models_dir.join(format!("{}.onnx", voice_id));
        let config = self.models_dir.join(format!("{}.onnx.json", voice_id));
        (onnx.exists() && config.exists()).then_some(onnx)
    }

    fn parse_voice_metadata(&self, config_path: &Path, voice_id: &str) -> VoiceInfo {
        let mut voice = VoiceInfo {
            display_name: voice_id.replace('_', " "),
            voice_id: voice_id.to_string(),
            language_code: "unknown".to_string(),
            engine: "piper".to_string(),
        };

        if let Ok(content) = std::fs::read_to_string(config_path) {
            if let Ok(json) = serde_json::from_str::<Value>(&content) {
                if let Some(quality) = json
                    .get("audio")
                    .and_then(|a| a.get("quality"))
                    .and_then(|q| q.as_str())
                {
                    voice.display_name = format!("{} ({})", voice_id.replace('_', " "), quality);
                }

                if let Some(espeak_voice) = json
                    .get("espeak")
                    .and_then(|e| e.get("voice"))
                    .and_then(|v| v.as_str())
                {
                    voice.language_code = espeak_voice.to_string();
                }
            }
        }

        voice
    }

    fn resolve_voice(&self, segment: &TextSegment) -> String {
        if let Some(id) = &segment.custom_voice_id {
            return id.clone();
        }
        self.list_voices()
            .ok()
            .and_then(|voices| {
                usize::try_from(segment.voice_index)
                    .ok()
                    .and_then(|i| voices.get(i).map(|v| v.voice_id.clone()))
            })
            .unwrap_or_else(|| FALLBACK_VOICE.to_string())
    }

    fn run_synthesis(
        binary: &str,
        model: &Path,
        out_path: &Path,
        timeout: Duration,
        text: &str,
    ) -> Result<()> {
        let mut child = Command::new(binary)
            .arg("-m")
            .arg(model)
            .arg("--output_file")
            .arg(out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Write text to stdin and close it so piper sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
            stdin.write_all(b"\n")?;
        }

        match child.wait_timeout(timeout)? {
            Some(status) => {
                if status.success() {
                    Ok(())
                } else {
                    let output = child.wait_with_output()?;
                    let err = String::from_utf8_lossy(&output.stderr).into_owned();
                    Err(Error::new(ErrorKind::Other, format!("piper error: {}", err)))
                }
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::new(
                    ErrorKind::TimedOut,
                    format!("piper timed out after {:?}", timeout),
                ))
            }
        }
    }
}

impl Default for PiperBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisBackend for PiperBackend {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn is_configured(&self) -> bool {
        self.list_voices().map(|v| !v.is_empty()).unwrap_or(false)
    }

    fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let mut voices = Vec::new();

        if self.models_dir.exists() {
            if let Ok(entries) = std::fs::read_dir(&self.models_dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|s| s.to_str()) != Some("onnx") {
                        continue;
                    }
                    if let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) {
                        let config_path = path.with_extension("onnx.json");
                        if config_path.exists() {
                            voices.push(self.parse_voice_metadata(&config_path, file_stem));
                        } else {
                            voices.push(VoiceInfo {
                                display_name: file_stem.replace('_', " "),
                                voice_id: file_stem.to_string(),
                                language_code: "unknown".to_string(),
                                engine: "piper".to_string(),
                            });
                        }
                    }
                }
            }
        }

        // Stable order so voice indices mean the same thing across runs.
        voices.sort_by(|a, b| a.voice_id.cmp(&b.voice_id));

        Ok(voices)
    }

    async fn convert_to_audio(
        &self,
        segment: &TextSegment,
        output_no_ext: &Path,
        _settings: &ConversionSettings,
    ) -> Result<()> {
        let voice_id = self.resolve_voice(segment);

        let model = self.find_model(&voice_id).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("piper model not found locally for voice: {}", voice_id),
            )
        })?;

        let binary = self.binary_path.clone();
        let timeout = self.timeout;
        let text = segment.text.clone();
        let out_path = output_no_ext.with_extension(self.output_extension());

        debug!(
            "piper: {} chars -> {} (model {})",
            text.len(),
            out_path.display(),
            model.display()
        );

        tokio::task::spawn_blocking(move || {
            Self::run_synthesis(&binary, &model, &out_path, timeout, &text)
        })
        .await
        .map_err(|e| Error::new(ErrorKind::Other, format!("synthesis task failed: {}", e)))?
    }
}
