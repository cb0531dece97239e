use super::{SynthesisBackend, VoiceInfo};

use std::io::{Error, ErrorKind, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use wait_timeout::ChildExt;

use crate::convert::ConversionSettings;
use crate::segmenter::TextSegment;

pub struct EspeakBackend {
    binary: String,
    timeout: Duration,
    available: bool,
}

impl EspeakBackend {
    pub fn new() -> Self {
        let (binary, timeout_secs) = {
            let settings = crate::config_loader::SETTINGS.read();
            match settings {
                Ok(s) => (s.espeak_binary.clone(), s.synth_timeout_secs),
                Err(_) => ("espeak-ng".to_string(), 30),
            }
        };

        // Probe once; per-segment checks must not spawn extra processes.
        let available = Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

        Self {
            binary,
            timeout: Duration::from_secs(timeout_secs),
            available,
        }
    }

    /// Map the caller's rate (-10..10) onto espeak words-per-minute and the
    /// volume (0..100) onto espeak amplitude (0..200).
    fn speed_args(settings: &ConversionSettings) -> (i32, i32) {
        let speed = (175.0 + settings.rate_value * 10.0).clamp(80.0, 450.0) as i32;
        let amplitude = (settings.volume_value * 2.0).clamp(0.0, 200.0) as i32;
        (speed, amplitude)
    }

    fn resolve_voice(&self, segment: &TextSegment) -> Option<String> {
        if let Some(id) = &segment.custom_voice_id {
            return Some(id.clone());
        }
        let voices = self.list_voices().ok()?;
        usize::try_from(segment.voice_index)
            .ok()
            .and_then(|i| voices.get(i))
            .map(|v| v.voice_id.clone())
    }

    fn run_synthesis(
        binary: &str,
        timeout: Duration,
        voice: Option<&str>,
        speed: i32,
        amplitude: i32,
        text: &str,
    ) -> Result<Vec<u8>> {
        let mut cmd = Command::new(binary);
        cmd.arg("--stdout")
            .arg("-s")
            .arg(speed.to_string())
            .arg("-a")
            .arg(amplitude.to_string());
        if let Some(v) = voice {
            cmd.arg("-v").arg(v);
        }
        let mut child = cmd
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        match child.wait_timeout(timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                if status.success() {
                    Ok(output.stdout)
                } else {
                    let err_msg = String::from_utf8_lossy(&output.stderr).into_owned();
                    Err(Error::new(
                        ErrorKind::Other,
                        format!("espeak error: {}", err_msg),
                    ))
                }
            }
            None => {
                // Timeout occurred, kill the process
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::new(
                    ErrorKind::TimedOut,
                    format!("espeak timed out after {:?}", timeout),
                ))
            }
        }
    }
}

impl Default for EspeakBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisBackend for EspeakBackend {
    fn name(&self) -> &'static str {
        "espeak-ng"
    }

    fn is_configured(&self) -> bool {
        self.available
    }

    fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let output = Command::new(&self.binary).arg("--voices").output()?;
        if !output.status.success() {
            return Err(Error::new(
                ErrorKind::Other,
                "espeak --voices returned an error",
            ));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let mut voices = Vec::new();

        // Columns: Pty Language Age/Gender VoiceName File Other
        for line in listing.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }
            voices.push(VoiceInfo {
                display_name: fields[3].replace('_', " "),
                voice_id: fields[1].to_string(),
                language_code: fields[1].to_string(),
                engine: "espeak-ng".to_string(),
            });
        }

        Ok(voices)
    }

    async fn convert_to_audio(
        &self,
        segment: &TextSegment,
        output_no_ext: &Path,
        settings: &ConversionSettings,
    ) -> Result<()> {
        let voice = self.resolve_voice(segment);
        let (speed, amplitude) = Self::speed_args(settings);
        let binary = self.binary.clone();
        let timeout = self.timeout;
        let text = segment.text.clone();
        let out_path = output_no_ext.with_extension(self.output_extension());

        debug!(
            "espeak: {} chars -> {} (voice {:?}, speed {})",
            text.len(),
            out_path.display(),
            voice,
            speed
        );

        let wav = tokio::task::spawn_blocking(move || {
            Self::run_synthesis(&binary, timeout, voice.as_deref(), speed, amplitude, &text)
        })
        .await
        .map_err(|e| Error::new(ErrorKind::Other, format!("synthesis task failed: {}", e)))??;

        tokio::fs::write(&out_path, wav).await
    }
}
