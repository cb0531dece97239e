pub mod espeak;
pub mod piper;

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::convert::ConversionSettings;
use crate::segmenter::TextSegment;

/// Represents one voice offered by a synthesis engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VoiceInfo {
    pub display_name: String,
    pub voice_id: String,
    pub language_code: String,
    pub engine: String,
}

/// Trait that all speech synthesis backends must implement.
/// This allows us to plug in different engines (eSpeak, Piper, etc.)
/// behind the same index-dispatched registry.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Engine name for display and logs.
    fn name(&self) -> &'static str;

    /// Whether the engine can be used right now (binary present, models
    /// installed, ...).
    fn is_configured(&self) -> bool;

    /// Extension of the files this engine produces, without the dot.
    fn output_extension(&self) -> &'static str {
        "wav"
    }

    /// Returns the ordered list of voices this engine offers.
    fn list_voices(&self) -> io::Result<Vec<VoiceInfo>>;

    /// Render one segment to `output_no_ext` + the engine's extension.
    async fn convert_to_audio(
        &self,
        segment: &TextSegment,
        output_no_ext: &Path,
        settings: &ConversionSettings,
    ) -> io::Result<()>;

    /// Render a short sample with one voice, for auditioning.
    async fn test_voice(
        &self,
        text: &str,
        output_no_ext: &Path,
        voice_index: i32,
        settings: &ConversionSettings,
    ) -> io::Result<()> {
        let segment = TextSegment {
            text: text.to_string(),
            voice_index,
            ..TextSegment::default()
        };
        self.convert_to_audio(&segment, output_no_ext, settings).await
    }
}

/// Index-dispatched set of engines. Segment routing (`<service=N>`) and the
/// caller's default engine selection both resolve through this list.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn SynthesisBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in local engines, in their conventional
    /// order: espeak-ng first, then piper.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.push(Arc::new(espeak::EspeakBackend::new()));
        registry.push(Arc::new(piper::PiperBackend::new()));
        registry
    }

    pub fn push(&mut self, backend: Arc<dyn SynthesisBackend>) {
        self.backends.push(backend);
    }

    /// Look up an engine by zero-based index. Negative or out-of-range
    /// indices resolve to nothing.
    pub fn get(&self, index: i32) -> Option<Arc<dyn SynthesisBackend>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.backends.get(i).cloned())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}
