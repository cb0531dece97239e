//! Joins per-segment audio files into one output per split group.

use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavWriter};
use log::warn;

/// Merge collaborator consumed by the conversion driver.
#[async_trait]
pub trait AudioMerger: Send + Sync {
    /// Concatenate `inputs` in order into `output`.
    async fn merge_files(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// WAV concatenation via hound. The first readable input fixes the output
/// format; later inputs with a different format are skipped with a warning
/// (resampling belongs to a real audio pipeline, not here).
pub struct WavMerger;

#[async_trait]
impl AudioMerger for WavMerger {
    async fn merge_files(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "no input files provided"));
        }

        if inputs.len() == 1 {
            tokio::fs::copy(&inputs[0], output).await?;
            return Ok(());
        }

        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || concat_wavs(&inputs, &output))
            .await
            .map_err(|e| Error::new(ErrorKind::Other, format!("merge task failed: {}", e)))?
    }
}

fn concat_wavs(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let first = inputs
        .iter()
        .find(|p| p.exists())
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "no merge input exists on disk"))?;

    let spec = WavReader::open(first).map_err(to_io)?.spec();
    let mut writer = WavWriter::create(output, spec).map_err(to_io)?;

    for file in inputs {
        if !file.exists() {
            warn!("merge input not found, skipping: {}", file.display());
            continue;
        }

        let mut reader = WavReader::open(file).map_err(to_io)?;
        if reader.spec() != spec {
            warn!(
                "merge input {} has format {:?}, expected {:?}; skipping",
                file.display(),
                reader.spec(),
                spec
            );
            continue;
        }

        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    writer.write_sample(sample.map_err(to_io)?).map_err(to_io)?;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    writer.write_sample(sample.map_err(to_io)?).map_err(to_io)?;
                }
            }
        }
    }

    writer.finalize().map_err(to_io)
}

fn to_io(err: hound::Error) -> Error {
    match err {
        hound::Error::IoError(e) => e,
        other => Error::new(ErrorKind::InvalidData, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavSpec;
    use tempfile::tempdir;

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn mono_spec(sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[tokio::test]
    async fn merges_in_order() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let out = dir.path().join("out.wav");

        write_wav(&a, mono_spec(22050), &[1, 2, 3]);
        write_wav(&b, mono_spec(22050), &[4, 5]);

        WavMerger
            .merge_files(&[a, b], &out)
            .await
            .expect("merge failed");

        let samples: Vec<i16> = WavReader::open(&out)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn single_input_is_copied() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let out = dir.path().join("out.wav");
        write_wav(&a, mono_spec(22050), &[7, 8]);

        WavMerger.merge_files(&[a], &out).await.unwrap();
        assert!(out.exists());
    }

    #[tokio::test]
    async fn mismatched_format_is_skipped() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        let out = dir.path().join("out.wav");

        write_wav(&a, mono_spec(22050), &[1, 2]);
        write_wav(&b, mono_spec(44100), &[3, 4, 5]);

        WavMerger.merge_files(&[a, b], &out).await.unwrap();

        let reader = WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 2);
    }

    #[tokio::test]
    async fn empty_input_list_errors() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.wav");
        assert!(WavMerger.merge_files(&[], &out).await.is_err());
    }
}
