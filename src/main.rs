//! voxsplit - compile tagged narration scripts into synthesized audio.

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{info, warn};

use voxsplit::backends::BackendRegistry;
use voxsplit::config_loader;
use voxsplit::convert::{ConversionSettings, Orchestrator, OutputFormat};
use voxsplit::merge::WavMerger;
use voxsplit::segmenter::Segmenter;
use voxsplit::tags::extract_delay;
use voxsplit::validator::validate;

/// Script-to-speech compiler and conversion driver
#[derive(Parser)]
#[command(name = "voxsplit")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Compile tagged narration scripts into synthesized audio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a script's tag structure and report problems
    Validate {
        /// Script file to check
        file: PathBuf,
        /// Emit the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the segment list a script compiles to
    Segments {
        /// Script file to compile
        file: PathBuf,
        /// Emit the segments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a script to audio files
    Convert {
        /// Script file to render
        file: PathBuf,
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
        /// Default engine index for untagged segments
        #[arg(short, long, default_value = "0")]
        engine: i32,
        /// Final file format: wav or mp3
        #[arg(short, long, default_value = "wav")]
        format: String,
        /// Speaking rate, -10..10
        #[arg(long, default_value = "0")]
        rate: f32,
        /// Volume, 0..100
        #[arg(long, default_value = "100")]
        volume: f32,
        /// Keep per-segment files after merging
        #[arg(long)]
        retain: bool,
    },

    /// List the voices an engine offers
    Voices {
        /// Engine index
        #[arg(short, long, default_value = "0")]
        engine: i32,
    },

    /// Render a short sample with one voice, for auditioning
    Test {
        /// Text to render
        text: String,
        /// Output file, without extension
        #[arg(short, long, default_value = "voice_test")]
        out: PathBuf,
        /// Engine index
        #[arg(short, long, default_value = "0")]
        engine: i32,
        /// 1-based voice number
        #[arg(short, long, default_value = "1")]
        voice: i32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { file, json } => {
            let text = std::fs::read_to_string(&file)?;
            let result = validate(&text);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for error in &result.errors {
                    println!(
                        "error at {}: {} ({})",
                        error.position, error.message, error.context
                    );
                }
                for warning in &result.warnings {
                    println!("warning: {}", warning);
                }
                if result.is_valid {
                    println!("OK: no structural problems");
                }
            }

            if !result.is_valid {
                std::process::exit(1);
            }
        }

        Commands::Segments { file, json } => {
            let text = std::fs::read_to_string(&file)?;
            let segmenter = segmenter_from_settings();
            let out = segmenter.segment(&text);

            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for seg in &out.segments {
                    let voice = seg
                        .custom_voice_id
                        .clone()
                        .unwrap_or_else(|| format!("#{}", seg.voice_index + 1));
                    println!(
                        "[{}.{}] engine {} voice {}: {}",
                        seg.split_index, seg.sub_index, seg.service_index, voice, seg.text
                    );
                }
                for problem in &out.problems {
                    println!("problem at {}: {}", problem.position, problem.message);
                }
            }
        }

        Commands::Convert {
            file,
            out,
            engine,
            format,
            rate,
            volume,
            retain,
        } => {
            let raw = std::fs::read_to_string(&file)?;

            let output_format = match format.as_str() {
                "wav" => OutputFormat::Wav,
                "mp3" => OutputFormat::Mp3,
                other => return Err(format!("unknown output format: {}", other).into()),
            };

            // Honor <delay=Xsec> tags before dispatching any synthesis.
            let (delay_secs, text) = extract_delay(&raw);
            if delay_secs > 0.0 {
                info!("delaying {:.3}s before conversion", delay_secs);
                tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
            }

            let settings = ConversionSettings {
                engine_index: engine,
                output_format,
                rate_value: rate,
                volume_value: volume,
                output_dir: out,
                retain_unmerged: retain,
            };

            let registry = BackendRegistry::with_defaults();
            let orchestrator = Orchestrator::new(segmenter_from_settings());

            let cancel = Arc::new(AtomicBool::new(false));
            let cancel_flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current segment");
                    cancel_flag.store(true, Ordering::Relaxed);
                }
            });

            let report = orchestrator
                .convert(&text, &settings, &registry, &WavMerger, &cancel)
                .await?;

            for problem in &report.problems {
                println!("tag problem at {}: {}", problem.position, problem.message);
            }
            println!(
                "created {} of {} expected output files ({} segment failures)",
                report.files.len(),
                report.expected_groups,
                report.failed_segments
            );
            for path in &report.files {
                println!("  {}", path.display());
            }

            if report.files.is_empty() {
                std::process::exit(1);
            }
        }

        Commands::Test {
            text,
            out,
            engine,
            voice,
        } => {
            let registry = BackendRegistry::with_defaults();
            let backend = registry
                .get(engine)
                .ok_or_else(|| format!("no engine at index {}", engine))?;

            if voice < 1 {
                return Err("voice numbers are 1-based".into());
            }

            let settings = ConversionSettings::default();
            backend
                .test_voice(&text, &out, voice - 1, &settings)
                .await?;
            println!(
                "wrote {}.{}",
                out.display(),
                backend.output_extension()
            );
        }

        Commands::Voices { engine } => {
            let registry = BackendRegistry::with_defaults();
            let backend = registry
                .get(engine)
                .ok_or_else(|| format!("no engine at index {}", engine))?;

            let voices = backend.list_voices()?;
            if voices.is_empty() {
                println!("No voices installed for {}", backend.name());
            } else {
                println!("{} voices", backend.name());
                println!("────────────────");
                for (i, voice) in voices.iter().enumerate() {
                    println!(
                        "  {:>3}  {} [{}] ({})",
                        i + 1,
                        voice.display_name,
                        voice.language_code,
                        voice.voice_id
                    );
                }
            }
        }
    }

    Ok(())
}

fn segmenter_from_settings() -> Segmenter {
    match config_loader::SETTINGS.read() {
        Ok(s) => Segmenter::new(s.vid_default_service as i32),
        Err(_) => Segmenter::default(),
    }
}
