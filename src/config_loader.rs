use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::sync::RwLock;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub espeak_binary: String,
    pub piper_binary: String,
    /// Empty means the conventional per-user piper models directory.
    pub piper_models_dir: String,
    pub synth_timeout_secs: u64,
    /// Engine index selected when `<vid=...>` appears before `<service=N>`.
    pub vid_default_service: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            espeak_binary: "espeak-ng".to_string(),
            piper_binary: "piper".to_string(),
            piper_models_dir: String::new(),
            synth_timeout_secs: 30,
            vid_default_service: 3,
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> =
        RwLock::new(Settings::new().unwrap_or_default());
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .set_default("espeak_binary", "espeak-ng")?
            .set_default("piper_binary", "piper")?
            .set_default("piper_models_dir", "")?
            .set_default("synth_timeout_secs", 30)?
            .set_default("vid_default_service", 3)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("Voxsplit").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/voxsplit/Voxsplit",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            )
            // Merge with environment variables (e.g. VOXSPLIT_ESPEAK_BINARY)
            .add_source(config::Environment::with_prefix("VOXSPLIT"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.synth_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "synth_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.vid_default_service < 0 {
            return Err(config::ConfigError::Message(format!(
                "Invalid vid_default_service: {}. Must be a zero-based engine index",
                self.vid_default_service
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_load() {
        let settings = Settings::new().expect("Failed to load settings");
        assert!(settings.synth_timeout_secs > 0);
        assert!(!settings.espeak_binary.is_empty());
    }

    #[test]
    #[serial]
    fn env_override_wins() {
        std::env::set_var("VOXSPLIT_SYNTH_TIMEOUT_SECS", "7");
        let settings = Settings::new().expect("Failed to load settings");
        assert_eq!(settings.synth_timeout_secs, 7);
        std::env::remove_var("VOXSPLIT_SYNTH_TIMEOUT_SECS");
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let settings = Settings {
            synth_timeout_secs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
