//! TTS config file loading — §6.
//!
//! Grounded on `examples/original_source/tts_handler_cosyvoice.py`'s
//! `__init__`, which loads a JSON config and picks `references_folder_female`
//! or `references_folder_male` by gender. The synthesis backend itself
//! differs (Kokoro via `sherpa-rs`, not CosyVoice), so the backend paths here
//! are Kokoro's rather than a 1:1 port of the original's keys, but the
//! gendered-references and `dbg_log` shape is kept.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tts::KokoroEngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub model: String,
    pub voices: String,
    pub tokens: String,
    pub data_dir: String,
    pub dict_dir: String,
    #[serde(default)]
    pub lexicon: Vec<String>,
    #[serde(default)]
    pub lang: String,
    pub default_speaker_id: i32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub references_folder_female: PathBuf,
    pub references_folder_male: PathBuf,
    #[serde(default)]
    pub dbg_log: bool,
}

fn default_speed() -> f32 {
    0.93
}

impl TtsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::TtsConfigMissing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::TtsConfigMissing(path.to_path_buf()))?;
        serde_json::from_str(&raw).map_err(ConfigError::InvalidTtsConfig)
    }

    /// `references_folder_female`/`references_folder_male`, selected by `gender`.
    pub fn gendered_references_root(&self, gender: &str) -> &Path {
        if gender == "male" { &self.references_folder_male } else { &self.references_folder_female }
    }

    pub fn kokoro_engine_config(&self, provider: &str, num_threads: i32, verbose: bool) -> KokoroEngineConfig {
        KokoroEngineConfig {
            model: self.model.clone(),
            voices: self.voices.clone(),
            tokens: self.tokens.clone(),
            data_dir: self.data_dir.clone(),
            dict_dir: self.dict_dir.clone(),
            lexicon: self.lexicon.clone(),
            lang: self.lang.clone(),
            provider: provider.to_string(),
            num_threads,
            debug: verbose || self.dbg_log,
            default_speaker_id: self.default_speaker_id,
            speed: self.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gendered_references_root_picks_by_gender() {
        let config = TtsConfig {
            model: String::new(),
            voices: String::new(),
            tokens: String::new(),
            data_dir: String::new(),
            dict_dir: String::new(),
            lexicon: vec![],
            lang: String::new(),
            default_speaker_id: 2,
            speed: 0.93,
            references_folder_female: PathBuf::from("wavs/female"),
            references_folder_male: PathBuf::from("wavs/male"),
            dbg_log: false,
        };
        assert_eq!(config.gendered_references_root("male"), Path::new("wavs/male"));
        assert_eq!(config.gendered_references_root("female"), Path::new("wavs/female"));
        assert_eq!(config.gendered_references_root("anything-else"), Path::new("wavs/female"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = TtsConfig::load(Path::new("/nonexistent/tts_config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::TtsConfigMissing(_)));
    }
}
