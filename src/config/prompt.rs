//! Prompt file loading and template rendering — §6, §11.
//!
//! Grounded on `examples/original_source/app.py`'s `prompt.json` convention
//! (`char`, `user`, `char_description`, `user_description`, `scenario`,
//! `system_prompt`). The original's web surface picked `prompt.json` off disk
//! per scenario/gender selection; that HTTP layer is out of scope (§1
//! Non-goals), but the file format and placeholder substitution it drove
//! are exactly what `--prompt-file` loads here.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptFile {
    pub char: String,
    pub user: String,
    pub char_description: String,
    pub user_description: String,
    pub scenario: String,
    pub system_prompt: String,
}

impl PromptFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::PromptFileMissing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::PromptFileMissing(path.to_path_buf()))?;
        serde_json::from_str(&raw).map_err(ConfigError::InvalidPromptFile)
    }

    /// Substitute `{char}`, `{user}`, `{char_description}`, `{user_description}`,
    /// `{scenario}`, `{valid_emotions_str}` into `system_prompt`.
    /// `valid_emotions_str` renders as `[happy], [sad], …` (neutral is always
    /// implied and never listed).
    pub fn render_system_prompt(&self, valid_emotions: &[String]) -> String {
        let valid_emotions_str =
            valid_emotions.iter().filter(|e| e.as_str() != "neutral").map(|e| format!("[{e}]")).collect::<Vec<_>>().join(", ");

        self.system_prompt
            .replace("{char}", &self.char)
            .replace("{user}", &self.user)
            .replace("{char_description}", &self.char_description)
            .replace("{user_description}", &self.user_description)
            .replace("{scenario}", &self.scenario)
            .replace("{valid_emotions_str}", &valid_emotions_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PromptFile {
        PromptFile {
            char: "Aria".to_string(),
            user: "Sam".to_string(),
            char_description: "a calm assistant".to_string(),
            user_description: "a curious traveler".to_string(),
            scenario: "airport help desk".to_string(),
            system_prompt: "You are {char}, {char_description}. Talking to {user}. Scenario: {scenario}. Emotions: {valid_emotions_str}."
                .to_string(),
        }
    }

    #[test]
    fn renders_all_placeholders() {
        let prompt = sample();
        let rendered = prompt.render_system_prompt(&["neutral".to_string(), "happy".to_string(), "sad".to_string()]);
        assert_eq!(rendered, "You are Aria, a calm assistant. Talking to Sam. Scenario: airport help desk. Emotions: [happy], [sad].");
    }

    #[test]
    fn empty_emotions_renders_empty_string() {
        let prompt = sample();
        let rendered = prompt.render_system_prompt(&["neutral".to_string()]);
        assert!(rendered.ends_with("Emotions: ."));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = PromptFile::load(Path::new("/nonexistent/prompt.json")).unwrap_err();
        assert!(matches!(err, ConfigError::PromptFileMissing(_)));
    }
}
