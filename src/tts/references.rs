//! Voice-clone reference resolution — §4.I, §6, §11.
//!
//! Grounded on `examples/original_source/tts_handler_cosyvoice.py`'s
//! `tts_sentence_worker_thread`: for a given emotion, look up
//! `<references_folder>/<emotion>.wav` (+ optional `<emotion>.txt` transcript)
//! and fall back to `neutral.wav`/`neutral.txt` when the emotion-specific file
//! is absent. `neutral.wav` itself is mandatory (§6).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct VoiceReference {
    pub emotion: String,
    pub wav_path: PathBuf,
    pub prompt_text: Option<String>,
}

pub struct ReferenceResolver {
    references_folder: PathBuf,
}

impl ReferenceResolver {
    pub fn new(references_folder: PathBuf) -> Result<Self, ConfigError> {
        let neutral_wav = references_folder.join("neutral.wav");
        if !neutral_wav.is_file() {
            return Err(ConfigError::ReferenceMissing(neutral_wav));
        }
        Ok(Self { references_folder })
    }

    /// Every non-neutral emotion the TTS engine can switch to — derived from
    /// whichever `<emotion>.wav` files exist in `references_folder`, minus
    /// `neutral` itself, which is always implied and never needs a `[neutral]`
    /// tag. Used by the token parser to validate `[emotion]` tags (§4.F).
    pub fn valid_emotions(&self) -> Vec<String> {
        let mut emotions = Vec::new();
        let Ok(entries) = fs::read_dir(&self.references_folder) else {
            return emotions;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("wav")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && stem != "neutral"
            {
                emotions.push(stem.to_string());
            }
        }
        emotions.sort();
        emotions
    }

    pub fn resolve(&self, emotion: &str) -> VoiceReference {
        let wav_path = self.references_folder.join(format!("{emotion}.wav"));
        if wav_path.is_file() {
            return VoiceReference { emotion: emotion.to_string(), prompt_text: self.read_prompt(emotion), wav_path };
        }

        let neutral_wav = self.references_folder.join("neutral.wav");
        VoiceReference { emotion: "neutral".to_string(), prompt_text: self.read_prompt("neutral"), wav_path: neutral_wav }
    }

    fn read_prompt(&self, emotion: &str) -> Option<String> {
        let txt_path = self.references_folder.join(format!("{emotion}.txt"));
        fs::read_to_string(&txt_path).ok().map(|s| s.trim().to_string())
    }
}

/// Resolve the references folder to use: an explicit `--wavs-directory`
/// override takes priority, otherwise the gender-selected folder from
/// `TtsConfig::gendered_references_root` (mirroring `app.py`'s
/// `GENDER_TO_DIR`/`FEMALE_ROOT`/`MALE_ROOT` convention).
pub fn resolve_references_folder(wavs_directory: Option<&Path>, gendered_folder: &Path) -> PathBuf {
    wavs_directory.map(Path::to_path_buf).unwrap_or_else(|| gendered_folder.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn falls_back_to_neutral_when_emotion_missing() {
        let dir = tempdir();
        write_file(&dir, "neutral.wav", "");
        let resolver = ReferenceResolver::new(dir.clone()).unwrap();
        let r = resolver.resolve("happy");
        assert_eq!(r.emotion, "neutral");
        assert_eq!(r.wav_path, dir.join("neutral.wav"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolves_matching_emotion_with_transcript() {
        let dir = tempdir();
        write_file(&dir, "neutral.wav", "");
        write_file(&dir, "happy.wav", "");
        write_file(&dir, "happy.txt", "so excited!\n");
        let resolver = ReferenceResolver::new(dir.clone()).unwrap();
        let r = resolver.resolve("happy");
        assert_eq!(r.emotion, "happy");
        assert_eq!(r.prompt_text.as_deref(), Some("so excited!"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn valid_emotions_excludes_neutral() {
        let dir = tempdir();
        write_file(&dir, "neutral.wav", "");
        write_file(&dir, "happy.wav", "");
        write_file(&dir, "sad.wav", "");
        let resolver = ReferenceResolver::new(dir.clone()).unwrap();
        assert_eq!(resolver.valid_emotions(), vec!["happy".to_string(), "sad".to_string()]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_neutral_wav_is_a_config_error() {
        let dir = tempdir();
        assert!(ReferenceResolver::new(dir.clone()).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    fn tempdir() -> PathBuf {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("refs-test-{}-{n}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
