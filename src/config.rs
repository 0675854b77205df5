use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::TokenizerError;

/// Environment variable that points at the directory holding `.tiktoken` assets.
pub const VOCAB_DIR_ENV: &str = "TOKENCOUNT_VOCAB_DIR";

/// Directory searched for vocabulary assets when none is configured.
pub const DEFAULT_VOCAB_DIR: &str = "vocabs";

/// Characters per token used by the approximate counter.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.8;

/// Library configuration.
///
/// ```toml
/// vocab_dir = "/opt/tokencount/vocabs"
/// approx_chars_per_token = 3.8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub vocab_dir: Option<PathBuf>,
    pub approx_chars_per_token: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vocab_dir: None,
            approx_chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, TokenizerError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| TokenizerError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, TokenizerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TokenizerError::Config(format!("reading config from '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults, with `TOKENCOUNT_VOCAB_DIR` applied when set.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(VOCAB_DIR_ENV).filter(|d| !d.is_empty()) {
            self.vocab_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn with_vocab_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vocab_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), TokenizerError> {
        if !(self.approx_chars_per_token.is_finite() && self.approx_chars_per_token > 0.0) {
            return Err(TokenizerError::Config(format!(
                "approx_chars_per_token must be a positive number, got {}",
                self.approx_chars_per_token
            )));
        }
        Ok(())
    }

    /// Resolve an asset file name against the vocabulary directory.
    pub fn vocab_path(&self, file: &str) -> PathBuf {
        self.vocab_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_VOCAB_DIR))
            .join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.vocab_dir, None);
        assert_eq!(config.approx_chars_per_token, 3.8);
        assert_eq!(
            config.vocab_path("cl100k_base.tiktoken"),
            Path::new("vocabs").join("cl100k_base.tiktoken")
        );
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str("vocab_dir = \"/data/vocabs\"").unwrap();
        assert_eq!(config.vocab_dir.as_deref(), Some(Path::new("/data/vocabs")));
        assert_eq!(config.approx_chars_per_token, DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(
            config.vocab_path("o200k_base.tiktoken"),
            PathBuf::from("/data/vocabs/o200k_base.tiktoken")
        );
    }

    #[test]
    fn test_rejects_bad_ratio() {
        assert!(Config::from_toml_str("approx_chars_per_token = 0.0").is_err());
        assert!(Config::from_toml_str("approx_chars_per_token = -2.0").is_err());
        assert!(Config::from_toml_str("approx_chars_per_token = \"x\"").is_err());
    }

    #[test]
    fn test_env_override() {
        let config = Config::default().with_env(|key| {
            (key == VOCAB_DIR_ENV).then(|| "/env/vocabs".to_string())
        });
        assert_eq!(config.vocab_dir, Some(PathBuf::from("/env/vocabs")));

        let config = Config::default().with_env(|_| Some(String::new()));
        assert_eq!(config.vocab_dir, None);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokencount.toml");
        std::fs::write(&path, "approx_chars_per_token = 4.0\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.approx_chars_per_token, 4.0);

        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
