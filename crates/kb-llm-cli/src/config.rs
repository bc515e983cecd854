//! CLI configuration, persisted as JSON.

use std::path::{Path, PathBuf};

use kb_llm::SamplingParams;
use serde::{Deserialize, Serialize};

/// Defaults for `kb-llm generate`, overridable per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// GGUF model used when `--model` is not given.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Context size (0 = model default).
    #[serde(default = "default_ctx_size")]
    pub ctx_size: u32,
    /// Compute threads; unset picks the keyboard default.
    #[serde(default)]
    pub threads: Option<i32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// `temperature`, `top_k` and `top_p`, stored at the top level.
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

fn default_ctx_size() -> u32 {
    512
}
fn default_max_tokens() -> u32 {
    120
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            ctx_size: default_ctx_size(),
            threads: None,
            max_tokens: default_max_tokens(),
            sampling: SamplingParams::default(),
        }
    }
}

impl CliConfig {
    /// Platform config directory: `~/.config/kb-llm/`
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kb-llm")
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Load from the platform config file, or defaults if it is missing.
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_file())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist to the platform config file.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_file())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Update one field from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "model_path" => {
                self.model_path = match value {
                    "" | "none" => None,
                    path => Some(PathBuf::from(path)),
                }
            }
            "ctx_size" => self.ctx_size = value.parse()?,
            "threads" => {
                self.threads = match value {
                    "" | "auto" => None,
                    n => Some(n.parse()?),
                }
            }
            "max_tokens" => self.max_tokens = value.parse()?,
            "temperature" => self.sampling.temperature = value.parse()?,
            "top_k" => self.sampling.top_k = value.parse()?,
            "top_p" => {
                let top_p: f32 = value.parse()?;
                if !(top_p > 0.0 && top_p <= 1.0) {
                    anyhow::bail!("top_p must be in (0, 1], got {top_p}");
                }
                self.sampling.top_p = top_p;
            }
            _ => anyhow::bail!("Unknown config key: {key}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CliConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg, CliConfig::default());
        assert_eq!(cfg.ctx_size, 512);
        assert_eq!(cfg.max_tokens, 120);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut cfg = CliConfig::default();
        cfg.set("model_path", "/models/gemma-3-270m-it.gguf").unwrap();
        cfg.set("threads", "6").unwrap();
        cfg.set("temperature", "0.0").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = CliConfig::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.threads, Some(6));
        assert!(loaded.sampling.is_greedy());
    }

    #[test]
    fn partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"ctx_size": 2048, "top_k": 5}"#).unwrap();

        let cfg = CliConfig::load_from(&path).unwrap();
        assert_eq!(cfg.ctx_size, 2048);
        assert_eq!(cfg.sampling.top_k, 5);
        assert_eq!(cfg.sampling.top_p, 0.95);
        assert_eq!(cfg.max_tokens, 120);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = CliConfig::default();
        assert!(cfg.set("top_p", "0").is_err());
        assert!(cfg.set("ctx_size", "big").is_err());
        assert!(cfg.set("colour", "blue").is_err());
        assert_eq!(cfg, CliConfig::default());
    }

    #[test]
    fn sampling_fields_are_top_level() {
        let mut cfg = CliConfig::default();
        cfg.set("top_k", "12").unwrap();

        let json: serde_json::Value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["top_k"], 12);
        assert!(json["top_p"].is_number());
        assert!(json.get("sampling").is_none());
    }
}
