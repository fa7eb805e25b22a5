// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for FileWizard

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Text summarization, tree proposal and search endpoint
    pub text: EngineConfig,

    /// Image captioning endpoint
    pub image: EngineConfig,

    /// Retry policy shared by every call to the enrichment service
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Token budgets
    #[serde(default)]
    pub batching: BatchConfig,

    /// Fan-out behaviour
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptConfig,

    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Move journal location
    #[serde(default = "default_history_path")]
    pub history_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.groq.com/openai/v1`
    pub endpoint: String,
    pub model: String,
    /// Credentials rotated on failure; empty for endpoints without auth
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Bounded retry with a delay strategy between attempts
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    None,
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    /// Approximate token budget for one tree-proposal or search request
    #[serde(default = "default_max_token_size")]
    pub max_token_size: usize,
    /// Text beyond this many approximate tokens is cut before summarizing
    #[serde(default = "default_max_document_tokens")]
    pub max_document_tokens: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EnrichmentConfig {
    /// Fail the whole request when any file could not be summarized
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_document_prompt")]
    pub document: String,
    #[serde(default = "default_image_prompt")]
    pub image: String,
    #[serde(default = "default_file_tree_prompt")]
    pub file_tree: String,
    /// `{query}` is replaced with the user's search query
    #[serde(default = "default_search_prompt")]
    pub search: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_timeout() -> u64 { 120 }
fn default_max_attempts() -> u32 { 5 }
fn default_max_token_size() -> usize { 4000 }
fn default_max_document_tokens() -> usize { 6144 }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8000 }
fn default_db_path() -> String { "filewizard.db".to_string() }
fn default_history_path() -> String { "filewizard_history.jsonl".to_string() }

fn default_document_prompt() -> String {
    "You will be provided with the contents of a file. Provide a summary of the contents. \
     The purpose of the summary is to organize files based on their content. \
     To this end provide a concise but informative summary. Make the summary as specific to the file as possible. \
     It is very important that you only provide the final output without any additional comments or remarks.".to_string()
}

fn default_image_prompt() -> String {
    "Describe this image in the most concise way possible, capturing only the essential elements and details. \
     Aim for a very brief yet accurate summary.".to_string()
}

fn default_file_tree_prompt() -> String {
    r#"You will be provided with list of source files and a summary of their contents.
For each file, propose a new path and filename, using a directory structure that optimally organizes the files using known conventions and best practices.
Follow good naming conventions. Here are a few guidelines
- Think about your files : What related files are you working with?
- Identify metadata (for example, date, sample, experiment) : What information is needed to easily locate a specific file?
- Abbreviate or encode metadata
- Use versioning : Are you maintaining different versions of the same file?
- Think about how you will search for your files : What comes first?
- Deliberately separate metadata elements : Avoid spaces or special characters in your file names
If the file is already named well or matches a known convention, set the destination path to the same as the source path.

Your response must be a JSON object with the following schema, dont add any extra text except the json:
{
    "files": [
        {
            "src_path": "original file path",
            "dst_path": "new file path under proposed directory structure with proposed file name"
        }
    ]
}"#.to_string()
}

fn default_search_prompt() -> String {
    r#"You will be provided with list of source files and a summary of their contents:
return the files that matches or have a similar content to this search query: {query}

Your response must be a JSON object with the following schema, dont add any extra text except the json:
{
    "files": [
        {
            "file": "File that matches or have a similar content to the search query"
        }
    ]
}"#.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            text: EngineConfig {
                endpoint: "http://localhost:11434/v1".to_string(),
                model: "llama3.2:3b".to_string(),
                api_keys: Vec::new(),
            },
            image: EngineConfig {
                endpoint: "http://localhost:11434/v1".to_string(),
                model: "llava".to_string(),
                api_keys: Vec::new(),
            },
            retry: RetryPolicy::default(),
            timeout_secs: default_timeout(),
            batching: BatchConfig::default(),
            enrichment: EnrichmentConfig::default(),
            prompts: PromptConfig::default(),
            web: WebConfig::default(),
            database: DatabaseConfig::default(),
            history_path: default_history_path(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed { delay_ms: 2000 }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_token_size: default_max_token_size(),
            max_document_tokens: default_max_document_tokens(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            document: default_document_prompt(),
            image: default_image_prompt(),
            file_tree: default_file_tree_prompt(),
            search: default_search_prompt(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::WizardError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override engine settings from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (prefix, engine) in [("TEXT", &mut self.text), ("IMAGE", &mut self.image)] {
            if let Some(endpoint) = lookup(&format!("{}_API_END_POINT", prefix)) {
                engine.endpoint = endpoint;
            }
            if let Some(model) = lookup(&format!("{}_MODEL_NAME", prefix)) {
                engine.model = model;
            }
            if let Some(keys) = lookup(&format!("{}_API_KEYS", prefix)) {
                engine.api_keys = parse_key_list(&keys);
            }
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(crate::WizardError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.batching.max_token_size == 0 {
            return Err(crate::WizardError::Config("batching.max_token_size must be positive".to_string()));
        }
        for (name, engine) in [("text", &self.text), ("image", &self.image)] {
            if engine.endpoint.trim().is_empty() {
                return Err(crate::WizardError::Config(format!("{}.endpoint is empty", name)));
            }
            if engine.model.trim().is_empty() {
                return Err(crate::WizardError::Config(format!("{}.model is empty", name)));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Accepts `["k1","k2"]` as well as `k1;k2` or `k1,k2`
fn parse_key_list(raw: &str) -> Vec<String> {
    if let Ok(keys) = serde_json::from_str::<Vec<String>>(raw) {
        return keys;
    }
    raw.split([';', ','])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_key_list_formats() {
        assert_eq!(parse_key_list(r#"["a","b"]"#), vec!["a", "b"]);
        assert_eq!(parse_key_list("a; b;"), vec!["a", "b"]);
        assert_eq!(parse_key_list("a,b"), vec!["a", "b"]);
        assert!(parse_key_list("").is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TEXT_API_END_POINT", "https://api.groq.com/openai/v1"),
            ("TEXT_API_KEYS", r#"["k1","k2"]"#),
            ("IMAGE_MODEL_NAME", "llava-v1.5-7b"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.text.endpoint, "https://api.groq.com/openai/v1");
        assert_eq!(config.text.api_keys, vec!["k1", "k2"]);
        assert_eq!(config.image.model, "llava-v1.5-7b");
        assert_eq!(config.image.endpoint, AppConfig::default().image.endpoint);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: Backoff::Exponential { base_ms: 100, max_ms: 500 },
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let json = r#"{
            "text": {"endpoint": "http://localhost:8080/v1", "model": "m"},
            "image": {"endpoint": "http://localhost:8080/v1", "model": "v", "api_keys": ["x"]},
            "retry": {"max_attempts": 3, "backoff": {"strategy": "none"}}
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff, Backoff::None);
        assert_eq!(config.batching.max_token_size, 4000);
        assert!(config.prompts.search.contains("{query}"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.text.model = "custom".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.text.model, "custom");
    }
}
