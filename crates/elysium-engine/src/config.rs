use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use elysium_contracts::story::ContextWindow;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_TEXT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
pub const DEFAULT_IMAGE_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-xl-base-1.0";

const DEFAULT_TEXT_TIMEOUT_SECS: u64 = 90;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_IMAGE_MAX_ATTEMPTS: u32 = 2;
const IMAGE_MAX_ATTEMPTS_CAP: u32 = 5;
const DEFAULT_IMAGE_MAX_WAIT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_GEMINI_TEXT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TEXT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_IMAGE_ENDPOINT.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_IMAGE_TIMEOUT_SECS),
        }
    }
}

/// Bounds the wait-and-retry loop for "model is loading" image responses.
///
/// `max_attempts` counts the first request, so the default of 2 allows one
/// retry. A retry is skipped when its wait would push the cumulative sleep
/// past `max_total_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingRetryPolicy {
    pub max_attempts: u32,
    pub max_total_wait: Duration,
}

impl Default for LoadingRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_IMAGE_MAX_ATTEMPTS,
            max_total_wait: Duration::from_secs(DEFAULT_IMAGE_MAX_WAIT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub text: TextConfig,
    pub image: ImageConfig,
    pub retry: LoadingRetryPolicy,
    pub context: ContextWindow,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let read_u64 = |key: &str| read(key).and_then(|raw| raw.parse::<u64>().ok());
        let defaults = ContextWindow::default();

        Self {
            text: TextConfig {
                api_base: read("GEMINI_API_BASE")
                    .map(|value| value.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
                model: read("GEMINI_TEXT_MODEL")
                    .unwrap_or_else(|| DEFAULT_GEMINI_TEXT_MODEL.to_string()),
                api_key: read("GEMINI_API_KEY"),
                timeout: Duration::from_secs(
                    read_u64("ELYSIUM_TEXT_TIMEOUT_SECS")
                        .map(|value| value.max(1))
                        .unwrap_or(DEFAULT_TEXT_TIMEOUT_SECS),
                ),
            },
            image: ImageConfig {
                endpoint: read("HUGGINGFACE_IMAGE_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_IMAGE_ENDPOINT.to_string()),
                api_key: read("HUGGINGFACE_API_KEY"),
                timeout: Duration::from_secs(
                    read_u64("ELYSIUM_IMAGE_TIMEOUT_SECS")
                        .map(|value| value.max(1))
                        .unwrap_or(DEFAULT_IMAGE_TIMEOUT_SECS),
                ),
            },
            retry: LoadingRetryPolicy {
                max_attempts: read_u64("ELYSIUM_IMAGE_MAX_ATTEMPTS")
                    .map(|value| value.clamp(1, u64::from(IMAGE_MAX_ATTEMPTS_CAP)) as u32)
                    .unwrap_or(DEFAULT_IMAGE_MAX_ATTEMPTS),
                max_total_wait: Duration::from_secs(
                    read_u64("ELYSIUM_IMAGE_MAX_WAIT_SECS").unwrap_or(DEFAULT_IMAGE_MAX_WAIT_SECS),
                ),
            },
            context: ContextWindow::new(
                read_u64("ELYSIUM_CONTEXT_MAX_ENTRIES")
                    .map(|value| value.max(1) as usize)
                    .unwrap_or(defaults.max_entries),
                read_u64("ELYSIUM_CONTEXT_MAX_CHARS")
                    .map(|value| value as usize)
                    .unwrap_or(defaults.max_chars),
            ),
        }
    }

    pub fn image_enabled(&self) -> bool {
        self.image.api_key.is_some()
    }

    /// Startup complaints about missing credentials. Neither is fatal.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.text.api_key.is_none() {
            warnings.push("GEMINI_API_KEY environment variable not found.".to_string());
        }
        if self.image.api_key.is_none() {
            warnings.push(
                "HUGGINGFACE_API_KEY environment variable not found; image generation disabled."
                    .to_string(),
            );
        }
        warnings
    }
}

/// Loads `KEY=VALUE` pairs from a dotenv file into the process environment
/// without overriding variables that are already set. Returns how many were
/// applied; a missing file applies nothing.
pub fn load_dotenv(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var_os(&key).is_some() {
            continue;
        }
        env::set_var(&key, value);
        applied += 1;
    }
    Ok(applied)
}

fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim().to_string();
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            {
                value = value[1..value.len() - 1].to_string();
            }
        }
        vars.insert(key.to_string(), value);
    }
    vars
}
