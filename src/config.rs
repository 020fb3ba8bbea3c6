use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

/// What to do when one incoming message carries several attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentPolicy {
    /// Process the first attachment and ignore the rest.
    #[default]
    FirstOnly,
    /// Refuse the whole message without touching the session.
    RejectAll,
}

impl FromStr for AttachmentPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first" | "first_only" | "first-only" => Ok(Self::FirstOnly),
            "reject" | "reject_all" | "reject-all" => Ok(Self::RejectAll),
            other => bail!("unknown attachment policy '{other}' (expected 'first' or 'reject')"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Texts up to this many chars are summarized in a single pass.
    pub threshold: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4_000,
            overlap: 200,
            threshold: 4_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub max_reply_tokens: u16,
    pub summary_max_tokens: u16,
    pub chunking: ChunkingConfig,
    pub request_timeout: Option<Duration>,
    pub max_history: Option<usize>,
    pub attachment_policy: AttachmentPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            max_reply_tokens: 300,
            summary_max_tokens: 150,
            chunking: ChunkingConfig::default(),
            request_timeout: None,
            max_history: None,
            attachment_policy: AttachmentPolicy::default(),
        }
    }
}

impl ChatConfig {
    const DEFAULT_MODEL: &'static str = "gpt-4";

    const MODEL_VARS: [&'static str; 2] = ["DOCCHAT_MODEL", "OPENAI_MODEL"];
    const MAX_REPLY_TOKENS_VARS: [&'static str; 1] = ["DOCCHAT_MAX_REPLY_TOKENS"];
    const SUMMARY_MAX_TOKENS_VARS: [&'static str; 1] = ["DOCCHAT_SUMMARY_MAX_TOKENS"];
    const CHUNK_SIZE_VARS: [&'static str; 1] = ["DOCCHAT_CHUNK_SIZE"];
    const CHUNK_OVERLAP_VARS: [&'static str; 1] = ["DOCCHAT_CHUNK_OVERLAP"];
    const CHUNK_THRESHOLD_VARS: [&'static str; 1] = ["DOCCHAT_CHUNK_THRESHOLD"];
    const TIMEOUT_VARS: [&'static str; 1] = ["DOCCHAT_REQUEST_TIMEOUT_MS"];
    const MAX_HISTORY_VARS: [&'static str; 1] = ["DOCCHAT_MAX_HISTORY"];
    const ATTACHMENT_POLICY_VARS: [&'static str; 1] = ["DOCCHAT_ATTACHMENT_POLICY"];

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let read = |candidates: &[&'static str]| -> Option<(&'static str, String)> {
            candidates
                .iter()
                .find_map(|key| lookup(key).map(|value| (*key, value)))
        };

        let model = read(&Self::MODEL_VARS)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.model);

        let config = Self {
            model,
            max_reply_tokens: parse_or(
                read(&Self::MAX_REPLY_TOKENS_VARS),
                defaults.max_reply_tokens,
            )?,
            summary_max_tokens: parse_or(
                read(&Self::SUMMARY_MAX_TOKENS_VARS),
                defaults.summary_max_tokens,
            )?,
            chunking: ChunkingConfig {
                chunk_size: parse_or(read(&Self::CHUNK_SIZE_VARS), defaults.chunking.chunk_size)?,
                overlap: parse_or(read(&Self::CHUNK_OVERLAP_VARS), defaults.chunking.overlap)?,
                threshold: parse_or(
                    read(&Self::CHUNK_THRESHOLD_VARS),
                    defaults.chunking.threshold,
                )?,
            },
            request_timeout: parse_opt::<u64>(read(&Self::TIMEOUT_VARS))?
                .map(Duration::from_millis),
            max_history: parse_opt(read(&Self::MAX_HISTORY_VARS))?,
            attachment_policy: parse_or(
                read(&Self::ATTACHMENT_POLICY_VARS),
                defaults.attachment_policy,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_reply_tokens == 0 || self.summary_max_tokens == 0 {
            bail!("token limits must be greater than zero");
        }
        if self.chunking.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }
        if self.request_timeout == Some(Duration::ZERO) {
            bail!("request timeout must be greater than zero when set");
        }
        if self.max_history == Some(0) {
            bail!("max history must be greater than zero when set");
        }
        Ok(())
    }
}

fn parse_opt<T>(entry: Option<(&'static str, String)>) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match entry {
        None => Ok(None),
        Some((key, raw)) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("invalid value '{raw}' for {key}")),
    }
}

fn parse_or<T>(entry: Option<(&'static str, String)>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(entry)?.unwrap_or(default))
}
