//! Configuration for the summarizer and its generation provider

use serde::{Deserialize, Serialize};
use log::{debug, warn};

pub const DEFAULT_API_BASE: &str
  = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str
  = "gpt-4.1-mini-2025-04-14";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: usize = 2000;
pub const DEFAULT_SYSTEM_PREAMBLE: &str
  = "You are an expert who translates Japanese into Korean \
     and summarizes medical and aesthetic consultations.";

/// Summarizer configuration
///
/// Passed explicitly to `Summarizer::new`; the provider is
/// chosen from it once, at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig
{   /// Credential for the primary backend
    pub api_key: Option<String>
  , /// API base URL
    pub api_base: String
  , /// Model name
    pub model: String
  , /// Sampling temperature
    pub temperature: f32
  , /// Max tokens to generate
    pub max_tokens: usize
  , /// System message sent ahead of the rendered template
    pub system_preamble: Option<String>
  , /// Use the placeholder provider when no credential is set
    pub fallback_enabled: bool
  , /// HTTP client timeout in seconds
    pub timeout_secs: Option<u64>
}

impl Default for SummarizerConfig
{   fn default() -> Self
    {   SummarizerConfig
        {   api_key: None
          , api_base: DEFAULT_API_BASE.to_string()
          , model: DEFAULT_MODEL.to_string()
          , temperature: DEFAULT_TEMPERATURE
          , max_tokens: DEFAULT_MAX_TOKENS
          , system_preamble: Some(
              DEFAULT_SYSTEM_PREAMBLE.to_string()
            )
          , fallback_enabled: true
          , timeout_secs: None
        }
    }
}

impl SummarizerConfig
{   /// Build a configuration from process environment
    ///
    /// Reads `OPENAI_API_KEY`, `OPENAI_API_BASE`,
    /// `SUMMARY_MODEL` and `SUMMARY_FALLBACK`.
    pub fn from_env() -> Self
    {   let mut config = SummarizerConfig::default();

        config.api_key = std::env::var("OPENAI_API_KEY")
          .ok()
          .filter(|k| !k.trim().is_empty());
        if let Ok(base) = std::env::var("OPENAI_API_BASE")
        {   config.api_base = base;
        }
        if let Ok(model) = std::env::var("SUMMARY_MODEL")
        {   config.model = model;
        }
        if let Ok(flag) = std::env::var("SUMMARY_FALLBACK")
        {   config.fallback_enabled = !matches!(
              flag.to_ascii_lowercase().as_str()
            , "0" | "false" | "no" | "off"
            );
        }

        if config.api_key.is_none()
        {   warn!("OPENAI_API_KEY is not set");
        }
        debug!(
          "Loaded config: model={} fallback={}",
          config.model, config.fallback_enabled
        );
        config
    }

    /// True when a non-empty credential is configured
    pub fn has_credential(&self) -> bool
    {   self.api_key
          .as_deref()
          .map(|k| !k.trim().is_empty())
          .unwrap_or(false)
    }

    /// Reject values the backend would refuse anyway
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   if !(0.0..=2.0).contains(&self.temperature)
        {   return Err(crate::error::Error::InvalidConfiguration(
              format!("temperature {} out of range", self.temperature)
            ));
        }
        if self.max_tokens == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              "max_tokens must be positive".to_string()
            ));
        }
        if self.model.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "model must not be empty".to_string()
            ));
        }
        Ok(())
    }
}
