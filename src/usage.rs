//! Token accounting for provider responses

use serde::{Deserialize, Serialize};

/// Usage block as reported by an OpenAI-compatible backend.
/// Every field is optional; backends omit what they don't track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport
{   #[serde(default)]
    pub prompt_tokens: Option<u64>
  , #[serde(default)]
    pub completion_tokens: Option<u64>
  , #[serde(default)]
    pub total_tokens: Option<u64>
  , #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTokensDetails
{   #[serde(default)]
    pub cached_tokens: Option<u64>
}

/// Token counters attached to a `GenerationResult`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage
{   pub input_tokens: u64
  , pub output_tokens: u64
  , pub total_tokens: u64
  , pub cached_input_tokens: u64
}

impl TokenUsage
{   /// Map a possibly absent report onto the four counters,
    /// zero for anything not reported.
    pub fn from_report(report: Option<&UsageReport>) -> Self
    {   let Some(report) = report else
        {   return TokenUsage::default();
        };
        TokenUsage
        {   input_tokens: report.prompt_tokens.unwrap_or(0)
          , output_tokens: report.completion_tokens.unwrap_or(0)
          , total_tokens: report.total_tokens.unwrap_or(0)
          , cached_input_tokens: report
              .prompt_tokens_details
              .as_ref()
              .and_then(|d| d.cached_tokens)
              .unwrap_or(0)
        }
    }

    pub fn is_zero(&self) -> bool
    {   *self == TokenUsage::default()
    }
}
