//! Request and result types for the summarization pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One summarization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest
{   /// Consultation transcript in the source language
    pub source_text: String
  , /// Explicit template; the default active one when absent
    #[serde(default)]
    pub template_id: Option<i64>
  , /// Incremental generation requested
    #[serde(default)]
    pub stream: bool
  , /// Echoed back in the final stream event
    #[serde(default)]
    pub consultation_date: Option<NaiveDate>
}

impl GenerationRequest
{   pub fn new(source_text: impl Into<String>) -> Self
    {   GenerationRequest
        {   source_text: source_text.into()
          , template_id: None
          , stream: false
          , consultation_date: None
        }
    }

    pub fn with_template(mut self, id: i64) -> Self
    {   self.template_id = Some(id);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self
    {   self.consultation_date = Some(date);
        self
    }

    pub fn streaming(mut self) -> Self
    {   self.stream = true;
        self
    }

    /// Requested date, or today in local time
    pub fn effective_date(&self) -> NaiveDate
    {   self.consultation_date
          .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Outcome of a single-shot generation.
/// Built once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult
{   pub success: bool
  , pub original_text: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>
  , pub usage: crate::usage::TokenUsage
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>
  , #[serde(skip)]
    pub error_kind: Option<crate::error::Error>
}

impl GenerationResult
{   /// Successful result; `summary` must already be normalized
    pub fn success(
      original_text: String
    , summary: String
    , provider: &str
    , template: &crate::template::PromptTemplate
    , usage: crate::usage::TokenUsage
    ) -> Self
    {   GenerationResult
        {   success: true
          , original_text
          , summary: Some(summary)
          , provider: Some(provider.to_string())
          , template_id: Some(template.id)
          , template_name: Some(template.name.clone())
          , source_language: Some(template.source_language.clone())
          , target_language: Some(template.target_language.clone())
          , usage
          , error: None
          , error_kind: None
        }
    }

    pub fn failure(
      original_text: String
    , error: crate::error::Error
    ) -> Self
    {   GenerationResult
        {   success: false
          , original_text
          , summary: None
          , provider: None
          , template_id: None
          , template_name: None
          , source_language: None
          , target_language: None
          , usage: crate::usage::TokenUsage::default()
          , error: Some(error.to_string())
          , error_kind: Some(error)
        }
    }
}

/// Caller-supplied labels stored next to a summary.
/// Passed through to persistence untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMetadata
{   #[serde(default)]
    pub consultant_name: Option<String>
  , #[serde(default)]
    pub customer_name: Option<String>
  , #[serde(default)]
    pub consultation_title: Option<String>
}

/// Pre-generated summary to store without calling a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDraft
{   pub consultation_date: NaiveDate
  , pub original_text: String
  , pub summary_text: String
  , #[serde(default)]
    pub template_id: Option<i64>
  , #[serde(default)]
    pub metadata: SummaryMetadata
}
