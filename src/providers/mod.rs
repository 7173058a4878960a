//! Generation provider implementations

pub mod fallback;
pub mod openai;

use std::pin::Pin;
use std::sync::Arc;
use async_trait::async_trait;
use futures::Stream;
use log::{info, warn};

// Re-export for convenience
pub use fallback::FallbackStubProvider;
pub use openai::OpenAiProvider;

/// Lazy, finite, non-restartable sequence of raw text fragments.
/// Dropping it releases whatever the provider holds open.
pub type FragmentStream
  = Pin<Box<dyn Stream<Item = Result<String, crate::error::Error>> + Send>>;

/// Prompt as sent to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt
{   /// Fixed instruction sent ahead of the request
    pub system: Option<String>
  , /// Rendered template
    pub text: String
}

impl Prompt
{   pub fn new(text: impl Into<String>) -> Self
    {   Prompt
        {   system: None
          , text: text.into()
        }
    }
}

/// Raw single-shot output
#[derive(Debug, Clone, PartialEq)]
pub struct Generation
{   pub text: String
  , pub usage: Option<crate::usage::UsageReport>
}

/// One text-generation backend
#[async_trait]
pub trait GenerationProvider: Send + Sync
{   /// Identifier reported in results
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt)
      -> Result<Generation, crate::error::Error>;

    async fn generate_incremental(&self, prompt: &Prompt)
      -> Result<FragmentStream, crate::error::Error>;
}

/// Stand-in used when there is no credential and the fallback
/// is disabled: every call fails, nothing touches the network.
#[derive(Debug, Clone, Default)]
pub struct UnavailableProvider;

const UNAVAILABLE_NAME: &str = "unavailable";

#[async_trait]
impl GenerationProvider for UnavailableProvider
{   fn name(&self) -> &str
    {   UNAVAILABLE_NAME
    }

    async fn generate(&self, _prompt: &Prompt)
      -> Result<Generation, crate::error::Error>
    {   Err(crate::error::Error::ProviderUnavailable(
          "no API key configured".to_string()
        ))
    }

    async fn generate_incremental(&self, _prompt: &Prompt)
      -> Result<FragmentStream, crate::error::Error>
    {   Err(crate::error::Error::ProviderUnavailable(
          "no API key configured".to_string()
        ))
    }
}

/// Pick the backend for a configuration. Called once per
/// summarizer, never per request.
pub fn select_provider(
  config: &crate::config::SummarizerConfig
) -> Result<Arc<dyn GenerationProvider>, crate::error::Error>
{   if config.has_credential()
    {   info!("Using OpenAI provider, model {}", config.model);
        let provider = OpenAiProvider::new(config)?;
        return Ok(Arc::new(provider));
    }
    if config.fallback_enabled
    {   warn!("No API key configured, using placeholder provider");
        return Ok(Arc::new(FallbackStubProvider::new()));
    }
    warn!("No API key configured and fallback disabled");
    Ok(Arc::new(UnavailableProvider))
}
