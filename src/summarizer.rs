//! Summarization pipeline: template resolution, generation,
//! normalization and usage accounting.

use std::pin::Pin;
use std::sync::Arc;
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};

use crate::emitter::StreamEvent;
use crate::error::Error;
use crate::persist::{SummaryRecord, SummarySink};
use crate::providers::{GenerationProvider, Prompt};
use crate::request::{
  GenerationRequest, GenerationResult, SummaryDraft, SummaryMetadata
};
use crate::template::{PromptTemplate, TemplateStore};

/// Incremental output of `Summarizer::generate_stream`
pub type EventStream
  = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Drives one provider against a template store.
///
/// Cheap to share: everything it holds is read-only, so one
/// instance serves any number of concurrent request tasks.
pub struct Summarizer
{   config: crate::config::SummarizerConfig
  , templates: Arc<dyn TemplateStore>
  , provider: Arc<dyn GenerationProvider>
}

impl Summarizer
{   /// Build a summarizer, choosing the provider from `config`
    pub fn new(
      config: crate::config::SummarizerConfig
    , templates: Arc<dyn TemplateStore>
    ) -> Result<Self, Error>
    {   config.validate()?;
        let provider = crate::providers::select_provider(&config)?;
        Ok(Summarizer::with_provider(config, templates, provider))
    }

    /// Build a summarizer around an already chosen provider
    pub fn with_provider(
      config: crate::config::SummarizerConfig
    , templates: Arc<dyn TemplateStore>
    , provider: Arc<dyn GenerationProvider>
    ) -> Self
    {   debug!("Creating Summarizer with provider {}", provider.name());
        Summarizer
        {   config
          , templates
          , provider
        }
    }

    pub fn provider_name(&self) -> &str
    {   self.provider.name()
    }

    /// Explicit id wins regardless of its active flag; otherwise
    /// the store's default active template.
    pub fn resolve_template(
      &self
    , template_id: Option<i64>
    ) -> Result<PromptTemplate, Error>
    {   let template = match template_id
        {   Some(id) => self.templates
              .find_by_id(id)
              .ok_or(Error::TemplateNotFound(id))?
          , None => self.templates
              .find_default_active()
              .ok_or(Error::NoActiveTemplate)?
        };
        if !template.has_slot()
        {   return Err(Error::MalformedTemplate(template.name));
        }
        debug!("Resolved template {} ({})", template.id, template.name);
        Ok(template)
    }

    /// Everything that must hold before a provider is called
    fn prepare(
      &self
    , request: &GenerationRequest
    ) -> Result<(PromptTemplate, Prompt), Error>
    {   if request.source_text.trim().is_empty()
        {   return Err(Error::EmptySourceText);
        }
        let template = self.resolve_template(request.template_id)?;
        let prompt = Prompt
        {   system: self.config.system_preamble.clone()
          , text: template.render(&request.source_text)?
        };
        Ok((template, prompt))
    }

    /// Single-shot generation. Failures come back as a failed
    /// result, never as a panic or an `Err`.
    pub async fn generate(
      &self
    , request: &GenerationRequest
    ) -> GenerationResult
    {   match self.try_generate(request).await
        {   Ok(result) => result
          , Err(e) => {
              if e.is_provider_error()
              {   error!("Provider call failed: {}", e);
              } else
              {   warn!("Summary generation failed: {}", e);
              }
              GenerationResult::failure(request.source_text.clone(), e)
            }
        }
    }

    async fn try_generate(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult, Error>
    {   let (template, prompt) = self.prepare(request)?;
        let generation = self.provider.generate(&prompt).await?;

        let summary = crate::normalize::normalize(&generation.text);
        let usage = crate::usage::TokenUsage::from_report(
          generation.usage.as_ref()
        );
        info!(
          "Summary generated: {} -> {} chars, {} tokens",
          request.source_text.chars().count(),
          summary.chars().count(),
          usage.total_tokens
        );

        Ok(GenerationResult::success(
          request.source_text.clone()
        , summary
        , self.provider.name()
        , &template
        , usage
        ))
    }

    /// Incremental generation.
    ///
    /// Yields one `Content` per provider fragment, then `Done`
    /// with the normalized text, or a single `Error`. The stream
    /// is lazy: dropping it stops the provider being read and
    /// discards whatever was accumulated.
    pub fn generate_stream(
      &self
    , request: GenerationRequest
    ) -> EventStream
    {   let prepared = self.prepare(&request);
        let provider = Arc::clone(&self.provider);
        let consultation_date = request.effective_date();

        let stream = async_stream::stream!
        {   let (template, prompt) = match prepared
            {   Ok(prepared) => prepared
              , Err(e) => {
                  warn!("Stream rejected: {}", e);
                  yield StreamEvent::Error { error: e.to_string() };
                  return;
                }
            };

            let mut fragments = match provider
              .generate_incremental(&prompt)
              .await
            {   Ok(fragments) => fragments
              , Err(e) => {
                  error!("Provider failed to start stream: {}", e);
                  yield StreamEvent::Error { error: e.to_string() };
                  return;
                }
            };

            let mut accumulated = String::new();
            while let Some(fragment) = fragments.next().await
            {   match fragment
                {   Ok(content) => {
                      accumulated.push_str(&content);
                      yield StreamEvent::Content
                      {   content
                        , accumulated: accumulated.clone()
                      };
                    }
                  , Err(e) => {
                      error!("Provider failed mid-stream: {}", e);
                      yield StreamEvent::Error { error: e.to_string() };
                      return;
                    }
                }
            }

            let summary = crate::normalize::normalize(&accumulated);
            info!(
              "Streamed summary finished: {} -> {} chars",
              accumulated.chars().count(),
              summary.chars().count()
            );
            yield StreamEvent::Done
            {   summary
              , template_used: template.name
              , consultation_date
            };
        };

        Box::pin(stream)
    }

    /// Generate a summary and hand it to `sink`.
    ///
    /// Nothing is stored when generation fails. Caller metadata
    /// is passed through as given.
    pub async fn create_summary(
      &self
    , request: &GenerationRequest
    , metadata: SummaryMetadata
    , sink: &dyn SummarySink
    ) -> Result<(i64, GenerationResult), Error>
    {   let result = self.generate(request).await;
        if !result.success
        {   return Err(result.error_kind.clone().unwrap_or_else(|| {
              Error::Other(result.error.clone().unwrap_or_default())
            }));
        }

        let record = SummaryRecord
        {   consultation_date: request.effective_date()
          , original_text: request.source_text.clone()
          , summary_text: result.summary.clone().unwrap_or_default()
          , template_id: result.template_id
          , metadata
        };
        let id = sink.save(record)?;
        Ok((id, result))
    }

    /// Store pre-generated text without calling a provider. A
    /// supplied template id must exist; the text is kept as is.
    pub fn create_summary_direct(
      &self
    , draft: SummaryDraft
    , sink: &dyn SummarySink
    ) -> Result<i64, Error>
    {   if let Some(id) = draft.template_id
        {   if self.templates.find_by_id(id).is_none()
            {   warn!("Direct save references missing template {}", id);
                return Err(Error::TemplateNotFound(id));
            }
        }
        let record = SummaryRecord
        {   consultation_date: draft.consultation_date
          , original_text: draft.original_text
          , summary_text: draft.summary_text
          , template_id: draft.template_id
          , metadata: draft.metadata
        };
        sink.save(record)
    }
}
