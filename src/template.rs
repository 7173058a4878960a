//! Prompt templates and the read-only store they are served from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use log::{debug, trace};

/// The one substitution point every template must carry
pub const INPUT_SLOT: &str = "{input_text}";

/// Versioned instruction template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate
{   pub id: i64
  , pub name: String
  , pub version: String
  , pub template_text: String
  , pub source_language: String
  , pub target_language: String
  , pub is_active: bool
  , pub created_at: DateTime<Utc>
}

impl PromptTemplate
{   /// New active ja -> ko template
    pub fn new(
      id: i64
    , name: impl Into<String>
    , version: impl Into<String>
    , template_text: impl Into<String>
    , created_at: DateTime<Utc>
    ) -> Self
    {   PromptTemplate
        {   id
          , name: name.into()
          , version: version.into()
          , template_text: template_text.into()
          , source_language: "ja".to_string()
          , target_language: "ko".to_string()
          , is_active: true
          , created_at
        }
    }

    pub fn has_slot(&self) -> bool
    {   self.template_text.contains(INPUT_SLOT)
    }

    /// Substitute the source text into the input slot
    pub fn render(&self, source_text: &str)
      -> Result<String, crate::error::Error>
    {   if !self.has_slot()
        {   return Err(crate::error::Error::MalformedTemplate(
              self.name.clone()
            ));
        }
        trace!(
          "Rendering template {} with {} chars",
          self.id, source_text.chars().count()
        );
        Ok(self.template_text.replace(INPUT_SLOT, source_text))
    }
}

/// Read access to prompt templates
///
/// Implementations are shared across request tasks and must be
/// safe to read concurrently; the generation path never writes.
pub trait TemplateStore: Send + Sync
{   fn find_by_id(&self, id: i64) -> Option<PromptTemplate>;

    /// Active template with the latest `created_at`.
    /// Ties go to the highest id.
    fn find_default_active(&self) -> Option<PromptTemplate>;
}

/// Template cache held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateStore
{   templates: Vec<PromptTemplate>
}

impl InMemoryTemplateStore
{   pub fn new(templates: Vec<PromptTemplate>) -> Self
    {   debug!(
          "Creating template store with {} templates",
          templates.len()
        );
        InMemoryTemplateStore { templates }
    }
}

impl TemplateStore for InMemoryTemplateStore
{   fn find_by_id(&self, id: i64) -> Option<PromptTemplate>
    {   self.templates
          .iter()
          .find(|t| t.id == id)
          .cloned()
    }

    fn find_default_active(&self) -> Option<PromptTemplate>
    {   self.templates
          .iter()
          .filter(|t| t.is_active)
          .max_by_key(|t| (t.created_at, t.id))
          .cloned()
    }
}
