//! Consultation summarizer
//!
//! Turns a Japanese consultation transcript into a Korean
//! summary through a prompt template and a text-generation
//! backend, in one shot or as a stream of SSE frames.
//!
//! ```text
//! request -> Summarizer::resolve_template (TemplateStore)
//!         -> GenerationProvider (OpenAI | placeholder)
//!         -> normalize -> TokenUsage
//!         -> GenerationResult / StreamEvent -> SummarySink / caller
//! ```

pub mod error;
pub mod config;
pub mod template;
pub mod normalize;
pub mod usage;
pub mod providers;
pub mod request;
pub mod emitter;
pub mod persist;
pub mod summarizer;
pub mod client;

pub use client::{Submission, SummaryBackend};
pub use config::SummarizerConfig;
pub use emitter::{StreamEmitter, StreamEvent};
pub use error::Error;
pub use request::{GenerationRequest, GenerationResult, SummaryMetadata};
pub use summarizer::Summarizer;
pub use template::{InMemoryTemplateStore, PromptTemplate, TemplateStore};

/// SUMMARY BACKEND API INTERFACE:

// ===== Generate =====

pub type GenerateReply = crate::request::GenerationResult;
pub type GenerateReplySender
  = tokio::sync::mpsc::UnboundedSender<GenerateReply>;

pub struct GenerateArgs
{   pub request: crate::request::GenerationRequest
  , pub reply: GenerateReplySender
}

// ===== GenerateStream =====

/// SSE frames, in order, closed after the terminal frame
pub type FrameSender = tokio::sync::mpsc::Sender<String>;

pub struct GenerateStreamArgs
{   pub request: crate::request::GenerationRequest
  , pub frames: FrameSender
}

// ===== KillProcess =====

pub type KillProcessReply = Result<(), crate::error::Error>;
pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<KillProcessReply>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

// ===== SummaryHand (sender side) =====

pub struct SummaryHand
{   pub generate_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateArgs>
  , pub generate_stream_tx
      : tokio::sync::mpsc::UnboundedSender<GenerateStreamArgs>
  , pub kill_process_tx
      : tokio::sync::mpsc::UnboundedSender<KillProcessArgs>
}

// ===== SummaryFoot (receiver side) =====

pub struct SummaryFoot
{   pub generate_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateArgs>
  , pub generate_stream_rx
      : tokio::sync::mpsc::UnboundedReceiver<GenerateStreamArgs>
  , pub kill_process_rx
      : tokio::sync::mpsc::UnboundedReceiver<KillProcessArgs>
}
