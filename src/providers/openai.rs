use serde::{Deserialize, Serialize};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, trace, error, info};
use std::time::Duration;

pub const PROVIDER_NAME: &str = "openai";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub max_tokens: usize
  , pub temperature: f32
  , pub stream: bool
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse
{   pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<crate::usage::UsageReport>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk
{   #[serde(default)]
    pub choices: Vec<ChunkChoice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice
{   #[serde(default)]
    pub delta: Option<ChunkDelta>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta
{   #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope
{   error: ErrorBody
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody
{   #[serde(default)]
    message: Option<String>
}

// ===== SSE decoding =====

/// What one line of a streamed response means
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine
{   /// Blank line, comment, or a chunk with no text
    Skip
  , /// Next piece of generated text
    Fragment(String)
  , /// `data: [DONE]`
    Done
  , /// Backend reported an error mid-stream
    Failed(crate::error::Error)
}

/// Decode one line of an OpenAI-style event stream
pub fn parse_sse_line(line: &str) -> SseLine
{   let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else
    {   return SseLine::Skip;
    };
    let data = data.trim_start();

    if data == "[DONE]"
    {   return SseLine::Done;
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data)
    {   let message = envelope.error.message
          .unwrap_or_else(|| "Unknown error".to_string());
        error!("OpenAI stream error: {}", message);
        return SseLine::Failed(crate::error::Error::ApiError(
          format!("OpenAI error: {}", message)
        ));
    }

    match serde_json::from_str::<ChatCompletionChunk>(data)
    {   Ok(chunk) => {
          let text: String = chunk.choices
            .into_iter()
            .filter_map(|c| c.delta.and_then(|d| d.content))
            .collect();
          if text.is_empty()
          {   SseLine::Skip
          } else
          {   SseLine::Fragment(text)
          }
        }
      , Err(e) => {
          error!("Unparseable stream chunk: {}", e);
          SseLine::Failed(crate::error::Error::ParseError(
            e.to_string()
          ))
        }
    }
}

// ===== Provider =====

/// Primary provider: an OpenAI-compatible chat-completions API.
/// Decoding settings come from config, not from requests.
#[derive(Debug, Clone)]
pub struct OpenAiProvider
{   api_key: String
  , api_base: String
  , model: String
  , temperature: f32
  , max_tokens: usize
  , http_client: reqwest::Client
}

impl OpenAiProvider
{   pub fn new(
      config: &crate::config::SummarizerConfig
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating OpenAiProvider");
        let api_key = config.api_key
          .clone()
          .filter(|k| !k.trim().is_empty())
          .ok_or_else(|| {
            error!("No API key for OpenAI");
            crate::error::Error::ProviderUnavailable(
              PROVIDER_NAME.to_string()
            )
          })?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs
        {   builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build().map_err(|e| {
          error!("Failed to build HTTP client: {}", e);
          crate::error::Error::InvalidConfiguration(e.to_string())
        })?;

        Ok(OpenAiProvider
        {   api_key
          , api_base: config.api_base.trim_end_matches('/').to_string()
          , model: config.model.clone()
          , temperature: config.temperature
          , max_tokens: config.max_tokens
          , http_client
        })
    }

    fn build_request(
      &self
    , prompt: &super::Prompt
    , stream: bool
    ) -> ChatCompletionRequest
    {   let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system
        {   messages.push(ChatMessage
            {   role: "system".to_string()
              , content: system.clone()
            });
        }
        messages.push(ChatMessage
        {   role: "user".to_string()
          , content: prompt.text.clone()
        });

        ChatCompletionRequest
        {   model: self.model.clone()
          , messages
          , max_tokens: self.max_tokens
          , temperature: self.temperature
          , stream
        }
    }

    async fn post(
      &self
    , request: &ChatCompletionRequest
    ) -> Result<reqwest::Response, crate::error::Error>
    {   trace!("OpenAI request: {:?}", request);

        let response = self.http_client
          .post(format!("{}/chat/completions", self.api_base))
          .header("Authorization", format!("Bearer {}", self.api_key))
          .header("Content-Type", "application/json")
          .json(request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            crate::error::Error::HttpError(e.to_string())
          })?;

        let status = response.status();
        trace!("OpenAI response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            error!("OpenAI API error: {}", error_text);
            return Err(crate::error::Error::ApiError(
              format!("OpenAI error ({}): {}", status, error_text)
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl super::GenerationProvider for OpenAiProvider
{   fn name(&self) -> &str
    {   PROVIDER_NAME
    }

    async fn generate(&self, prompt: &super::Prompt)
      -> Result<super::Generation, crate::error::Error>
    {   debug!("Single-shot generation with {}", self.model);
        let request = self.build_request(prompt, false);
        let response = self.post(&request).await?;

        let completion: ChatCompletionResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            crate::error::Error::ParseError(e.to_string())
          })?;

        let ChatCompletionResponse { choices, usage } = completion;
        let text = choices
          .into_iter()
          .next()
          .map(|c| c.message.content)
          .ok_or_else(|| {
            error!("No choices in response");
            crate::error::Error::NoChoicesInResponse
          })?;

        if let Some(usage) = &usage
        {   info!(
              "OpenAI usage: input {:?}, output {:?}, total {:?}",
              usage.prompt_tokens,
              usage.completion_tokens,
              usage.total_tokens
            );
        }
        Ok(super::Generation { text, usage })
    }

    async fn generate_incremental(&self, prompt: &super::Prompt)
      -> Result<super::FragmentStream, crate::error::Error>
    {   debug!("Incremental generation with {}", self.model);
        let request = self.build_request(prompt, true);
        let response = self.post(&request).await?;

        let stream = async_stream::stream!
        {   let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await
            {   let chunk = match chunk
                {   Ok(chunk) => chunk
                  , Err(e) => {
                      error!("Stream read error: {}", e);
                      yield Err(crate::error::Error::HttpError(
                        e.to_string()
                      ));
                      return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // Split on raw bytes so multi-byte characters
                // cut across chunks are decoded whole.
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n')
                {   let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(&line)
                    {   SseLine::Skip => {}
                      , SseLine::Fragment(text) => {
                          yield Ok(text);
                        }
                      , SseLine::Done => {
                          debug!("OpenAI stream finished");
                          return;
                        }
                      , SseLine::Failed(e) => {
                          yield Err(e);
                          return;
                        }
                    }
                }
            }

            if !buffer.is_empty()
            {   let line = String::from_utf8_lossy(&buffer).into_owned();
                match parse_sse_line(&line)
                {   SseLine::Fragment(text) => {
                      yield Ok(text);
                    }
                  , SseLine::Failed(e) => {
                      yield Err(e);
                    }
                  , SseLine::Skip | SseLine::Done => {}
                }
            }
            debug!("OpenAI stream closed");
        };

        Ok(Box::pin(stream))
    }
}
