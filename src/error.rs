use std::fmt;

/// Error type for the summarization pipeline
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Explicitly requested template does not exist
    TemplateNotFound(i64)
  , /// No template is flagged active
    NoActiveTemplate
  , /// Template text is missing the input slot
    MalformedTemplate(String)
  , /// Source text was empty or whitespace only
    EmptySourceText
  , /// No credential configured and no fallback allowed
    ProviderUnavailable(String)
  , /// HTTP request error
    HttpError(String)
  , /// API returned an error response
    ApiError(String)
  , /// Failed to parse API response
    ParseError(String)
  , /// No choices in API response
    NoChoicesInResponse
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Generic error
    Other(String)
}

impl Error
{   /// True for failures raised by a generation backend call
    pub fn is_provider_error(&self) -> bool
    {   matches!(
          self
        , Error::HttpError(_)
          | Error::ApiError(_)
          | Error::ParseError(_)
          | Error::NoChoicesInResponse
        )
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::TemplateNotFound(id) => {
              write!(f, "Prompt template not found: {}", id)
            }
          , Error::NoActiveTemplate => {
              write!(f, "No active prompt template available")
            }
          , Error::MalformedTemplate(name) => {
              write!(f,
                "Prompt template '{}' has no {} slot",
                name,
                crate::template::INPUT_SLOT
              )
            }
          , Error::EmptySourceText => {
              write!(f, "Source text is empty")
            }
          , Error::ProviderUnavailable(provider) => {
              write!(f,
                "Generation provider unavailable: {}",
                provider
              )
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ApiError(msg) => {
              write!(f, "API error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::NoChoicesInResponse => {
              write!(f, "API response contained no choices")
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
