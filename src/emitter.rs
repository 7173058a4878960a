//! Stream events and their transport framing

use chrono::NaiveDate;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use log::{debug, error, info};

/// One step of an incremental generation.
/// Zero or more `Content`, then exactly one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent
{   Content
    {   content: String
      , accumulated: String
    }
  , Done
    {   summary: String
      , template_used: String
      , consultation_date: NaiveDate
    }
  , Error
    {   error: String
    }
}

impl StreamEvent
{   pub fn is_terminal(&self) -> bool
    {   !matches!(self, StreamEvent::Content { .. })
    }
}

/// `data: <json>` followed by a blank line
pub fn to_sse_frame(event: &StreamEvent)
  -> Result<String, crate::error::Error>
{   let payload = serde_json::to_string(event).map_err(|e| {
      error!("Failed to serialize stream event: {}", e);
      crate::error::Error::ParseError(e.to_string())
    })?;
    Ok(format!("data: {}\n\n", payload))
}

/// How a pumped stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome
{   /// `done` was delivered
    Completed { frames: usize }
  , /// `error` was delivered
    Failed { frames: usize }
  , /// Receiver went away first; nothing terminal was sent
    Cancelled { frames: usize }
}

/// Writes stream events to a caller transport in order
pub struct StreamEmitter;

impl StreamEmitter
{   /// Forward every event as an SSE frame until a terminal
    /// event has been sent or the receiver is dropped.
    ///
    /// The sender is dropped on return, which closes the
    /// transport. Once the receiver is gone no further event is
    /// pulled, so the provider behind `events` stops being read.
    pub async fn pump<S>(
      events: S
    , tx: mpsc::Sender<String>
    ) -> EmitOutcome
    where
      S: Stream<Item = StreamEvent> + Send
    {   let mut events = Box::pin(events);
        let mut frames = 0usize;

        loop
        { let next = tokio::select!
          { biased;
            _ = tx.closed() => {
              info!("Transport closed after {} frames", frames);
              return EmitOutcome::Cancelled { frames };
            }
          , next = events.next() => next
          };

          let Some(event) = next else
          {   // Only reachable if the source broke the
              // terminal-event contract.
              error!("Event stream ended without a terminal event");
              let frame = StreamEvent::Error
              {   error: "stream ended unexpectedly".to_string()
              };
              return Self::send_terminal(&tx, &frame, frames).await;
          };

          if event.is_terminal()
          {   return Self::send_terminal(&tx, &event, frames).await;
          }

          let frame = match to_sse_frame(&event)
          {   Ok(frame) => frame
            , Err(e) => {
                error!("Dropping unserializable content event: {}", e);
                continue;
              }
          };
          if tx.send(frame).await.is_err()
          {   info!("Transport closed after {} frames", frames);
              return EmitOutcome::Cancelled { frames };
          }
          frames += 1;
        }
    }

    async fn send_terminal(
      tx: &mpsc::Sender<String>
    , event: &StreamEvent
    , frames: usize
    ) -> EmitOutcome
    {   let frame = match to_sse_frame(event)
        {   Ok(frame) => frame
          , Err(e) => {
              let payload = serde_json::json!(
                { "type": "error", "error": e.to_string() }
              );
              format!("data: {}\n\n", payload)
            }
        };
        if tx.send(frame).await.is_err()
        {   info!("Transport closed before terminal frame");
            return EmitOutcome::Cancelled { frames };
        }
        let frames = frames + 1;
        debug!("Stream finished after {} frames", frames);
        match event
        {   StreamEvent::Done { .. } => EmitOutcome::Completed { frames }
          , _ => EmitOutcome::Failed { frames }
        }
    }
}
