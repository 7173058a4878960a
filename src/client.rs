use std::sync::Arc;
use tokio::sync::mpsc;
use log::{debug, error, info};
use crate::SummaryFoot;

/// Frames buffered per stream before the producer waits
pub const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Where the reply to a submitted request arrives
#[derive(Debug)]
pub enum Submission
{   /// One `GenerationResult`
    Single(mpsc::UnboundedReceiver<crate::GenerateReply>)
  , /// SSE frames, closed after the terminal one
    Frames(mpsc::Receiver<String>)
}

/// Public API for the summary backend - owns the router task
pub struct SummaryBackend
{   hand: crate::SummaryHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl SummaryBackend
{   /// Create and spawn a new backend around `summarizer`
    /// Returns immediately - spawns background task
    pub fn new(summarizer: crate::summarizer::Summarizer) -> Self
    {   debug!("Creating SummaryBackend with task ownership");

        let (generate_tx, generate_rx)
          = mpsc::unbounded_channel();
        let (generate_stream_tx, generate_stream_rx)
          = mpsc::unbounded_channel();
        let (kill_process_tx, kill_process_rx)
          = mpsc::unbounded_channel();

        let hand = crate::SummaryHand
        {   generate_tx
          , generate_stream_tx
          , kill_process_tx
        };

        let foot = crate::SummaryFoot
        {   generate_rx
          , generate_stream_rx
          , kill_process_rx
        };

        let summarizer = Arc::new(summarizer);
        let _task_handle = tokio::spawn(async move {
          run_backend_loop(foot, summarizer).await
        });

        SummaryBackend
        {   hand
          , _task_handle
        }
    }

    /// Queue a request in the mode its `stream` flag asks for
    pub async fn submit(
      &self
    , request: crate::request::GenerationRequest
    ) -> Result<Submission, crate::error::Error>
    {   if request.stream
        {   self.generate_stream(request).await.map(Submission::Frames)
        } else
        {   self.generate(request).await.map(Submission::Single)
        }
    }

    /// Queue a single-shot request - returns almost immediately
    pub async fn generate(
      &self
    , request: crate::request::GenerationRequest
    ) -> Result<
        mpsc::UnboundedReceiver<crate::GenerateReply>,
        crate::error::Error
      >
    {   debug!("generate queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GenerateArgs
        {   request
          , reply: reply_tx
        };

        self.hand.generate_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(reply_rx)
    }

    /// Queue a streaming request. The receiver yields SSE frames
    /// and closes after the terminal one; dropping it cancels.
    pub async fn generate_stream(
      &self
    , request: crate::request::GenerationRequest
    ) -> Result<
        mpsc::Receiver<String>,
        crate::error::Error
      >
    {   debug!("generate_stream queuing command");
        let (frames_tx, frames_rx)
          = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        let cmd = crate::GenerateStreamArgs
        {   request
          , frames: frames_tx
        };

        self.hand.generate_stream_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel closed");
            crate::error::Error::Other(
              "Backend disconnected".to_string()
            )
          })?;

        Ok(frames_rx)
    }

    /// Gracefully shutdown the backend. Requests already running
    /// keep their own tasks and finish.
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down SummaryBackend");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::KillProcessArgs
        {   reply: reply_tx
        };

        self.hand.kill_process_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel already closed");
            crate::error::Error::Other(
              "Backend already shutdown".to_string()
            )
          })?;

        match reply_rx.recv().await
        {   Some(result) => {
              debug!("Backend shutdown confirmed");
              result
            }
          , None => {
              error!("Backend exited without confirming shutdown");
              Err(crate::error::Error::Other(
                "Backend exited".to_string()
              ))
            }
        }
    }
}

/// Main backend event loop
///
/// tokio::select! only routes: every request gets its own task
/// and the loop goes straight back to waiting.
async fn run_backend_loop(
  foot: crate::SummaryFoot
, summarizer: Arc<crate::summarizer::Summarizer>
)
{   debug!(
      "Starting SummaryBackend event loop with provider {}",
      summarizer.provider_name()
    );
    let SummaryFoot
    {   mut generate_rx
      , mut generate_stream_rx
      , mut kill_process_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = generate_rx.recv() => {
          debug!("Received Generate");
          let summarizer = Arc::clone(&summarizer);
          tokio::spawn(async move {
            let result = summarizer.generate(&cmd.request).await;
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = generate_stream_rx.recv() => {
          debug!("Received GenerateStream");
          let events = summarizer.generate_stream(cmd.request);
          tokio::spawn(async move {
            let outcome = crate::emitter::StreamEmitter::pump(
              events,
              cmd.frames
            ).await;
            debug!("Stream task ended: {:?}", outcome);
          });
        }
      , Some(cmd) = kill_process_rx.recv() => {
          debug!("Received KillProcess");
          let _ = cmd.reply.send(Ok(()));
          info!("SummaryBackend shutting down");
          break;
        }
      , else => {
          debug!("All command channels closed");
          break;
        }
      }
    }
}
