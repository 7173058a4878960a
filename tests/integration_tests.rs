use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use consult_summarizer::emitter::{EmitOutcome, StreamEmitter, StreamEvent};
use consult_summarizer::error::Error;
use consult_summarizer::normalize::normalize;
use consult_summarizer::persist::{
  InMemorySummarySink, SummaryRecord, SummarySink
};
use consult_summarizer::providers::{
  FragmentStream, Generation, GenerationProvider, Prompt
};
use consult_summarizer::providers::fallback::{
  PLACEHOLDER_BODY, PROVIDER_NAME as FALLBACK_NAME
};
use consult_summarizer::request::SummaryDraft;
use consult_summarizer::usage::UsageReport;
use consult_summarizer::{
  GenerationRequest, InMemoryTemplateStore, PromptTemplate, Submission,
  SummaryBackend, SummaryMetadata, Summarizer, SummarizerConfig
};

fn init_logging()
{   let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic provider replaying fixed fragments
struct ScriptedProvider
{   fragments: Vec<Result<String, Error>>
  , hang_after: bool
  , calls: Arc<AtomicUsize>
  , pulled: Arc<AtomicUsize>
}

impl ScriptedProvider
{   fn new(fragments: &[&str]) -> Self
    {   ScriptedProvider
        {   fragments: fragments
              .iter()
              .map(|f| Ok(f.to_string()))
              .collect()
          , hang_after: false
          , calls: Arc::new(AtomicUsize::new(0))
          , pulled: Arc::new(AtomicUsize::new(0))
        }
    }

    fn failing_after(fragments: &[&str], error: Error) -> Self
    {   let mut provider = ScriptedProvider::new(fragments);
        provider.fragments.push(Err(error));
        provider
    }

    /// Never finishes after the scripted fragments
    fn hanging(fragments: &[&str]) -> Self
    {   let mut provider = ScriptedProvider::new(fragments);
        provider.hang_after = true;
        provider
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider
{   fn name(&self) -> &str
    {   "scripted"
    }

    async fn generate(&self, _prompt: &Prompt)
      -> Result<Generation, Error>
    {   self.calls.fetch_add(1, Ordering::SeqCst);
        let mut text = String::new();
        for fragment in &self.fragments
        {   text.push_str(&fragment.clone()?);
        }
        Ok(Generation
        {   text
          , usage: Some(UsageReport
            {   prompt_tokens: Some(12)
              , completion_tokens: Some(5)
              , total_tokens: Some(17)
              , prompt_tokens_details: None
            })
        })
    }

    async fn generate_incremental(&self, _prompt: &Prompt)
      -> Result<FragmentStream, Error>
    {   self.calls.fetch_add(1, Ordering::SeqCst);
        let pulled = Arc::clone(&self.pulled);
        let scripted = futures::stream::iter(self.fragments.clone())
          .inspect(move |_| { pulled.fetch_add(1, Ordering::SeqCst); });
        if self.hang_after
        {   Ok(Box::pin(scripted.chain(futures::stream::pending())))
        } else
        {   Ok(Box::pin(scripted))
        }
    }
}

fn at(day: u32) -> chrono::DateTime<Utc>
{   Utc.with_ymd_and_hms(2025, 5, day, 10, 0, 0)
      .single()
      .expect("valid timestamp")
}

fn template(id: i64, name: &str, day: u32, active: bool) -> PromptTemplate
{   let mut t = PromptTemplate::new(
      id, name, "1.0", "Summarize: {input_text}", at(day)
    );
    t.is_active = active;
    t
}

fn default_store() -> Arc<InMemoryTemplateStore>
{   Arc::new(InMemoryTemplateStore::new(vec![
      template(1, "old", 1, true)
    , template(2, "retired", 20, false)
    , template(3, "current", 10, true)
    ]))
}

fn summarizer_with(provider: ScriptedProvider) -> Summarizer
{   Summarizer::with_provider(
      SummarizerConfig::default()
    , default_store()
    , Arc::new(provider)
    )
}

fn consultation_date() -> NaiveDate
{   NaiveDate::from_ymd_opt(2025, 5, 21).expect("date")
}

async fn collect_events(summarizer: &Summarizer, request: GenerationRequest)
  -> Vec<StreamEvent>
{   summarizer.generate_stream(request).collect().await
}

// ===== Template resolution =====

#[tokio::test]
async fn missing_explicit_template_fails_without_provider_call()
{   init_logging();
    let provider = ScriptedProvider::new(&["unused"]);
    let calls = Arc::clone(&provider.calls);
    let summarizer = summarizer_with(provider);

    let result = summarizer
      .generate(&GenerationRequest::new("相談内容").with_template(7))
      .await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(Error::TemplateNotFound(7)));
    assert_eq!(result.original_text, "相談内容");
    assert!(result.summary.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn explicit_template_ignores_active_flag()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["x"]));
    let template = assert_ok!(summarizer.resolve_template(Some(2)));
    assert_eq!(template.id, 2);
    assert!(!template.is_active);
}

#[tokio::test]
async fn default_template_is_latest_active()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["x"]));
    let template = assert_ok!(summarizer.resolve_template(None));
    assert_eq!(template.id, 3);

    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    assert_eq!(result.template_id, Some(3));
    assert_eq!(result.template_name.as_deref(), Some("current"));
}

#[tokio::test]
async fn no_active_template_is_reported()
{   let store = Arc::new(InMemoryTemplateStore::new(vec![
      template(1, "off", 1, false)
    ]));
    let summarizer = Summarizer::with_provider(
      SummarizerConfig::default()
    , store
    , Arc::new(ScriptedProvider::new(&["x"]))
    );
    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    assert_eq!(result.error_kind, Some(Error::NoActiveTemplate));
}

#[tokio::test]
async fn malformed_template_never_reaches_provider()
{   let mut broken = template(5, "broken", 1, true);
    broken.template_text = "Summarize the consultation".to_string();
    let provider = ScriptedProvider::new(&["x"]);
    let calls = Arc::clone(&provider.calls);
    let summarizer = Summarizer::with_provider(
      SummarizerConfig::default()
    , Arc::new(InMemoryTemplateStore::new(vec![broken]))
    , Arc::new(provider)
    );

    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    assert_eq!(
      result.error_kind
    , Some(Error::MalformedTemplate("broken".to_string()))
    );

    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容").streaming()
    ).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::Error { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_source_text_is_rejected()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["x"]));
    let result = summarizer
      .generate(&GenerationRequest::new("  \n "))
      .await;
    assert_eq!(result.error_kind, Some(Error::EmptySourceText));
}

// ===== Single-shot and streaming =====

#[tokio::test]
async fn single_shot_normalizes_and_accounts_usage()
{   let summarizer = summarizer_with(
      ScriptedProvider::new(&["## Result\n", "**ok**"])
    );
    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;

    assert!(result.success);
    assert_eq!(result.summary.as_deref(), Some("Result\nok"));
    assert_eq!(result.provider.as_deref(), Some("scripted"));
    assert_eq!(result.usage.input_tokens, 12);
    assert_eq!(result.usage.output_tokens, 5);
    assert_eq!(result.usage.total_tokens, 17);
    assert_eq!(result.usage.cached_input_tokens, 0);
    assert_eq!(result.source_language.as_deref(), Some("ja"));
    assert_eq!(result.target_language.as_deref(), Some("ko"));
}

#[tokio::test]
async fn stream_emits_content_then_done()
{   let summarizer = summarizer_with(
      ScriptedProvider::new(&["## Result\n", "**ok**"])
    );
    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容")
        .streaming()
        .with_date(consultation_date())
    ).await;

    assert_eq!(
      events
    , vec![
        StreamEvent::Content
        {   content: "## Result\n".to_string()
          , accumulated: "## Result\n".to_string()
        }
      , StreamEvent::Content
        {   content: "**ok**".to_string()
          , accumulated: "## Result\n**ok**".to_string()
        }
      , StreamEvent::Done
        {   summary: "Result\nok".to_string()
          , template_used: "current".to_string()
          , consultation_date: consultation_date()
        }
      ]
    );
}

#[tokio::test]
async fn stream_and_single_shot_agree()
{   let fragments = [
      "## 🧑 고객 정보\n", "- 연령대: **30대**\n\n\n\n"
    , "---\n", "### ✅ 결과\n- *보톡스* 검토\n"
    ];
    let summarizer = summarizer_with(ScriptedProvider::new(&fragments));
    let request = GenerationRequest::new("相談内容");

    let single = summarizer.generate(&request).await;
    let events = collect_events(&summarizer, request.clone()).await;

    let concatenated: String = events
      .iter()
      .filter_map(|e| match e
      {   StreamEvent::Content { content, .. } => Some(content.as_str())
        , _ => None
      })
      .collect();
    let Some(StreamEvent::Done { summary, .. }) = events.last() else
    {   panic!("expected done event, got {:?}", events.last());
    };

    assert_eq!(&normalize(&concatenated), summary);
    assert_eq!(single.summary.as_ref(), Some(summary));
}

#[tokio::test]
async fn mid_stream_failure_ends_with_single_error()
{   let summarizer = summarizer_with(ScriptedProvider::failing_after(
      &["partial "]
    , Error::ApiError("rate limited".to_string())
    ));
    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容").streaming()
    ).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Content { .. }));
    assert_eq!(
      events[1]
    , StreamEvent::Error
      {   error: "API error: rate limited".to_string()
      }
    );
}

#[tokio::test]
async fn provider_failure_is_a_failed_result()
{   let summarizer = summarizer_with(ScriptedProvider::failing_after(
      &["partial"]
    , Error::HttpError("connection reset".to_string())
    ));
    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("HTTP error: connection reset"));
    assert_eq!(result.original_text, "相談内容");
}

// ===== Cancellation =====

#[tokio::test]
async fn dropping_stream_stops_provider()
{   let provider = ScriptedProvider::hanging(&["first", "second"]);
    let pulled = Arc::clone(&provider.pulled);
    let summarizer = summarizer_with(provider);

    let mut events = summarizer
      .generate_stream(GenerationRequest::new("相談内容").streaming());
    let first = events.next().await;
    assert!(matches!(first, Some(StreamEvent::Content { .. })));
    drop(events);

    assert_eq!(pulled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn closed_transport_cancels_without_terminal_event()
{   init_logging();
    let provider = ScriptedProvider::hanging(&["first"]);
    let pulled = Arc::clone(&provider.pulled);
    let summarizer = summarizer_with(provider);
    let sink = InMemorySummarySink::new();

    let events = summarizer
      .generate_stream(GenerationRequest::new("相談内容").streaming());
    let (tx, mut rx) = mpsc::channel(4);
    let pump = tokio::spawn(StreamEmitter::pump(events, tx));

    let frame = rx.recv().await.expect("first frame");
    assert!(frame.starts_with("data: {\"type\":\"content\""));
    drop(rx);

    let outcome = pump.await.expect("pump task");
    assert_eq!(outcome, EmitOutcome::Cancelled { frames: 1 });
    assert_eq!(pulled.load(Ordering::SeqCst), 1);
    assert!(sink.is_empty());
}

// ===== Provider selection =====

#[tokio::test]
async fn fallback_provider_without_credential()
{   let summarizer = assert_ok!(Summarizer::new(
      SummarizerConfig::default()
    , default_store()
    ));
    assert_eq!(summarizer.provider_name(), FALLBACK_NAME);

    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    assert!(result.success);
    assert_eq!(result.summary, Some(normalize(PLACEHOLDER_BODY)));
    assert!(result.usage.is_zero());

    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容").streaming()
    ).await;
    let Some(StreamEvent::Content { accumulated, .. }) = events
      .iter()
      .rev()
      .find(|e| matches!(e, StreamEvent::Content { .. }))
    else
    {   panic!("expected content events");
    };
    assert_eq!(accumulated, PLACEHOLDER_BODY);
    assert!(matches!(
      events.last()
    , Some(StreamEvent::Done { summary, .. }) if *summary == normalize(PLACEHOLDER_BODY)
    ));
}

#[tokio::test]
async fn disabled_fallback_reports_unavailable()
{   let config = SummarizerConfig
    {   fallback_enabled: false
      , ..SummarizerConfig::default()
    };
    let summarizer = assert_ok!(Summarizer::new(config, default_store()));

    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    assert!(matches!(
      result.error_kind
    , Some(Error::ProviderUnavailable(_))
    ));

    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容").streaming()
    ).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::Error { .. }));
}

#[tokio::test]
async fn invalid_config_is_rejected()
{   let config = SummarizerConfig
    {   max_tokens: 0
      , ..SummarizerConfig::default()
    };
    assert!(matches!(
      Summarizer::new(config, default_store())
    , Err(Error::InvalidConfiguration(_))
    ));
}

// ===== Persistence boundary =====

#[tokio::test]
async fn create_summary_passes_metadata_through()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["**요약**"]));
    let sink = InMemorySummarySink::new();
    let metadata = SummaryMetadata
    {   consultant_name: Some("佐藤".to_string())
      , customer_name: Some("  김 고객 ".to_string())
      , consultation_title: None
    };

    let (id, result) = assert_ok!(
      summarizer.create_summary(
        &GenerationRequest::new("相談内容").with_date(consultation_date())
      , metadata.clone()
      , &sink
      ).await
    );

    assert_eq!(id, 1);
    assert!(result.success);
    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0].1;
    assert_eq!(record.summary_text, "요약");
    assert_eq!(record.original_text, "相談内容");
    assert_eq!(record.template_id, Some(3));
    assert_eq!(record.consultation_date, consultation_date());
    assert_eq!(record.metadata, metadata);
}

#[tokio::test]
async fn failed_generation_is_not_persisted()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["x"]));
    let sink = InMemorySummarySink::new();
    let outcome = summarizer.create_summary(
      &GenerationRequest::new("相談内容").with_template(42)
    , SummaryMetadata::default()
    , &sink
    ).await;
    assert_eq!(outcome.err(), Some(Error::TemplateNotFound(42)));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn direct_summary_is_stored_verbatim()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["x"]));
    let sink = InMemorySummarySink::new();
    let draft = SummaryDraft
    {   consultation_date: consultation_date()
      , original_text: "相談内容".to_string()
      , summary_text: "## 편집된 요약".to_string()
      , template_id: Some(2)
      , metadata: SummaryMetadata
        {   consultation_title: Some("첫 상담".to_string())
          , ..SummaryMetadata::default()
        }
    };

    let id = assert_ok!(summarizer.create_summary_direct(draft, &sink));
    let records = sink.records();
    assert_eq!(records[0].0, id);
    assert_eq!(records[0].1.summary_text, "## 편집된 요약");
    assert_eq!(
      records[0].1.metadata.consultation_title.as_deref()
    , Some("첫 상담")
    );

    let missing = SummaryDraft
    {   consultation_date: consultation_date()
      , original_text: "相談内容".to_string()
      , summary_text: "요약".to_string()
      , template_id: Some(99)
      , metadata: SummaryMetadata::default()
    };
    assert_eq!(
      summarizer.create_summary_direct(missing, &sink)
    , Err(Error::TemplateNotFound(99))
    );
    assert_eq!(sink.len(), 1);
}

/// Sink that refuses every write
struct RejectingSink;

impl SummarySink for RejectingSink
{   fn save(&self, _record: SummaryRecord)
      -> Result<i64, Error>
    {   Err(Error::Other("disk full".to_string()))
    }
}

#[tokio::test]
async fn sink_failure_is_returned()
{   let summarizer = summarizer_with(ScriptedProvider::new(&["x"]));
    let outcome = summarizer.create_summary(
      &GenerationRequest::new("相談内容")
    , SummaryMetadata::default()
    , &RejectingSink
    ).await;
    assert_eq!(outcome.err(), Some(Error::Other("disk full".to_string())));
}

// ===== OpenAI provider over HTTP =====

fn openai_config(url: String) -> SummarizerConfig
{   SummarizerConfig
    {   api_key: Some("sk-test".to_string())
      , api_base: url
      , ..SummarizerConfig::default()
    }
}

#[tokio::test]
async fn openai_single_shot_reports_usage()
{   init_logging();
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/chat/completions")
      .match_header("authorization", "Bearer sk-test")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r###"{
        "choices":[{"message":{"role":"assistant",
          "content":"## 요약\n**보톡스** 상담"},"finish_reason":"stop"}],
        "usage":{"prompt_tokens":300,"completion_tokens":40,
          "total_tokens":340,
          "prompt_tokens_details":{"cached_tokens":128}}
      }"###)
      .create_async()
      .await;

    let summarizer = assert_ok!(Summarizer::new(
      openai_config(server.url())
    , default_store()
    ));
    assert_eq!(summarizer.provider_name(), "openai");

    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;
    mock.assert_async().await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.summary.as_deref(), Some("요약\n보톡스 상담"));
    assert_eq!(result.usage.input_tokens, 300);
    assert_eq!(result.usage.output_tokens, 40);
    assert_eq!(result.usage.total_tokens, 340);
    assert_eq!(result.usage.cached_input_tokens, 128);
}

#[tokio::test]
async fn openai_error_status_is_a_failed_result()
{   let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/chat/completions")
      .with_status(429)
      .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
      .create_async()
      .await;

    let summarizer = assert_ok!(Summarizer::new(
      openai_config(server.url())
    , default_store()
    ));
    let result = summarizer
      .generate(&GenerationRequest::new("相談内容"))
      .await;

    assert!(!result.success);
    assert!(matches!(result.error_kind, Some(Error::ApiError(_))));
    assert!(result.error.unwrap_or_default().contains("Rate limit reached"));
}

#[tokio::test]
async fn openai_stream_is_reassembled()
{   let mut server = mockito::Server::new_async().await;
    let body = concat!(
      "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
      "data: {\"choices\":[{\"delta\":{\"content\":\"## 결과\\n\"}}]}\n\n",
      "data: {\"choices\":[{\"delta\":{\"content\":\"**완료**\"}}]}\n\n",
      "data: [DONE]\n\n"
    );
    let _mock = server
      .mock("POST", "/chat/completions")
      .with_status(200)
      .with_header("content-type", "text/event-stream")
      .with_body(body)
      .create_async()
      .await;

    let summarizer = assert_ok!(Summarizer::new(
      openai_config(server.url())
    , default_store()
    ));
    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容").streaming()
    ).await;

    assert_eq!(events.len(), 3, "{:?}", events);
    assert_eq!(
      events[1]
    , StreamEvent::Content
      {   content: "**완료**".to_string()
        , accumulated: "## 결과\n**완료**".to_string()
      }
    );
    assert!(matches!(
      &events[2]
    , StreamEvent::Done { summary, .. } if summary == "결과\n완료"
    ));
}

#[tokio::test]
async fn openai_stream_error_payload_ends_stream()
{   let mut server = mockito::Server::new_async().await;
    let body = concat!(
      "data: {\"choices\":[{\"delta\":{\"content\":\"부분\"}}]}\n\n",
      "data: {\"error\":{\"message\":\"server overloaded\"}}\n\n",
      "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n"
    );
    let _mock = server
      .mock("POST", "/chat/completions")
      .with_status(200)
      .with_body(body)
      .create_async()
      .await;

    let summarizer = assert_ok!(Summarizer::new(
      openai_config(server.url())
    , default_store()
    ));
    let events = collect_events(
      &summarizer
    , GenerationRequest::new("相談内容").streaming()
    ).await;

    assert_eq!(events.len(), 2, "{:?}", events);
    assert_eq!(
      events[1]
    , StreamEvent::Error
      {   error: "API error: OpenAI error: server overloaded".to_string()
      }
    );
}

// ===== Backend task router =====

#[tokio::test]
async fn backend_serves_single_shot_and_stream()
{   init_logging();
    let summarizer = assert_ok!(Summarizer::new(
      SummarizerConfig::default()
    , default_store()
    ));
    let backend = SummaryBackend::new(summarizer);

    let mut reply = assert_ok!(
      backend.generate(GenerationRequest::new("相談内容")).await
    );
    let result = reply.recv().await.expect("result");
    assert!(result.success);

    let mut frames = assert_ok!(
      backend
        .generate_stream(
          GenerationRequest::new("相談内容")
            .streaming()
            .with_date(consultation_date())
        )
        .await
    );
    let mut received = Vec::new();
    while let Some(frame) = frames.recv().await
    {   received.push(frame);
    }
    let last = received.last().expect("frames");
    assert!(last.starts_with("data: {\"type\":\"done\""));
    assert!(last.contains("\"consultation_date\":\"2025-05-21\""));
    assert!(received
      .iter()
      .all(|f| f.starts_with("data: ") && f.ends_with("\n\n")));

    assert_ok!(backend.shutdown().await);
}

#[tokio::test]
async fn backend_submit_follows_stream_flag()
{   let backend = SummaryBackend::new(
      summarizer_with(ScriptedProvider::new(&["## Result\n", "**ok**"]))
    );

    match assert_ok!(backend.submit(GenerationRequest::new("相談内容")).await)
    {   Submission::Single(mut reply) => {
          let result = reply.recv().await.expect("result");
          assert_eq!(result.summary.as_deref(), Some("Result\nok"));
        }
      , other => panic!("expected a single result, got {:?}", other)
    }

    let streaming = GenerationRequest::new("相談内容").streaming();
    match assert_ok!(backend.submit(streaming).await)
    {   Submission::Frames(mut frames) => {
          let mut received = Vec::new();
          while let Some(frame) = frames.recv().await
          {   received.push(frame);
          }
          assert_eq!(received.len(), 3);
          assert!(received[0].starts_with("data: {\"type\":\"content\""));
          assert!(received[2].starts_with("data: {\"type\":\"done\""));
        }
      , other => panic!("expected frames, got {:?}", other)
    }

    assert_ok!(backend.shutdown().await);
}
