use std::sync::Arc;
use clap::Parser;
use log::{error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use consult_summarizer::{
  GenerationRequest, InMemoryTemplateStore, PromptTemplate,
  Submission, SummaryBackend, Summarizer, SummarizerConfig
};

const DEFAULT_TEMPLATE: &str = "\
다음 일본어 상담 내용을 한국어로 번역하고 요약해주세요:

---
{input_text}
---

고객 정보, 관심 시술, 상담 결과, 다음 상담 시 참고사항 순서로 정리해주세요.";

/// Summarize a consultation transcript read from stdin
#[derive(Debug, Parser)]
#[command(name = "summarize")]
struct Args
{   /// Print one JSON result instead of streaming SSE frames
    #[arg(long)]
    once: bool

  , /// File holding the template text (must contain {input_text})
    #[arg(long)]
    template_file: Option<std::path::PathBuf>

  , /// Consultation date echoed in the final frame (YYYY-MM-DD)
    #[arg(long)]
    date: Option<chrono::NaiveDate>
}

#[tokio::main]
async fn main()
{   env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args).await
    {   error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), consult_summarizer::Error>
{   let template_text = match &args.template_file
    {   Some(path) => tokio::fs::read_to_string(path)
          .await
          .map_err(|e| {
            consult_summarizer::Error::InvalidConfiguration(
              format!("{}: {}", path.display(), e)
            )
          })?
      , None => DEFAULT_TEMPLATE.to_string()
    };
    let store = InMemoryTemplateStore::new(vec![
      PromptTemplate::new(
        1
      , "기본 상담 요약 템플릿"
      , "1.0"
      , template_text
      , chrono::Utc::now()
      )
    ]);

    let mut source_text = String::new();
    tokio::io::stdin()
      .read_to_string(&mut source_text)
      .await
      .map_err(|e| consult_summarizer::Error::Other(e.to_string()))?;

    let summarizer = Summarizer::new(
      SummarizerConfig::from_env()
    , Arc::new(store)
    )?;
    info!("Summarizing with {}", summarizer.provider_name());

    let mut request = GenerationRequest::new(source_text);
    request.consultation_date = args.date;
    request.stream = !args.once;

    let backend = SummaryBackend::new(summarizer);
    let mut stdout = tokio::io::stdout();

    match backend.submit(request).await?
    {   Submission::Single(mut reply) => {
          if let Some(result) = reply.recv().await
          {   let json = serde_json::to_string_pretty(&result)
                .map_err(|e| {
                  consult_summarizer::Error::ParseError(e.to_string())
                })?;
              write_out(&mut stdout, &json).await?;
              write_out(&mut stdout, "\n").await?;
          }
        }
      , Submission::Frames(mut frames) => {
          while let Some(frame) = frames.recv().await
          {   write_out(&mut stdout, &frame).await?;
          }
        }
    }

    backend.shutdown().await
}

async fn write_out(
  stdout: &mut tokio::io::Stdout
, text: &str
) -> Result<(), consult_summarizer::Error>
{   stdout.write_all(text.as_bytes())
      .await
      .map_err(|e| consult_summarizer::Error::Other(e.to_string()))?;
    stdout.flush()
      .await
      .map_err(|e| consult_summarizer::Error::Other(e.to_string()))
}
