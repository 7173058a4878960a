use async_trait::async_trait;
use log::{debug, info};

pub const PROVIDER_NAME: &str = "placeholder-for-development";

/// Fixed body returned by the placeholder provider
pub const PLACEHOLDER_BODY: &str = "\
## 🧑 고객 정보 요약
- 연령대: 30대 추정
- 주요 피부 고민: 이마 주름, 표정 주름

## 💉 관심 시술 및 실제 제안 시술
- 고객이 직접 언급한 시술: 보톡스
- 고객 반응: 긍정적, 추가 정보 요청

## ✅ 상담 결과 및 결정 사항
- 보톡스 시술 검토 중

## 🔁 다음 상담 시 참고사항
- 안전성에 대한 우려 해소 필요

※ [PLACEHOLDER] 개발용 더미 응답입니다. 실제 AI 분석 결과가 아닙니다.";

/// Provider used when no credential is configured.
/// Deterministic, offline, never fails, reports no usage.
#[derive(Debug, Clone, Default)]
pub struct FallbackStubProvider;

impl FallbackStubProvider
{   pub fn new() -> Self
    {   debug!("Creating FallbackStubProvider");
        FallbackStubProvider
    }

    /// Body split into line fragments, newlines kept
    fn fragments() -> Vec<String>
    {   PLACEHOLDER_BODY
          .split_inclusive('\n')
          .map(str::to_string)
          .collect()
    }
}

#[async_trait]
impl super::GenerationProvider for FallbackStubProvider
{   fn name(&self) -> &str
    {   PROVIDER_NAME
    }

    async fn generate(&self, prompt: &super::Prompt)
      -> Result<super::Generation, crate::error::Error>
    {   info!(
          "Placeholder summary for {} chars of prompt",
          prompt.text.chars().count()
        );
        Ok(super::Generation
        {   text: PLACEHOLDER_BODY.to_string()
          , usage: None
        })
    }

    async fn generate_incremental(&self, prompt: &super::Prompt)
      -> Result<super::FragmentStream, crate::error::Error>
    {   info!(
          "Placeholder stream for {} chars of prompt",
          prompt.text.chars().count()
        );
        let fragments = Self::fragments()
          .into_iter()
          .map(Ok::<String, crate::error::Error>);
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}
