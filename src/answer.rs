use std::sync::Arc;

use crate::attachment::Attachment;
use crate::error::Result;
use crate::models::{ActiveConfiguration, Contents, GenerationRequest, Part, ReasoningEffort};
use crate::translator;
use crate::transport::Transport;

/// Returned in place of an answer whenever the generation call fails.
pub const SENTINEL_ANSWER: &str = "Error.";

/// Text part sent when the user attached images but typed nothing.
pub const FALLBACK_PROMPT: &str = "Solve this. Output answer only.";

const TEMPERATURE: f32 = 0.0;

/// Runs exactly one generation call per submission and always produces a string.
pub struct AnswerService {
    tx: Arc<dyn Transport>,
}

impl AnswerService {
    pub fn new(tx: Arc<dyn Transport>) -> Self {
        Self { tx }
    }

    /// Ask the service. Never fails: any error is logged and replaced by
    /// [`SENTINEL_ANSWER`], so every submission yields exactly one answer.
    pub async fn ask(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        config: &ActiveConfiguration,
    ) -> String {
        match self.try_ask(prompt, attachments, config).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    attachments = attachments.len(),
                    error = %e,
                    "Generation request failed, answering with sentinel"
                );
                SENTINEL_ANSWER.to_string()
            }
        }
    }

    async fn try_ask(
        &self,
        prompt: &str,
        attachments: &[Attachment],
        config: &ActiveConfiguration,
    ) -> Result<String> {
        let request = build_request(prompt, attachments, config)?;

        tracing::info!(
            tier = %request.model,
            max_output_tokens = request.max_output_tokens,
            prompt_len = prompt.len(),
            attachments = attachments.len(),
            "Sending generation request"
        );

        let response = self.tx.generate(&request).await?;
        Ok(response.text.unwrap_or_default())
    }
}

pub fn build_request(
    prompt: &str,
    attachments: &[Attachment],
    config: &ActiveConfiguration,
) -> Result<GenerationRequest> {
    let translation = translator::translate(config, !attachments.is_empty())?;

    let contents = if attachments.is_empty() {
        Contents::Text(prompt.to_string())
    } else {
        let text = if prompt.trim().is_empty() {
            FALLBACK_PROMPT
        } else {
            prompt
        };
        let mut parts: Vec<Part> = attachments
            .iter()
            .map(|attachment| {
                let image = attachment.decode();
                Part::Inline {
                    mime_type: image.mime_type,
                    data: image.data,
                }
            })
            .collect();
        parts.push(Part::Text(text.to_string()));
        Contents::Parts(parts)
    };

    Ok(GenerationRequest {
        model: translation.tier,
        system_instruction: translation.instruction,
        contents,
        temperature: TEMPERATURE,
        max_output_tokens: translation.token_budget,
        reasoning_effort: ReasoningEffort::Disabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OverlayError;
    use crate::models::{
        ExamConfiguration, ExamType, GenerationResponse, Language, ResponseStyle, Subject,
    };
    use crate::translator::Tier;
    use crate::transport::MockTransport;

    fn math_closed() -> ActiveConfiguration {
        ActiveConfiguration::new(ExamConfiguration {
            subject: Subject::Math,
            exam_type: ExamType::Closed,
            response_style: ResponseStyle::OptionOnly,
            language: Language::Es,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_text_only_request() {
        let mut mock = MockTransport::new();
        mock.expect_generate()
            .withf(|req| {
                req.model == Tier::Fast
                    && req.contents == Contents::Text("2+2=? A)3 B)4 C)5".to_string())
                    && req.temperature == 0.0
                    && req.max_output_tokens == 20
                    && req.reasoning_effort == ReasoningEffort::Disabled
                    && req.system_instruction.contains("OPTION ONLY")
            })
            .times(1)
            .returning(|_| {
                Ok(GenerationResponse {
                    text: Some("**B**".to_string()),
                })
            });

        let service = AnswerService::new(Arc::new(mock));
        let answer = service
            .ask("2+2=? A)3 B)4 C)5", &[], &math_closed())
            .await;
        assert_eq!(answer, "**B**");
    }

    #[tokio::test]
    async fn test_attachments_precede_text_part() {
        let attachments = vec![
            Attachment::from_data_url("data:image/png;base64,AAAA"),
            Attachment::from_data_url("BBBB"),
        ];

        let mut mock = MockTransport::new();
        mock.expect_generate()
            .withf(|req| {
                req.model == Tier::Vision
                    && req.system_instruction.contains("VISION:")
                    && req.contents
                        == Contents::Parts(vec![
                            Part::Inline {
                                mime_type: "image/png".to_string(),
                                data: "AAAA".to_string(),
                            },
                            Part::Inline {
                                mime_type: "image/jpeg".to_string(),
                                data: "BBBB".to_string(),
                            },
                            Part::Text(FALLBACK_PROMPT.to_string()),
                        ])
            })
            .times(1)
            .returning(|_| {
                Ok(GenerationResponse {
                    text: Some("**C**".to_string()),
                })
            });

        let service = AnswerService::new(Arc::new(mock));
        let answer = service.ask("   ", &attachments, &math_closed()).await;
        assert_eq!(answer, "**C**");
    }

    #[test]
    fn test_typed_text_used_with_attachments() {
        let attachments = vec![Attachment::from_data_url("data:image/png;base64,AAAA")];
        let req = build_request("which one?", &attachments, &math_closed()).unwrap();
        match req.contents {
            Contents::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[1], Part::Text("which one?".to_string()));
            }
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_text_becomes_empty_answer() {
        let mut mock = MockTransport::new();
        mock.expect_generate()
            .returning(|_| Ok(GenerationResponse { text: None }));

        let service = AnswerService::new(Arc::new(mock));
        assert_eq!(service.ask("hi", &[], &math_closed()).await, "");
    }

    #[tokio::test]
    async fn test_transport_failure_returns_sentinel() {
        let mut mock = MockTransport::new();
        mock.expect_generate()
            .times(1)
            .returning(|_| Err(OverlayError::Transport("connection refused".to_string())));

        let service = AnswerService::new(Arc::new(mock));
        assert_eq!(service.ask("hi", &[], &math_closed()).await, SENTINEL_ANSWER);
    }

    #[tokio::test]
    async fn test_quota_failure_returns_sentinel_without_retry() {
        let mut mock = MockTransport::new();
        mock.expect_generate().times(1).returning(|_| {
            Err(OverlayError::Api {
                status: 429,
                body: "RESOURCE_EXHAUSTED".to_string(),
            })
        });

        let service = AnswerService::new(Arc::new(mock));
        assert_eq!(service.ask("hi", &[], &math_closed()).await, "Error.");
    }
}
