//! Administrative analysis of a conversation transcript.
//!
//! The whole transcript is rendered to plain text, feedback tags included,
//! and sent as a single non-streamed request with the analysis sampling
//! settings. The reply is the report, returned verbatim.

use taliesin_llm::{Content, GenerationConfig, GenerationRequest, Role, SharedBackend};
use tracing::debug;

use crate::error::Result;
use crate::transcript::Transcript;

const ANALYSIS_PROMPT_HEADER: &str = "As the Admin Agent, provide a detailed session-based administrative report.

Structure your response with:
1. **Frequent Issues**: Identify recurring themes or problems mentioned in this session.
2. **Unresolved Incidents**: List any issues or reports that did not reach a successful conclusion.
3. **Session Summary**: A high-level overview of the user interaction.
4. **Knowledge Gaps**: Note any questions where the Knowledge Agent reported NOT FOUND.
5. **Performance Metrics**: Brief evaluation of resolution effectiveness based on user feedback.

CHAT TRANSCRIPT:
";

/// Render a transcript as the plain-text block the analysis prompt embeds.
pub fn render_transcript(transcript: &Transcript) -> String {
    transcript
        .turns()
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "USER",
                Role::Model => "MODEL",
            };
            let feedback = turn
                .feedback
                .map(|kind| format!(" [Feedback: {}]", kind.as_str()))
                .unwrap_or_default();
            format!("{}: {}{}", role, turn.content, feedback)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask the backend for the administrative report over one transcript.
pub async fn analyze_transcript(backend: SharedBackend, transcript: &Transcript) -> Result<String> {
    debug!(turns = transcript.len(), "Requesting administrative analysis");
    let prompt = format!("{}{}", ANALYSIS_PROMPT_HEADER, render_transcript(transcript));
    let request = GenerationRequest::new(vec![Content::user(prompt)])
        .with_config(GenerationConfig::analysis());
    let response = backend.generate(request).await?;
    Ok(response.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taliesin_llm::{MockBackend, MockReply};
    use taliesin_store::FeedbackKind;

    fn transcript_with_feedback() -> Transcript {
        let mut t = Transcript::new("Hello, how can I help?");
        t.push_user("my vpn is down");
        t.open_reply().unwrap();
        t.append_delta("Restart the client.").unwrap();
        let id = t.close_reply().unwrap();
        t.toggle_feedback(id, FeedbackKind::Negative).unwrap();
        t
    }

    #[test]
    fn test_render_marks_roles_and_feedback() {
        let rendered = render_transcript(&transcript_with_feedback());
        assert_eq!(
            rendered,
            "MODEL: Hello, how can I help?\n\n\
             USER: my vpn is down\n\n\
             MODEL: Restart the client. [Feedback: negative]"
        );
    }

    #[tokio::test]
    async fn test_analysis_request_shape() {
        let backend = Arc::new(MockBackend::with_replies(
            "mock",
            vec![MockReply::text("1. **Frequent Issues**: VPN trouble.")],
        ));
        let report = analyze_transcript(backend.clone(), &transcript_with_feedback())
            .await
            .unwrap();
        assert_eq!(report, "1. **Frequent Issues**: VPN trouble.");

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].contents.len(), 1);
        let prompt = requests[0].contents[0].text();
        assert!(prompt.starts_with("As the Admin Agent"));
        assert!(prompt.contains("CHAT TRANSCRIPT:\nMODEL: Hello, how can I help?"));
        assert!(prompt.contains("[Feedback: negative]"));
        assert_eq!(
            requests[0].generation_config.as_ref().unwrap().temperature,
            Some(0.2)
        );
        assert!(requests[0].tools.is_empty());
        assert!(requests[0].system_instruction.is_none());
    }
}
