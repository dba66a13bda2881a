use bpr_core::PARTIAL_OUTPUT_PLACEHOLDER;
use bpr_error::BprError;
use futures::StreamExt;

use crate::ChunkStream;

/// How a streaming call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed,
    Failed { error: BprError },
}

#[derive(Debug, Clone)]
pub struct CollectedResponse {
    pub text: String,
    pub outcome: StreamOutcome,
}

impl CollectedResponse {
    pub fn failed_before_start(error: BprError) -> Self {
        CollectedResponse {
            text: PARTIAL_OUTPUT_PLACEHOLDER.to_string(),
            outcome: StreamOutcome::Failed { error },
        }
    }
}

/// Drive a chunk stream to completion, accumulating text into a single
/// monotonically growing buffer.
///
/// `on_update` observes every buffer state after a non-empty append, in
/// arrival order; successive states are prefix-consistent and never shrink.
/// Empty payloads are not errors and do not render. A mid-stream failure
/// stops consumption but keeps whatever accumulated; a failure before any
/// text arrived substitutes the partial-output placeholder. There is no
/// cancellation or timeout: the stream runs until the source finishes or
/// fails.
pub async fn collect_stream<F>(mut stream: ChunkStream, mut on_update: F) -> CollectedResponse
where
    F: FnMut(&str),
{
    let mut buffer = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(payload) => {
                if payload.is_empty() {
                    continue;
                }
                buffer.push_str(&payload);
                on_update(&buffer);
            }
            Err(error) => {
                error.log("stream_collector");
                if buffer.is_empty() {
                    buffer = PARTIAL_OUTPUT_PLACEHOLDER.to_string();
                }
                return CollectedResponse {
                    text: buffer,
                    outcome: StreamOutcome::Failed { error },
                };
            }
        }
    }

    CollectedResponse {
        text: buffer,
        outcome: StreamOutcome::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpr_error::Result;
    use futures::stream;

    fn chunks(items: Vec<Result<String>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn buffer_states_are_prefix_consistent() {
        let source = chunks(vec![
            Ok("Overview: ".to_string()),
            Ok(String::new()),
            Ok("reduce ".to_string()),
            Ok("cost by 10%".to_string()),
        ]);

        let mut states: Vec<String> = Vec::new();
        let collected = collect_stream(source, |buf| states.push(buf.to_string())).await;

        assert_eq!(
            states,
            vec![
                "Overview: ".to_string(),
                "Overview: reduce ".to_string(),
                "Overview: reduce cost by 10%".to_string(),
            ]
        );
        for pair in states.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
            assert!(pair[1].len() >= pair[0].len());
        }
        assert_eq!(collected.text, "Overview: reduce cost by 10%");
        assert_eq!(collected.outcome, StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn failure_after_zero_chunks_substitutes_placeholder() {
        let source = chunks(vec![Err(BprError::LlmService {
            provider: "test".to_string(),
            message: "connection reset".to_string(),
            retry_after: None,
        })]);

        let collected = collect_stream(source, |_| {}).await;
        assert_eq!(collected.text, PARTIAL_OUTPUT_PLACEHOLDER);
        assert!(matches!(collected.outcome, StreamOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn failure_mid_stream_keeps_partial_buffer() {
        let source = chunks(vec![
            Ok("partial ".to_string()),
            Ok("answer".to_string()),
            Err(BprError::Network {
                operation: "http_request".to_string(),
                message: "broken pipe".to_string(),
            }),
            Ok("never seen".to_string()),
        ]);

        let collected = collect_stream(source, |_| {}).await;
        assert_eq!(collected.text, "partial answer");
        assert!(matches!(collected.outcome, StreamOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn empty_payloads_do_not_render() {
        let source = chunks(vec![Ok(String::new()), Ok(String::new())]);
        let mut renders = 0;
        let collected = collect_stream(source, |_| renders += 1).await;
        assert_eq!(renders, 0);
        assert_eq!(collected.text, "");
        assert_eq!(collected.outcome, StreamOutcome::Completed);
    }
}
