//! Streaming generation as a lazy sequence of text increments.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::normalized::{NormalizedEvent, event_name};

use super::{LlmDriver, LlmRequest};

/// One step of a generated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Increment {
    /// Non-empty text to append to the answer.
    Text(String),
    /// Generation failed; this is always the last increment.
    Error(String),
}

/// Stream the answer for `req` as text increments.
///
/// Empty deltas are dropped. Any failure (request rejected, transport error, provider error
/// event) yields one [`Increment::Error`] and ends the stream.
pub fn generate_stream(
    driver: Arc<dyn LlmDriver>,
    req: LlmRequest,
) -> impl Stream<Item = Increment> + Send {
    async_stream::stream! {
        let events = match driver.stream(req).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create driver stream");
                yield Increment::Error(e.to_string());
                return;
            }
        };

        futures::pin_mut!(events);
        while let Some(result) = events.next().await {
            match result {
                Ok(NormalizedEvent::MessageDelta { text }) => {
                    if !text.is_empty() {
                        yield Increment::Text(text);
                    }
                }
                Ok(NormalizedEvent::Error { message, code }) => {
                    tracing::error!(error = %message, code = ?code, "Provider reported an error");
                    yield Increment::Error(message);
                    return;
                }
                Ok(NormalizedEvent::Done) => return,
                Ok(other) => {
                    tracing::trace!(event = event_name(&other), "Ignoring driver event");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Generation stream interrupted");
                    yield Increment::Error(e.to_string());
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EventStream;
    use futures::stream;

    #[derive(Debug)]
    struct ScriptedDriver {
        events: Vec<Result<NormalizedEvent, String>>,
        reject: bool,
    }

    #[async_trait::async_trait]
    impl LlmDriver for ScriptedDriver {
        async fn stream(&self, _req: LlmRequest) -> anyhow::Result<EventStream> {
            if self.reject {
                anyhow::bail!("401 Unauthorized");
            }
            let items: Vec<anyhow::Result<NormalizedEvent>> = self
                .events
                .iter()
                .cloned()
                .map(|r| r.map_err(anyhow::Error::msg))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn delta(text: &str) -> Result<NormalizedEvent, String> {
        Ok(NormalizedEvent::MessageDelta {
            text: text.to_string(),
        })
    }

    async fn collect(driver: ScriptedDriver) -> Vec<Increment> {
        generate_stream(Arc::new(driver), LlmRequest { messages: vec![] })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_text_increments_until_done() {
        let out = collect(ScriptedDriver {
            events: vec![
                Ok(NormalizedEvent::StreamStart {
                    request_id: "r1".into(),
                }),
                delta("All warfare "),
                delta(""),
                delta("is deception."),
                Ok(NormalizedEvent::Done),
                delta("ignored"),
            ],
            reject: false,
        })
        .await;

        assert_eq!(
            out,
            vec![
                Increment::Text("All warfare ".into()),
                Increment::Text("is deception.".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_request_is_single_error() {
        let out = collect(ScriptedDriver {
            events: vec![],
            reject: true,
        })
        .await;
        assert_eq!(out, vec![Increment::Error("401 Unauthorized".into())]);
    }

    #[tokio::test]
    async fn test_transport_error_terminates() {
        let out = collect(ScriptedDriver {
            events: vec![delta("partial"), Err("connection reset".into()), delta("never")],
            reject: false,
        })
        .await;
        assert_eq!(
            out,
            vec![
                Increment::Text("partial".into()),
                Increment::Error("connection reset".into()),
            ]
        );
    }
}
