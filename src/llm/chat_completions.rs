//! OpenAI Chat Completions API driver.
//!
//! Streams `/v1/chat/completions` server-sent events and emits assistant text as
//! [`NormalizedEvent::MessageDelta`]s.

use futures::StreamExt;

use crate::normalized::NormalizedEvent;

use super::{EventStream, LlmDriver, LlmRequest, LlmSettings};

/// Driver for the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);

        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "temperature": self.settings.temperature,
            "messages": req.messages,
        });

        let rb = self.http.post(&url).json(&body);
        let rb = self
            .settings
            .provider
            .authorize(rb, self.settings.api_key.as_deref());

        let resp = rb.send().await?.error_for_status()?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = SseBuffer::default();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.push(&chunk);

                while let Some(frame) = buf.next_frame() {
                    let text = String::from_utf8_lossy(&frame);

                    for data in text.lines().filter_map(sse_data) {
                        if data == "[DONE]" {
                            yield NormalizedEvent::Done;
                            continue;
                        }

                        let v: serde_json::Value = serde_json::from_str(data)?;
                        if let Some(event) = parse_chunk(&v) {
                            yield event;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// Accumulates stream bytes and hands out complete SSE frames.
///
/// `\r\n` and lone `\r` line endings are rewritten to `\n` on the way in, including a
/// `\r\n` pair split across two network chunks.
#[derive(Debug, Default)]
struct SseBuffer {
    buf: Vec<u8>,
    after_cr: bool,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            match byte {
                b'\r' => self.buf.push(b'\n'),
                b'\n' if self.after_cr => {}
                other => self.buf.push(other),
            }
            self.after_cr = byte == b'\r';
        }
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let pos = find_double_newline(&self.buf)?;
        Some(self.buf.drain(..pos + 2).collect())
    }
}

/// Payload of an SSE `data:` line.
fn sse_data(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim)
}

/// Translate one streamed completion chunk.
fn parse_chunk(v: &serde_json::Value) -> Option<NormalizedEvent> {
    if let Some(err) = v.get("error") {
        return Some(NormalizedEvent::Error {
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("provider error")
                .to_string(),
            code: err
                .get("code")
                .and_then(|c| c.as_str())
                .map(ToString::to_string),
        });
    }

    v["choices"][0]["delta"]
        .get("content")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| NormalizedEvent::MessageDelta {
            text: s.to_string(),
        })
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
