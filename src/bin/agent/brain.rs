use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use uxpilot::{AgentConfig, FragmentReceiver, GenerationParams, ModelError, ModelService, Transcript};

/// OpenAI-compatible chat completions client that streams its answer.
pub struct Brain {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl Brain {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            endpoint: format!("{}/chat/completions", config.api_base),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl ModelService for Brain {
    async fn stream(
        &self,
        transcript: &Transcript,
        params: &GenerationParams,
    ) -> Result<FragmentReceiver, ModelError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": transcript.messages(),
                "temperature": params.temperature,
                "max_tokens": params.max_tokens,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let json_resp: serde_json::Value = response.json().await.unwrap_or_default();
            let message = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            tracing::error!(status = status.as_u16(), %message, "model API error");
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump(response, tx));
        Ok(rx)
    }
}

/// Forward content deltas from the SSE body until `[DONE]` or the receiver
/// goes away.
async fn pump(response: reqwest::Response, tx: mpsc::Sender<Result<String, ModelError>>) {
    let stream = response.bytes_stream();
    tokio::pin!(stream);
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = stream.next().await {
        let events = match chunk {
            Ok(bytes) => decoder.feed(&bytes),
            Err(e) => Err(ModelError::Request(format!("stream error: {e}"))),
        };
        let events = match events {
            Ok(events) => events,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        for event in events {
            match event {
                SseEvent::Delta(text) => {
                    if tx.send(Ok(text)).await.is_err() {
                        return;
                    }
                }
                SseEvent::Done => return,
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Splits an SSE byte stream into lines, tolerating chunk boundaries that
/// fall mid-line or mid-character.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, ModelError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_sse_line(line.trim_end())? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, ModelError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| ModelError::Stream(format!("{e}: {data}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(SseEvent::Delta))
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let first = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"cli")
            .unwrap();
        assert!(first.is_empty());

        let rest = decoder
            .feed(b"ck\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"(id=1)\"}}]}\n\ndata: [DONE]\n\n")
            .unwrap();
        assert_eq!(
            rest,
            vec![
                SseEvent::Delta("click".to_string()),
                SseEvent::Delta("(id=1)".to_string()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_decoder_skips_role_only_and_comment_lines() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .feed(b": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_decoder_handles_multibyte_split() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&line[..split]).unwrap().is_empty());
        assert_eq!(
            decoder.feed(&line[split..]).unwrap(),
            vec![SseEvent::Delta("héllo".to_string())]
        );
    }

    #[test]
    fn test_malformed_data_is_a_stream_error() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert!(matches!(err, ModelError::Stream(_)));
    }

    #[test]
    fn test_endpoint_uses_configured_base() {
        let mut config = AgentConfig::new("sk-test");
        config.api_base = "http://localhost:8080/v1".to_string();
        config.model = "local".to_string();
        let brain = Brain::new(&config);
        assert_eq!(brain.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(brain.model, "local");
    }
}
