use serde_json::Value;

use crate::events::{ToolPhase, TransportEvent};

/// Incremental decoder for newline-delimited JSON records.
///
/// Accepts bare JSON lines as well as SSE-style `data:` lines. Bytes are
/// buffered until a full line arrives, so multi-byte characters split across
/// chunks decode correctly.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl RecordDecoder {
    /// Feed arbitrary bytes and drain every complete record.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<TransportEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            self.decode_line(&line, &mut events);
        }

        events
    }

    /// Decode whatever is left in the buffer as a final record.
    pub fn finish(&mut self) -> Vec<TransportEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        self.decode_line(&rest, &mut events);
        events
    }

    /// Parse a complete payload in one shot.
    pub fn parse_all(input: &str) -> Vec<TransportEvent> {
        let mut decoder = Self::default();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }

    /// Number of records dropped as malformed or unknown so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(|byte| byte.is_ascii_whitespace())
    }

    fn decode_line(&mut self, line: &[u8], events: &mut Vec<TransportEvent>) {
        let text = String::from_utf8_lossy(line);
        let Some(payload) = extract_payload(&text) else {
            return;
        };

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => match map_event(&value) {
                Some(event) => events.push(event),
                None => {
                    self.skipped += 1;
                    tracing::debug!(record = payload, "skipping unknown transport record");
                }
            },
            Err(error) => {
                self.skipped += 1;
                tracing::debug!(%error, "skipping malformed transport record");
            }
        }
    }
}

fn extract_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if line.starts_with("event:") || line.starts_with("id:") || line.starts_with("retry:") {
        return None;
    }

    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload)
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn map_event(value: &Value) -> Option<TransportEvent> {
    let event_type = str_field(value, "type")?;

    match event_type {
        "reasoning" => Some(TransportEvent::Reasoning {
            delta: str_field(value, "delta")?.to_owned(),
        }),
        "delta" => Some(TransportEvent::Delta {
            role: str_field(value, "role").unwrap_or("assistant").to_owned(),
            delta: str_field(value, "delta")?.to_owned(),
        }),
        "tool_status" => {
            let status = str_field(value, "status").and_then(ToolPhase::parse)?;
            let tool_call_id = str_field(value, "tool_call_id")?.to_owned();
            // Arguments arrive either as raw text or as an already-parsed object.
            let arguments = value.get("arguments").and_then(|arguments| match arguments {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            });
            Some(TransportEvent::ToolStatus {
                status,
                tool_call_id,
                function: str_field(value, "function").map(ToString::to_string),
                arguments,
                result: value.get("result").filter(|result| !result.is_null()).cloned(),
                result_type: str_field(value, "result_type").map(ToString::to_string),
            })
        }
        "completed" => Some(TransportEvent::Completed {}),
        "error" => {
            let error = match value.get("error") {
                Some(Value::String(message)) => message.clone(),
                Some(Value::Object(object)) => object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_owned(),
                _ => "unknown error".to_owned(),
            };
            Some(TransportEvent::Error { error })
        }
        _ => None,
    }
}
