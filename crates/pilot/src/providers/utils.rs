use anyhow::{anyhow, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::base::{ChunkStream, ProviderChunk, Usage};
use crate::errors::ToolError;
use crate::models::message::{Message, MessageContent, ToolRequest};
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut tool_calls = Vec::new();
        let mut output = Vec::new();

        let text = message.text();
        if !text.is_empty() {
            converted["content"] = json!(text);
        }

        for content in &message.content {
            match content {
                MessageContent::Text(_) => {}
                MessageContent::ToolRequest(request) => {
                    // A call the model garbled still has to appear in history, its
                    // response carries the parse error
                    let (name, arguments) = match &request.tool_call {
                        Ok(tool_call) => (
                            sanitize_function_name(&tool_call.name),
                            tool_call.arguments.to_string(),
                        ),
                        Err(_) => ("invalid_tool_call".to_string(), "{}".to_string()),
                    };
                    tool_calls.push(json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": arguments,
                        }
                    }));
                }
                MessageContent::ToolResponse(response) => {
                    let content = match &response.tool_result {
                        Ok(result) => result.clone(),
                        // A tool result error is shown as output so the model can interpret the error message
                        Err(e) => format!("The tool call returned the following error:\n{}", e),
                    };
                    output.push(json!({
                        "role": "tool",
                        "content": content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if !tool_calls.is_empty() {
            converted["tool_calls"] = json!(tool_calls);
        }
        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

/// Build a streaming chat completion request body
pub fn create_request_payload(
    model: &str,
    system: &str,
    messages: &[Message],
    tools: &[Tool],
    temperature: Option<f32>,
    max_tokens: Option<i32>,
) -> Result<Value> {
    let mut messages_array = vec![json!({
        "role": "system",
        "content": system
    })];
    messages_array.extend(messages_to_openai_spec(messages));

    let mut payload = json!({
        "model": model,
        "messages": messages_array,
        "stream": true,
        "stream_options": { "include_usage": true },
    });

    let tools_spec = tools_to_openai_spec(tools)?;
    if !tools_spec.is_empty() {
        payload["tools"] = json!(tools_spec);
    }
    if let Some(temp) = temperature {
        payload["temperature"] = json!(temp);
    }
    if let Some(tokens) = max_tokens {
        payload["max_tokens"] = json!(tokens);
    }
    Ok(payload)
}

/// Turn a `text/event-stream` chat completion response into provider chunks
pub fn response_to_chunk_stream(response: reqwest::Response) -> ChunkStream {
    Box::pin(decode_chunks(response))
}

fn decode_chunks(response: reqwest::Response) -> impl Stream<Item = Result<ProviderChunk>> {
    try_stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut accumulator = StreamAccumulator::default();
        let mut think = ThinkFilter::default();

        'read: while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for event in decoder.push(&bytes) {
                if event == "[DONE]" {
                    break 'read;
                }
                let value = parse_stream_event(&event)?;
                for chunk in accumulator.push(&value) {
                    match chunk {
                        ProviderChunk::Text(text) => {
                            let visible = think.push(&text);
                            if !visible.is_empty() {
                                yield ProviderChunk::Text(visible);
                            }
                        }
                        other => yield other,
                    }
                }
            }
        }

        let rest = think.finish();
        if !rest.is_empty() {
            yield ProviderChunk::Text(rest);
        }
        for chunk in accumulator.finish() {
            yield chunk;
        }
    }
}

fn parse_stream_event(event: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(event)
        .map_err(|e| anyhow!("Malformed stream chunk ({}): {}", e, event))?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(anyhow!("Model returned an error: {}", message));
    }
    Ok(value)
}

pub fn parse_usage(usage: &Value) -> Usage {
    let input_tokens = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let output_tokens = usage
        .get("completion_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32);

    let total_tokens = usage
        .get("total_tokens")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// Splits a server-sent-events byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                if !data.is_empty() {
                    events.push(data.to_string());
                }
            }
        }
        events
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles streamed `choices[0].delta` objects. Text is passed through as it
/// arrives, tool call fragments are stitched together by index and released by
/// [`StreamAccumulator::finish`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    tool_calls: BTreeMap<u64, PartialToolCall>,
}

impl StreamAccumulator {
    pub fn push(&mut self, value: &Value) -> Vec<ProviderChunk> {
        let mut chunks = Vec::new();

        if let Some(usage) = value.get("usage").filter(|u| u.is_object()) {
            chunks.push(ProviderChunk::Usage(parse_usage(usage)));
        }

        let delta = &value["choices"][0]["delta"];
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                chunks.push(ProviderChunk::Text(text.to_string()));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (position, call) in calls.iter().enumerate() {
                let index = call
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(position as u64);
                let partial = self.tool_calls.entry(index).or_default();
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    if partial.id.is_empty() {
                        partial.id = id.to_string();
                    }
                }
                if let Some(name) = call["function"].get("name").and_then(Value::as_str) {
                    partial.name.push_str(name);
                }
                if let Some(arguments) = call["function"].get("arguments") {
                    match arguments {
                        Value::String(fragment) => partial.arguments.push_str(fragment),
                        // some servers send the arguments already decoded
                        Value::Object(_) => partial.arguments = arguments.to_string(),
                        _ => {}
                    }
                }
            }
        }

        chunks
    }

    pub fn finish(self) -> Vec<ProviderChunk> {
        self.tool_calls
            .into_iter()
            .map(|(index, partial)| {
                let id = if partial.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    partial.id
                };
                let tool_call = parse_arguments(&partial.arguments)
                    .map(|arguments| ToolCall::new(partial.name, arguments));
                ProviderChunk::ToolRequest(ToolRequest { id, tool_call })
            })
            .collect()
    }
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::MalformedArguments(format!("{} in {}", e, raw)))
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Removes `<think>...</think>` spans that reasoning models put in front of their
/// answer, including tags split across chunk boundaries.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    pending: String,
    in_think: bool,
    trim_leading: bool,
}

impl ThinkFilter {
    pub fn push(&mut self, text: &str) -> String {
        self.pending.push_str(text);
        let mut out = String::new();
        loop {
            if self.in_think {
                if let Some(end) = self.pending.find(THINK_CLOSE) {
                    self.pending.drain(..end + THINK_CLOSE.len());
                    self.in_think = false;
                    self.trim_leading = true;
                    continue;
                }
                let keep = partial_suffix_len(&self.pending, THINK_CLOSE);
                let cut = self.pending.len() - keep;
                self.pending.drain(..cut);
                break;
            }

            if let Some(start) = self.pending.find(THINK_OPEN) {
                let before: String = self.pending.drain(..start).collect();
                self.emit(&mut out, &before);
                self.pending.drain(..THINK_OPEN.len());
                self.in_think = true;
                continue;
            }
            let keep = partial_suffix_len(&self.pending, THINK_OPEN);
            let cut = self.pending.len() - keep;
            let visible: String = self.pending.drain(..cut).collect();
            self.emit(&mut out, &visible);
            break;
        }
        out
    }

    /// Release whatever was held back waiting for a possible tag.
    pub fn finish(&mut self) -> String {
        if self.in_think {
            self.pending.clear();
            return String::new();
        }
        let rest = std::mem::take(&mut self.pending);
        let mut out = String::new();
        self.emit(&mut out, &rest);
        out
    }

    fn emit(&mut self, out: &mut String, text: &str) {
        let text = if self.trim_leading {
            text.trim_start()
        } else {
            text
        };
        if !text.is_empty() {
            self.trim_leading = false;
            out.push_str(text);
        }
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with.
fn partial_suffix_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&len| text.ends_with(&tag[..len]))
        .unwrap_or(0)
}
