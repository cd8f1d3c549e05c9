//! Scripted in-memory provider for tests.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use sage_domain::error::{Error, Result};
use sage_domain::tool::ToolCall;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// A provider that replays a pre-loaded script of responses.
///
/// Each `chat` call pops the front of the script.  An exhausted script
/// is an error, so a test that under-provisions its script fails loudly
/// instead of looping.  Requests are logged for assertions.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<ChatResponse>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain-text assistant reply.
    pub fn push_text(&self, text: &str) {
        self.push_response(ChatResponse {
            content: text.to_string(),
            tool_calls: Vec::new(),
            usage: None,
            model: "mock".into(),
            finish_reason: Some("stop".into()),
        });
    }

    /// Queue a reply that invokes a single tool.
    pub fn push_tool_call(&self, tool_name: &str, arguments: Value) {
        self.push_response(ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                call_id: format!("call_{}", self.script.lock().len()),
                tool_name: tool_name.to_string(),
                arguments,
            }],
            usage: None,
            model: "mock".into(),
            finish_reason: Some("tool_calls".into()),
        });
    }

    /// Queue a fully custom response.
    pub fn push_response(&self, resp: ChatResponse) {
        self.script.lock().push_back(resp);
    }

    /// All requests received so far, oldest first.
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.calls.lock().push(req);
        self.script.lock().pop_front().ok_or_else(|| Error::Provider {
            provider: "mock".into(),
            message: "mock script exhausted".into(),
        })
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}
