//! Scripted AI backend.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pharmakg_llm::{LlmBackend, LlmError, LlmRequest, LlmResponse};
use tokio::time::Instant;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(String),
    /// Never answers (until the caller's timeout fires).
    Hang,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub prompt: String,
    pub at: Instant,
}

type Responder = Box<dyn Fn(&LlmRequest) -> Scripted + Send + Sync>;

/// Backend that replays queued answers and records every request.
///
/// Queued entries are consumed first; once the queue is empty the
/// responder (if any) decides, otherwise the call fails as unavailable.
pub struct ScriptedBackend {
    model: String,
    queue: Mutex<VecDeque<Scripted>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(model: &str, script: impl IntoIterator<Item = Scripted>) -> Self {
        let backend = Self::new(model);
        backend.queue.lock().unwrap().extend(script);
        backend
    }

    pub fn with_responder(
        model: &str,
        responder: impl Fn(&LlmRequest) -> Scripted + Send + Sync + 'static,
    ) -> Self {
        let mut backend = Self::new(model);
        backend.responder = Some(Box::new(responder));
        backend
    }

    pub fn push(&self, entry: Scripted) {
        self.queue.lock().unwrap().push_back(entry);
    }

    pub fn push_reply(&self, content: impl Into<String>) {
        self.push(Scripted::Reply(content.into()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let system = req
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(RecordedCall {
            system,
            prompt: req.user_text(),
            at: Instant::now(),
        });

        let next = self.queue.lock().unwrap().pop_front();
        let entry = match (next, &self.responder) {
            (Some(entry), _) => entry,
            (None, Some(responder)) => responder(&req),
            (None, None) => Scripted::Fail("script exhausted".to_string()),
        };

        match entry {
            Scripted::Reply(content) => Ok(LlmResponse {
                prompt_tokens: req.user_text().len() as u32 / 4,
                completion_tokens: content.len() as u32 / 4,
                content,
                model: self.model.clone(),
            }),
            Scripted::Fail(msg) => Err(LlmError::Unavailable(msg)),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(LlmError::Unavailable("hung call returned".to_string()))
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }

    fn is_local(&self) -> bool {
        true
    }
}
