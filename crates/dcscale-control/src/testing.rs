//! Scripted control plane client for tests.
//!
//! `RecordingClient` answers requests from per-endpoint reply queues and
//! records every request it sees, so tests can assert on call order and
//! request bodies without a network.

use std::collections::VecDeque;

use async_trait::async_trait;
use dcscale_auth::SessionToken;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;

use crate::client::{ApiRequest, ControlPlaneClient};
use crate::error::{ControlError, Result};

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 2xx with a JSON body.
    Json(Value),
    /// 2xx with an empty body.
    Empty,
    /// Non-2xx status with a body.
    Status(u16, String),
    /// The request never reached the control plane.
    Transport(String),
}

struct Rule {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// A control plane client that replays scripted replies.
///
/// Each endpoint has a queue of replies; the last reply in a queue repeats
/// forever. Endpoints without a script answer with an empty 2xx.
#[derive(Default)]
pub struct RecordingClient {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl RecordingClient {
    /// Create a client with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method` on `path` (query string excluded).
    pub fn reply(&self, method: Method, path: impl Into<String>, reply: Reply) {
        let path = path.into();
        let mut rules = self.rules.lock();
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            rule.replies.push_back(reply);
        } else {
            rules.push(Rule {
                method,
                path,
                replies: VecDeque::from([reply]),
            });
        }
    }

    /// Every request seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    /// Every request seen so far as `"METHOD path"`, in order.
    #[must_use]
    pub fn call_log(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|c| format!("{} {}", c.method, c.path))
            .collect()
    }

    fn next_reply(&self, method: &Method, path: &str) -> Reply {
        let mut rules = self.rules.lock();
        let Some(rule) = rules
            .iter_mut()
            .find(|r| r.method == *method && r.path == path)
        else {
            return Reply::Empty;
        };
        if rule.replies.len() > 1 {
            rule.replies.pop_front().unwrap_or(Reply::Empty)
        } else {
            rule.replies.front().cloned().unwrap_or(Reply::Empty)
        }
    }
}

#[async_trait]
impl ControlPlaneClient for RecordingClient {
    async fn send(&self, _token: &SessionToken, request: ApiRequest) -> Result<Option<Value>> {
        let reply = self.next_reply(&request.method, &request.path);
        self.calls.lock().push(request);

        match reply {
            Reply::Json(value) => Ok(Some(value)),
            Reply::Empty => Ok(None),
            Reply::Status(status, body) => Err(ControlError::Api { status, body }),
            Reply::Transport(message) => Err(ControlError::Transport(message)),
        }
    }
}
