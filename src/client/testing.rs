//! Scripted collector for protocol tests.

use std::collections::VecDeque;
use std::path::Path;

use parking_lot::Mutex;
use serde_json::json;

use crate::config::{Config, DataStoreConfig};
use crate::error::{Error, Result};

use super::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Replays canned responses in order and records every request.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Path of every request sent, e.g. `/register`.
    pub(crate) fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| format!("/{}", r.url.rsplit('/').next().unwrap_or_default()))
            .collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Transport("no scripted response left".to_string()))
    }
}

pub(crate) fn test_config(state_dir: &Path) -> Config {
    let mut config = Config::new("http://collector.test");
    config.state_dir = Some(state_dir.to_path_buf());
    config.staging = DataStoreConfig::sqlite_in_memory();
    config.submission.retry_delay_secs = 0;
    config
}

pub(crate) fn credentials_response(registration_id: i64, token: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        json!({
            "registrationId": registration_id,
            "authToken": token,
            "registrationDate": "2024-01-01T00:00:00Z"
        })
        .to_string(),
    )
}

pub(crate) fn report_response(processing_id: i64) -> HttpResponse {
    HttpResponse::new(
        200,
        json!({"processingId": processing_id, "processedAt": "2024-01-01T00:00:01Z"}).to_string(),
    )
}
