//! HTTP transport abstraction.
//!
//! Every collector request goes through [`HttpTransport`] so the protocol
//! state machine can run against a scripted transport in tests.

use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// A JSON POST to the collector.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn post_json<B: Serialize>(url: String, body: &B) -> Result<Self> {
        Ok(Self {
            url,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(body)?,
        })
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Blocking HTTP transport.
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// exchange a response at all are errors.
pub trait HttpTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport on a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut req = self.agent.post(&request.url);
        for (key, value) in &request.headers {
            req = req.set(key, value);
        }

        let response = match req.send_bytes(&request.body) {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(e)) => {
                return Err(Error::Transport(format!("POST {} failed: {}", request.url, e)))
            }
        };

        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| Error::Transport(format!("reading response from {}: {}", request.url, e)))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::post_json("http://x/report".to_string(), &json!({"a": 1}))
            .unwrap()
            .header("Authorization", "Bearer t");
        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.header_value("authorization"), Some("Bearer t"));
        assert_eq!(req.body, br#"{"a":1}"#);
    }

    #[test]
    fn test_response_helpers() {
        let resp = HttpResponse::new(409, r#"{"error":"conflict"}"#);
        assert_eq!(resp.text(), r#"{"error":"conflict"}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["error"], "conflict");
    }

    #[test]
    fn test_ureq_transport_returns_error_statuses() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/register")
            .match_header("content-type", "application/json")
            .with_status(409)
            .with_body("already registered")
            .create();

        let transport = UreqTransport::new(Duration::from_secs(5));
        let req = HttpRequest::post_json(format!("{}/register", server.url()), &json!({}))
            .unwrap();
        let resp = transport.send(req).unwrap();

        assert_eq!(resp.status, 409);
        assert_eq!(resp.text(), "already registered");
        mock.assert();
    }

    #[test]
    fn test_ureq_transport_connection_failure() {
        let transport = UreqTransport::new(Duration::from_secs(1));
        let req = HttpRequest::post_json("http://127.0.0.1:1/register".to_string(), &json!({}))
            .unwrap();
        assert!(matches!(transport.send(req), Err(Error::Transport(_))));
    }
}
