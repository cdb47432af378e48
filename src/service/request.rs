//! HTTP-framework-agnostic polling request and response types.
//!
//! Embedders translate their framework's request into an [`EngineRequest`],
//! pass it to [`Server::handle_request`](crate::service::Server::handle_request),
//! and write the returned [`EngineResponse`] back verbatim.

use crate::error::ProtocolError;
use bytes::Bytes;
use serde_json::json;

/// Content type of every polling body
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Content type of rejection bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP verb of a polling request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        if method.eq_ignore_ascii_case("GET") {
            Method::Get
        } else if method.eq_ignore_ascii_case("POST") {
            Method::Post
        } else {
            Method::Other(method.to_ascii_uppercase())
        }
    }
}

/// One polling request as seen by the engine
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub method: Method,
    /// Raw query string without the leading `?`
    pub query: String,
    pub body: Bytes,
}

impl EngineRequest {
    pub fn new(method: &str, query: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::parse(method),
            query: query.into(),
            body: body.into(),
        }
    }

    pub fn get(query: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            query: query.into(),
            body: Bytes::new(),
        }
    }

    pub fn post(query: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Post,
            query: query.into(),
            body: body.into(),
        }
    }
}

/// Response to write back for one polling request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl EngineResponse {
    /// 200 carrying an encoded packet batch
    pub fn ok(body: String) -> Self {
        Self {
            status: 200,
            content_type: TEXT_CONTENT_TYPE,
            body: Bytes::from(body),
        }
    }

    /// 200 with an empty body, the reply to an accepted POST
    pub fn empty() -> Self {
        Self::ok(String::new())
    }

    /// Rejection with the status mapped from `error`.
    ///
    /// The body is `{"code":<n>,"message":"<reason>"}`.
    pub fn error(error: &ProtocolError) -> Self {
        let code = match error {
            ProtocolError::UnknownSession => 1,
            ProtocolError::InvalidRequest(_) => 3,
            ProtocolError::OversizedPacket(_) => 5,
            _ => 4,
        };
        let body = json!({ "code": code, "message": error.to_string() });
        Self {
            status: error.status_code(),
            content_type: JSON_CONTENT_TYPE,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, when it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
