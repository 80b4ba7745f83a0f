//! The framework adapter surface (spec §4.6): five required functions
//! plus a handful of optional ones, the crate's equivalent of the
//! teacher's `SessionAdapter`/`AgentAdapter` traits — same shape,
//! different domain.

use std::collections::HashMap;

/// What the comm handler needs from a framework binding, independent of
/// any specific HTTP framework. `durable-comm` never binds a socket
/// itself (spec SPEC_FULL §2) — a host (e.g. the reference `cli` binary,
/// or a real framework adapter) implements this trait over whatever
/// request/response types it already has.
pub trait HostAdapter: Send + Sync {
    fn body(&self) -> &[u8];
    fn header(&self, key: &str) -> Option<&str>;
    fn method(&self) -> &str;
    fn url(&self) -> &str;
    fn query_param(&self, key: &str) -> Option<&str>;
    fn is_production(&self) -> bool;
    fn env(&self) -> HashMap<String, String>;
}

/// The response a [`HostAdapter`] must translate back into its native
/// response type (`transformResponse` in spec §4.6).
#[derive(Debug, Clone)]
pub struct HostResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HostResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&body).unwrap_or_default(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
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
