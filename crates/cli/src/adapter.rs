//! [`durable_comm::HostAdapter`] implementation over a parsed HTTP
//! request (spec §4.6) — the reference binary's equivalent of a real
//! framework's request wrapper.

use std::collections::HashMap;

use durable_comm::HostAdapter;

use crate::http::ParsedRequest;

pub struct RawAdapter {
    request: ParsedRequest,
    url: String,
    env: HashMap<String, String>,
    production: bool,
}

impl RawAdapter {
    pub fn new(request: ParsedRequest, serve_url: &str, production: bool) -> Self {
        let url = format!("{serve_url}{}", request.path);
        Self {
            request,
            url,
            env: std::env::vars().collect(),
            production,
        }
    }
}

impl HostAdapter for RawAdapter {
    fn body(&self) -> &[u8] {
        &self.request.body
    }

    fn header(&self, key: &str) -> Option<&str> {
        self.request.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    fn method(&self) -> &str {
        &self.request.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn query_param(&self, key: &str) -> Option<&str> {
        self.request.query.get(key).map(String::as_str)
    }

    fn is_production(&self) -> bool {
        self.production
    }

    fn env(&self) -> HashMap<String, String> {
        self.env.clone()
    }
}
