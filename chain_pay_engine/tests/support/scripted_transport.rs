use std::sync::{Arc, Mutex};

use chain_pay_engine::rpc::{RpcResponse, RpcTransport, TransportError};

type Script = dyn Fn(&str, Option<&str>) -> Result<RpcResponse, TransportError> + Send + Sync;

/// A transport whose responses are produced by a closure. Every request is recorded as `(url, body)`.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Script>,
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> Self
    where F: Fn(&str, Option<&str>) -> Result<RpcResponse, TransportError> + Send + Sync + 'static {
        Self { script: Arc::new(script), requests: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|(url, _)| url.starts_with(prefix)).count()
    }

    fn respond(&self, url: &str, body: Option<&str>) -> Result<RpcResponse, TransportError> {
        self.requests.lock().unwrap().push((url.to_string(), body.map(String::from)));
        (self.script)(url, body)
    }
}

impl RpcTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<RpcResponse, TransportError> {
        self.respond(url, None)
    }

    async fn post_json(&self, url: &str, body: String) -> Result<RpcResponse, TransportError> {
        self.respond(url, Some(&body))
    }
}
