use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::external::*;

#[derive(Default)]
pub struct TestStorage {
    values: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl TestStorage {
    pub fn insert(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_owned(), value.to_owned());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::Acquire) {
            anyhow::bail!("storage is unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for TestStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.values.lock().remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub enum Reply {
    Json(u16, Value),
    Bytes(u16, Vec<u8>),
    Unreachable,
}

type Handler = dyn Fn(&HttpRequest) -> Reply + Send + Sync;

/// Connection which answers with a handler and records every request.
///
/// Yields to the scheduler before answering so that concurrently issued
/// requests are really in flight at the same time.
pub struct ScriptedConnection {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedConnection {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Default::default(),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

#[async_trait]
impl HttpConnection for ScriptedConnection {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request.clone());
        tokio::task::yield_now().await;

        match (self.handler)(&request) {
            Reply::Json(status, value) => Ok(HttpResponse {
                status,
                headers: vec![(
                    "Content-Type".to_owned(),
                    "application/json".to_owned(),
                )],
                body: serde_json::to_vec(&value)?,
            }),
            Reply::Bytes(status, body) => Ok(HttpResponse {
                status,
                headers: vec![(
                    "Content-Type".to_owned(),
                    "application/octet-stream".to_owned(),
                )],
                body,
            }),
            Reply::Unreachable => anyhow::bail!("connection refused"),
        }
    }
}

pub fn bearer(request: &HttpRequest) -> Option<&str> {
    request
        .header("authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
}
