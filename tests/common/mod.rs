//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use framectl::control::{ParameterController, ReadinessSource};
use framectl::{ControlError, ControlResult};
use serde_json::{json, Value};

/// Records every call; answers reads from a fixed table and fails writes to
/// the listed paths
#[derive(Default)]
pub struct RecordingController {
    name: String,
    reads: HashMap<String, Value>,
    reject_writes: Vec<String>,
    pub gets: Mutex<Vec<String>>,
    pub puts: Mutex<Vec<(String, Value)>>,
}

impl RecordingController {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_read(mut self, path: &str, value: Value) -> Self {
        self.reads.insert(path.to_string(), value);
        self
    }

    pub fn with_count(self, count: usize) -> Self {
        self.with_read("count", json!({ "count": count }))
    }

    pub fn rejecting(mut self, path: &str) -> Self {
        self.reject_writes.push(path.to_string());
        self
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub fn put_calls(&self) -> Vec<(String, Value)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put_paths(&self) -> Vec<String> {
        self.put_calls().into_iter().map(|(path, _)| path).collect()
    }
}

#[async_trait]
impl ParameterController for RecordingController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, path: &str, _with_metadata: bool) -> ControlResult<Value> {
        self.gets.lock().unwrap().push(path.to_string());
        self.reads
            .get(path)
            .cloned()
            .ok_or_else(|| ControlError::PathNotFound(path.to_string()))
    }

    async fn put(&self, path: &str, value: Value) -> ControlResult<()> {
        self.puts.lock().unwrap().push((path.to_string(), value));
        if self.reject_writes.iter().any(|p| p == path) {
            return Err(ControlError::invalid_value(path, format!("{} refused", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReadinessSource for RecordingController {
    async fn first_update(&self) -> ControlResult<bool> {
        Ok(true)
    }
}

/// Fails every call with a fixed error
pub struct FailingController {
    name: String,
    error: ControlError,
    pub calls: AtomicUsize,
}

impl FailingController {
    pub fn new(name: &str, error: ControlError) -> Self {
        Self {
            name: name.to_string(),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(name: &str) -> Self {
        Self::new(name, ControlError::PeerUnavailable(format!("{name} is down")))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterController for FailingController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _path: &str, _with_metadata: bool) -> ControlResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn put(&self, _path: &str, _value: Value) -> ControlResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Peer whose readiness latch is flipped by the test
pub struct FlagPeer {
    pub inner: RecordingController,
    ready: AtomicBool,
    pub readiness_polls: AtomicUsize,
}

impl FlagPeer {
    pub fn new(inner: RecordingController) -> Self {
        Self {
            inner,
            ready: AtomicBool::new(false),
            readiness_polls: AtomicUsize::new(0),
        }
    }

    pub fn ready(self) -> Self {
        self.set_ready();
        self
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn polls(&self) -> usize {
        self.readiness_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParameterController for FlagPeer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, path: &str, with_metadata: bool) -> ControlResult<Value> {
        self.inner.get(path, with_metadata).await
    }

    async fn put(&self, path: &str, value: Value) -> ControlResult<()> {
        self.inner.put(path, value).await
    }
}

#[async_trait]
impl ReadinessSource for FlagPeer {
    async fn first_update(&self) -> ControlResult<bool> {
        self.readiness_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ready.load(Ordering::SeqCst))
    }
}

/// Wraps a [`RecordingController`] and stalls readiness polls and writes
pub struct SlowPeer {
    pub inner: RecordingController,
    readiness_delay: Duration,
    write_delay: Duration,
}

impl SlowPeer {
    pub fn new(inner: RecordingController) -> Self {
        Self {
            inner,
            readiness_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
        }
    }

    pub fn with_readiness_delay(mut self, delay: Duration) -> Self {
        self.readiness_delay = delay;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

#[async_trait]
impl ParameterController for SlowPeer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, path: &str, with_metadata: bool) -> ControlResult<Value> {
        self.inner.get(path, with_metadata).await
    }

    async fn put(&self, path: &str, value: Value) -> ControlResult<()> {
        tokio::time::sleep(self.write_delay).await;
        self.inner.put(path, value).await
    }
}

#[async_trait]
impl ReadinessSource for SlowPeer {
    async fn first_update(&self) -> ControlResult<bool> {
        tokio::time::sleep(self.readiness_delay).await;
        Ok(true)
    }
}

/// The `<r>/config` paths for ranks `0..n`
pub fn config_paths(n: usize) -> Vec<String> {
    (0..n).map(|r| format!("{r}/config")).collect()
}
