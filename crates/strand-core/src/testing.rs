//! Test doubles for the apply port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::domain::{ApplyError, NamespaceKey, TaskError};
use crate::ports::ApplyEpisode;
use crate::queue::CompletionHandle;

/// Await every handle in order.
pub(crate) async fn await_all<T>(handles: Vec<CompletionHandle<T>>) -> Vec<Result<T, TaskError>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await);
    }
    results
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub key: String,
    pub payload: String,
    pub at: Instant,
}

/// Shared log of apply calls, in the order they started.
#[derive(Debug, Clone, Default)]
pub(crate) struct ApplyLog(Arc<Mutex<Vec<Entry>>>);

impl ApplyLog {
    fn push(&self, key: &NamespaceKey, payload: &str) {
        self.0.lock().unwrap().push(Entry {
            key: key.to_string(),
            payload: payload.to_string(),
            at: Instant::now(),
        });
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.0.lock().unwrap().clone()
    }
}

/// Records each call, sleeps, echoes the payload.
pub(crate) struct RecordingApply {
    latency: Duration,
    log: ApplyLog,
}

impl RecordingApply {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            log: ApplyLog::default(),
        }
    }

    pub fn log(&self) -> ApplyLog {
        self.log.clone()
    }
}

#[async_trait]
impl ApplyEpisode for RecordingApply {
    type Payload = String;
    type Output = String;

    async fn apply(&self, key: &NamespaceKey, payload: String) -> Result<String, ApplyError> {
        self.log.push(key, &payload);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(payload)
    }
}

/// Sleeps `delay` only for one key.
pub(crate) struct SlowApply {
    slow_key: String,
    delay: Duration,
}

impl SlowApply {
    pub fn new(slow_key: &str, delay: Duration) -> Self {
        Self {
            slow_key: slow_key.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl ApplyEpisode for SlowApply {
    type Payload = String;
    type Output = String;

    async fn apply(&self, key: &NamespaceKey, payload: String) -> Result<String, ApplyError> {
        if key.as_str() == self.slow_key {
            tokio::time::sleep(self.delay).await;
        }
        Ok(payload)
    }
}

/// Counts overlapping calls and remembers the peak.
pub(crate) struct ExclusiveApply {
    current: AtomicUsize,
    max: Arc<AtomicUsize>,
}

impl ExclusiveApply {
    pub fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrency(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max)
    }
}

#[async_trait]
impl ApplyEpisode for ExclusiveApply {
    type Payload = i32;
    type Output = i32;

    async fn apply(&self, _key: &NamespaceKey, payload: i32) -> Result<i32, ApplyError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(payload)
    }
}

enum FailMode {
    Random(f64),
    Matching(String),
    Panicking(String),
}

/// Fails (or panics) on selected payloads; logs every call.
pub(crate) struct FailingApply {
    mode: FailMode,
    latency: Duration,
    log: ApplyLog,
}

impl FailingApply {
    fn with_mode(mode: FailMode, latency: Duration) -> Self {
        Self {
            mode,
            latency,
            log: ApplyLog::default(),
        }
    }

    pub fn random(probability: f64, latency: Duration) -> Self {
        Self::with_mode(FailMode::Random(probability), latency)
    }

    pub fn matching(payload: &str, latency: Duration) -> Self {
        Self::with_mode(FailMode::Matching(payload.to_string()), latency)
    }

    pub fn panicking(payload: &str, latency: Duration) -> Self {
        Self::with_mode(FailMode::Panicking(payload.to_string()), latency)
    }

    pub fn log(&self) -> ApplyLog {
        self.log.clone()
    }
}

#[async_trait]
impl ApplyEpisode for FailingApply {
    type Payload = String;
    type Output = String;

    async fn apply(&self, key: &NamespaceKey, payload: String) -> Result<String, ApplyError> {
        self.log.push(key, &payload);
        let fail = match &self.mode {
            FailMode::Random(p) => rand::random::<f64>() < *p,
            FailMode::Matching(bad) => *bad == payload,
            FailMode::Panicking(bad) => {
                if *bad == payload {
                    panic!("apply blew up on {payload}");
                }
                false
            }
        };
        let jitter = match &self.mode {
            FailMode::Random(_) => self.latency.mul_f64(rand::random::<f64>()),
            _ => self.latency,
        };
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }
        if fail {
            return Err(ApplyError::new(format!("rejected: {payload}")));
        }
        Ok(payload)
    }
}

/// Blocks every call until a permit is added to the gate.
pub(crate) struct GatedApply {
    gate: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
}

impl GatedApply {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        Arc::clone(&self.gate)
    }

    pub fn started(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.started)
    }
}

#[async_trait]
impl ApplyEpisode for GatedApply {
    type Payload = i32;
    type Output = i32;

    async fn apply(&self, _key: &NamespaceKey, payload: i32) -> Result<i32, ApplyError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ApplyError::new("gate closed"))?;
        permit.forget();
        Ok(payload)
    }
}
