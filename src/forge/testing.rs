//! Scripted Forge backend for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::forge::errors::{ForgeError, ForgeResult};
use crate::forge::{ForgeBackend, HttpMethod};

pub type RecordedCall = (HttpMethod, String, Option<Value>);

/// Answers requests from a script keyed by method and path.
///
/// Several responses for the same key are served in order; the last one
/// repeats. Unscripted requests fail with a 404.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<HashMap<(HttpMethod, String), VecDeque<ForgeResult<Value>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(self: Arc<Self>, method: HttpMethod, path: &str, response: Value) -> Arc<Self> {
        self.push(method, path, Ok(response));
        self
    }

    pub fn fail(self: Arc<Self>, method: HttpMethod, path: &str, error: ForgeError) -> Arc<Self> {
        self.push(method, path, Err(error));
        self
    }

    /// Hold every request for `delay` so concurrency can be observed
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    fn push(&self, method: HttpMethod, path: &str, response: ForgeResult<Value>) {
        self.responses
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: HttpMethod, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p, _)| *m == method && p == path)
            .count()
    }

    /// Whether any write (POST/PUT/DELETE) was issued
    pub fn wrote(&self) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|(m, _, _)| *m != HttpMethod::Get)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, method: HttpMethod, path: &str) -> ForgeResult<Value> {
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Err(ForgeError::Api {
                status: 404,
                message: format!("no scripted response for {} {}", method, path),
            }),
        }
    }
}

#[async_trait]
impl ForgeBackend for ScriptedBackend {
    async fn send(&self, method: HttpMethod, path: &str, body: Option<Value>) -> ForgeResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method, path.to_string(), body));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.next_response(method, path);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}
