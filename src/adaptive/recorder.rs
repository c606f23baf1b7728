//! Per-node outcome windows feeding the metric store

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{MetricStore, NodeMetric};
use crate::node::Node;
use crate::route::Invoker;
use crate::{Error, Result};

/// Outcomes kept per node
pub const WINDOW: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Sample {
    failed: bool,
    latency_ms: u64,
}

#[derive(Debug, Default)]
struct NodeWindow {
    active: AtomicU64,
    samples: Mutex<VecDeque<Sample>>,
}

impl NodeWindow {
    fn push(&self, sample: Sample) {
        let mut samples = self.samples.lock();
        if samples.len() == WINDOW {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    fn snapshot(&self) -> NodeMetric {
        let samples = self.samples.lock();
        let mut latencies: Vec<u64> = samples.iter().map(|s| s.latency_ms).collect();
        latencies.sort_unstable();
        let tp90_ms = if latencies.is_empty() {
            0
        } else {
            let rank = (latencies.len() * 9).div_ceil(10);
            latencies[rank.saturating_sub(1)]
        };
        NodeMetric {
            requests: samples.len() as u64,
            failures: samples.iter().filter(|s| s.failed).count() as u64,
            tp90_ms,
            concurrency: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Counts one call in flight until dropped
struct InFlight(Arc<NodeWindow>);

impl InFlight {
    fn enter(window: Arc<NodeWindow>) -> Self {
        window.active.fetch_add(1, Ordering::Relaxed);
        Self(window)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Sliding outcome windows for every node called
///
/// Only transport-level failures count against a node; a business error is a
/// healthy reply.
#[derive(Debug, Default)]
pub struct MetricRecorder {
    windows: DashMap<String, Arc<NodeWindow>>,
}

impl MetricRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self, address: &str) -> Arc<NodeWindow> {
        if let Some(window) = self.windows.get(address) {
            return Arc::clone(window.value());
        }
        Arc::clone(self.windows.entry(address.to_string()).or_default().value())
    }

    /// Current metric for `address`
    #[must_use]
    pub fn snapshot(&self, address: &str) -> Option<NodeMetric> {
        self.windows.get(address).map(|w| w.snapshot())
    }

    /// Copy every window into `store`
    pub fn publish(&self, store: &MetricStore) {
        for entry in &self.windows {
            store.update(entry.key(), entry.value().snapshot());
        }
    }

    /// Drop the window of `address`
    pub fn forget(&self, address: &str) {
        self.windows.remove(address);
    }

    /// Keep only the windows whose address passes `keep`
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.windows.retain(|address, _| keep(address));
    }

    /// Number of nodes with a window
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// No window recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Invoker decorator recording every call into a [`MetricRecorder`]
pub struct RecordingInvoker<Req, Resp> {
    inner: Arc<dyn Invoker<Req, Resp>>,
    recorder: Arc<MetricRecorder>,
}

impl<Req, Resp> RecordingInvoker<Req, Resp> {
    /// Wrap `inner`
    #[must_use]
    pub fn new(inner: Arc<dyn Invoker<Req, Resp>>, recorder: Arc<MetricRecorder>) -> Self {
        Self { inner, recorder }
    }
}

#[async_trait]
impl<Req, Resp> Invoker<Req, Resp> for RecordingInvoker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn invoke(&self, node: Arc<Node>, request: Req) -> Result<Resp> {
        let in_flight = InFlight::enter(self.recorder.window(node.address()));
        let started = Instant::now();
        let outcome = self.inner.invoke(node, request).await;
        let window = Arc::clone(&in_flight.0);
        drop(in_flight);
        window.push(Sample {
            failed: matches!(outcome, Err(ref e) if !matches!(e, Error::Business { .. })),
            latency_ms: started.elapsed().as_millis() as u64,
        });
        outcome
    }
}
