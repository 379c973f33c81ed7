//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use tracking_core::database::{DataSource, DatabaseError, DatabaseResult};
use tracking_core::messaging::{
    BrokerProvider, BrokerTopology, EventProcessor, InMemoryBroker, MessagingResult,
    ProcessingError, RetryEnvelope, RetryInfo, TerminalSink, TrackingEventRequest,
};

/// Data source whose liveness and query behavior tests switch at will
#[derive(Debug, Clone)]
pub struct FakeDataSource {
    name: &'static str,
    up: Arc<AtomicBool>,
    queries_fail: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
}

impl FakeDataSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            up: Arc::new(AtomicBool::new(true)),
            queries_fail: Arc::new(AtomicBool::new(false)),
            probes: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// Probes keep succeeding but every query fails with a data-access error
    pub fn set_queries_fail(&self, fail: bool) {
        self.queries_fail.store(fail, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Simulated store query
    pub async fn query(&self) -> DatabaseResult<&'static str> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.up.load(Ordering::SeqCst) || self.queries_fail.load(Ordering::SeqCst) {
            Err(DatabaseError::data_access(format!("{} connection reset", self.name)))
        } else {
            Ok(self.name)
        }
    }
}

#[async_trait]
impl DataSource for FakeDataSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn probe(&self) -> DatabaseResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DatabaseError::probe_failed(self.name, "connection refused"))
        }
    }
}

/// Terminal sink that keeps what it was given
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(RetryEnvelope, RetryInfo)>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<(RetryEnvelope, RetryInfo)> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl TerminalSink for RecordingSink {
    async fn record(&self, envelope: &RetryEnvelope, info: &RetryInfo) -> MessagingResult<()> {
        self.records.lock().push((envelope.clone(), info.clone()));
        Ok(())
    }
}

/// Fails the first `failures` calls, then succeeds
#[derive(Debug)]
pub struct FlakyProcessor {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyProcessor {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventProcessor for FlakyProcessor {
    async fn process(&self, event: TrackingEventRequest) -> Result<(), ProcessingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(ProcessingError::failed(format!(
                "store unavailable for {}",
                event.package_id
            )))
        } else {
            Ok(())
        }
    }
}

/// Completes only after `delay`
#[derive(Debug)]
pub struct SlowProcessor {
    pub delay: Duration,
    pub completed: AtomicUsize,
}

impl SlowProcessor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventProcessor for SlowProcessor {
    async fn process(&self, _event: TrackingEventRequest) -> Result<(), ProcessingError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn tracking_event(package_id: &str) -> TrackingEventRequest {
    TrackingEventRequest::new(
        package_id,
        "Centro de Distribuicao SP",
        "Objeto em transito",
        Utc::now() - chrono::Duration::minutes(5),
    )
}

/// In-memory broker with the default topology declared
pub async fn declared_broker() -> (InMemoryBroker, Arc<BrokerProvider>, BrokerTopology) {
    let broker = InMemoryBroker::new();
    let provider = Arc::new(BrokerProvider::from(broker.clone()));
    let topology = BrokerTopology::default();
    provider
        .declare_topology(&topology)
        .await
        .expect("topology declares");
    (broker, provider, topology)
}
