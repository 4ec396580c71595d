//! Test runtime wiring: an in-memory client, queue, and worker assembled the
//! same way a production deployment would assemble theirs, minus the
//! out-of-process backends.

use std::sync::Arc;

use tokio::sync::broadcast;
use workbatch_core::client::WorkbatchClient;
use workbatch_core::config::{CleanupPolicy, WorkbatchConfig};
use workbatch_core::events::PublishedEvent;
use workbatch_core::job::{JobHandler, JobRegistry};
use workbatch_core::queue::{MemoryQueue, QueueBackend};
use workbatch_core::store::{KeyedStore, MemoryStore};
use workbatch_core::worker::LocalWorker;

/// Everything a test needs to drive batch trees end to end.
pub struct TestRuntime {
    pub client: Arc<WorkbatchClient>,
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryStore>,
    pub worker: LocalWorker,
    pub events: broadcast::Receiver<PublishedEvent>,
}

impl TestRuntime {
    /// Drain events already sitting in the broadcast buffer, without waiting.
    pub fn take_events(&mut self) -> Vec<PublishedEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// How many of the given events carry `name`.
    pub fn count_events(events: &[PublishedEvent], name: &str) -> usize {
        events.iter().filter(|e| e.name == name).count()
    }
}

/// Builder for [`TestRuntime`] instances.
pub struct RuntimeBuilder {
    config: WorkbatchConfig,
    registry: Arc<JobRegistry>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: WorkbatchConfig::default(),
            registry: Arc::new(JobRegistry::new()),
        }
    }

    pub fn with_config(mut self, config: WorkbatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.config.store.cleanup = cleanup;
        self
    }

    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.config.queue.max_payload_bytes = limit;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.worker.max_retries = max_retries;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.worker.concurrency = concurrency;
        self
    }

    pub fn register(self, name: &str, handler: Arc<dyn JobHandler>) -> Self {
        self.registry.register(name, handler);
        self
    }

    pub fn build(self) -> TestRuntime {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let client = Arc::new(WorkbatchClient::new(
            Arc::clone(&store) as Arc<dyn KeyedStore>,
            Arc::clone(&queue) as Arc<dyn QueueBackend>,
            self.registry,
            self.config,
        ));
        let events = client.subscribe_events();
        let worker = LocalWorker::new(Arc::clone(&client), Arc::clone(&queue));

        TestRuntime {
            client,
            queue,
            store,
            worker,
            events,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
