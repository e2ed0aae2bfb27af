//! Release agent: the control loop around the reconcile engine.
//!
//! Watches the store for admitted changes, keeps a per-release due time,
//! and runs at most one pass at a time. Each pass result is turned into the
//! next due time by the [`RequeuePolicy`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use opkit::{
    BackoffConfig, EventPredicate, GenerationPredicate, InMemoryClient, ObjectKey, PassContext,
    ReconcileEngine, RequeuePolicy, Resource, ResourceClient,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, error, info, warn};

use crate::metrics::AgentMetrics;
use crate::reconciler::{ReleaseContext, build_engine};
use crate::release::Release;

/// Agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Simulated time a rollout takes.
    pub rollout_duration: Duration,
    pub backoff: BackoffConfig,
    /// Re-reconcile every release this often even without changes.
    pub resync_interval: Duration,
    /// Return from `run` once no pass is pending.
    pub exit_when_idle: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            rollout_duration: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
            resync_interval: Duration::from_secs(300),
            exit_when_idle: false,
        }
    }
}

/// Control loop for Release resources.
pub struct ReleaseAgent {
    store: Arc<InMemoryClient<Release>>,
    engine: ReconcileEngine<ReleaseContext>,
    predicate: GenerationPredicate,
    policy: RequeuePolicy,
    /// Next pass due time per release.
    queue: BTreeMap<ObjectKey, Instant>,
    metrics: AgentMetrics,
    config: AgentConfig,
}

impl ReleaseAgent {
    pub fn new(store: Arc<InMemoryClient<Release>>, config: AgentConfig) -> Result<Self> {
        Ok(Self {
            engine: build_engine(store.clone(), config.rollout_duration),
            store,
            predicate: GenerationPredicate::GenerationChanged,
            policy: RequeuePolicy::new(config.backoff),
            queue: BTreeMap::new(),
            metrics: AgentMetrics::new()?,
            config,
        })
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    /// Run until `shutdown` flips to true (or, with `exit_when_idle`, until
    /// nothing is pending).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut events = BroadcastStream::new(self.store.subscribe());
        self.enqueue_all().await;
        info!("Release agent started with {} releases", self.queue.len());

        loop {
            self.metrics.set_queue_depth(self.queue.len());
            if *shutdown.borrow() {
                break;
            }
            if self.config.exit_when_idle && self.queue.is_empty() {
                info!("No pending passes, exiting");
                break;
            }

            let (deadline, resync) = match self.queue.values().min() {
                Some(due) => (*due, false),
                None => (Instant::now() + self.config.resync_interval, true),
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Release agent stopping");
                    break;
                }
                Some(event) = events.next() => match event {
                    Ok(event) => {
                        if self.predicate.admit(&event) {
                            debug!("Admitted {} event for {}", event.kind(), event.key());
                            self.queue.insert(event.key(), Instant::now());
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!("Missed {} store events, resyncing", missed);
                        self.enqueue_all().await;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if resync {
                        debug!("Resync interval elapsed");
                        self.enqueue_all().await;
                    }
                    self.process_due(&shutdown).await;
                }
            }
        }

        Ok(())
    }

    async fn enqueue_all(&mut self) {
        let now = Instant::now();
        for release in self.store.list().await {
            self.queue.insert(release.key(), now);
        }
    }

    async fn process_due(&mut self, shutdown: &watch::Receiver<bool>) {
        let now = Instant::now();
        let due: Vec<ObjectKey> = self
            .queue
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in due {
            self.queue.remove(&key);
            self.reconcile(key, shutdown.clone()).await;
        }
    }

    /// One pass for one release, then schedule the next.
    async fn reconcile(&mut self, key: ObjectKey, shutdown: watch::Receiver<bool>) {
        let release = match self.store.get(&key).await {
            Ok(release) => release,
            Err(e) if e.is_not_found() => {
                debug!("Release {} is gone", key);
                self.policy.forget(&key);
                return;
            }
            Err(e) => {
                error!("Failed to read release {}: {}", key, e);
                self.queue
                    .insert(key, Instant::now() + self.config.backoff.base);
                return;
            }
        };

        let mut ctx = PassContext::with_cancellation(release, shutdown);
        let started = Instant::now();
        let outcome = self.engine.run(&mut ctx).await;
        self.metrics.pass_finished(&outcome, started.elapsed());
        match &outcome {
            Ok(action) => debug!("Reconciled {}: {:?}", key, action),
            Err(e) => error!("Reconcile of {} failed: {}", key, e),
        }

        if let Some(delay) = self.policy.next_delay(&key, &outcome) {
            debug!("Next pass for {} in {:?}", key, delay);
            self.queue.insert(key, Instant::now() + delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkit::testing::MetricSnapshot;

    fn test_config() -> AgentConfig {
        AgentConfig {
            rollout_duration: Duration::ZERO,
            backoff: BackoffConfig {
                base: Duration::from_millis(1),
                max: Duration::from_millis(10),
            },
            resync_interval: Duration::from_secs(300),
            exit_when_idle: true,
        }
    }

    #[tokio::test]
    async fn test_agent_drives_all_releases_to_ready() {
        let store = Arc::new(InMemoryClient::new());
        for i in 0..3 {
            store
                .create(Release::new("default", &format!("release-{}", i), "1.0.0", 2))
                .await
                .unwrap();
        }

        let (_tx, rx) = watch::channel(false);
        let mut agent = ReleaseAgent::new(store.clone(), test_config()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), agent.run(rx))
            .await
            .unwrap()
            .unwrap();

        let releases = store.list().await;
        assert_eq!(releases.len(), 3);
        assert!(releases.iter().all(Release::is_ready));

        // One pass starts each rollout, a second one completes it.
        let expected = MetricSnapshot::default()
            .with(r#"opkit_agent_reconcile_total{result="done"}"#, 3.0)
            .with(r#"opkit_agent_reconcile_total{result="requeue"}"#, 3.0);
        let snapshot = MetricSnapshot::gather(agent.metrics().registry());
        expected
            .assert_matches(&snapshot.filter_prefix("opkit_agent_reconcile_total"))
            .unwrap();
        assert_eq!(snapshot.get("opkit_agent_queue_depth"), Some(0.0));
    }

    #[tokio::test]
    async fn test_agent_leaves_invalid_release_not_ready() {
        let store = Arc::new(InMemoryClient::new());
        store
            .create(Release::new("default", "good", "1.0.0", 1))
            .await
            .unwrap();
        store
            .create(Release::new("default", "bad", "1.0.0", 0))
            .await
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let mut agent = ReleaseAgent::new(store.clone(), test_config()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), agent.run(rx))
            .await
            .unwrap()
            .unwrap();

        let good = store.get(&ObjectKey::new("default", "good")).await.unwrap();
        let bad = store.get(&ObjectKey::new("default", "bad")).await.unwrap();
        assert!(good.is_ready());
        assert!(!bad.is_ready());
        assert_eq!(
            bad.status.conditions.get("Ready").unwrap().reason,
            "InvalidSpec"
        );
    }

    #[tokio::test]
    async fn test_agent_stops_on_shutdown() {
        let store = Arc::new(InMemoryClient::new());
        let config = AgentConfig {
            exit_when_idle: false,
            ..test_config()
        };
        let (tx, rx) = watch::channel(false);
        let mut agent = ReleaseAgent::new(store, config).unwrap();

        let handle = tokio::spawn(async move { agent.run(rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
