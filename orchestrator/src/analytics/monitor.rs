//! Background reflexive monitor.
//!
//! Periodically runs [`assess`] over a store snapshot and publishes the
//! latest assessment on a `watch` channel. Stops when its
//! `CancellationToken` is cancelled.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reflexive::{assess, ReflexiveAssessment};
use crate::config::ReflexiveConfig;
use crate::memory::SharedContextStore;

pub struct ReflexiveMonitor {
    store: SharedContextStore,
    config: ReflexiveConfig,
    cancel: CancellationToken,
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    cancel: CancellationToken,
    latest: watch::Receiver<Option<ReflexiveAssessment>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Most recent assessment, if one has run yet.
    pub fn latest(&self) -> Option<ReflexiveAssessment> {
        self.latest.borrow().clone()
    }

    /// Receiver notified after every assessment.
    pub fn subscribe(&self) -> watch::Receiver<Option<ReflexiveAssessment>> {
        self.latest.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the monitor and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Reflexive monitor task ended abnormally");
        }
    }
}

impl ReflexiveMonitor {
    pub fn new(store: SharedContextStore, config: ReflexiveConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. a process-wide shutdown token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one assessment and log it.
    pub fn run_once(&self) -> ReflexiveAssessment {
        let snapshot = self.store.snapshot();
        let assessment = assess(&snapshot, &self.config);
        if assessment.needs_attention {
            warn!(
                trend = %assessment.trend,
                flagged = assessment.flagged_providers.len(),
                summary = %assessment.summary,
                "Reflexive analysis needs attention"
            );
        } else {
            debug!(trend = %assessment.trend, summary = %assessment.summary, "Reflexive analysis");
        }
        assessment
    }

    /// Spawn the periodic loop. The first assessment runs immediately.
    pub fn spawn(self) -> MonitorHandle {
        let (tx, rx) = watch::channel(None);
        let cancel = self.cancel.clone();
        let period = Duration::from_secs(self.config.interval_secs.max(1));

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "Reflexive monitor started");

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let assessment = self.run_once();
                        tx.send_replace(Some(assessment));
                    }
                }
            }

            info!("Reflexive monitor stopped");
        });

        MonitorHandle {
            cancel,
            latest: rx,
            task,
        }
    }
}
