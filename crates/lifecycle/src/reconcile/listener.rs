//! The long-running reconciliation loop.
//!
//! Each delivery is decoded, routed to the affected tenant, and applied
//! through the lifecycle engine. Handling failures are retried after a
//! delay up to `max_attempts` deliveries, then routed to the dead-letter
//! channel. Malformed or irrelevant events are acknowledged immediately.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use nfc_persistence::core::TagStore;
use nfc_persistence::tenant::{Operation, TenantContext, TenantContextBuilder, TenantPermissions};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::event::{ReconcileAction, decode};
use crate::engine::LifecycleEngine;
use crate::error::{LifecycleError, LifecycleResult};

/// Maps an inbound event's organization to a tenant context.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Builds the context the cascade runs under.
    async fn resolve(
        &self,
        organization_id: &str,
        schema_hint: Option<&str>,
    ) -> LifecycleResult<TenantContext>;
}

/// Uses the organization id as the tenant id and grants only
/// [`Operation::Reconcile`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationTenantResolver;

#[async_trait]
impl TenantResolver for OrganizationTenantResolver {
    async fn resolve(
        &self,
        organization_id: &str,
        _schema_hint: Option<&str>,
    ) -> LifecycleResult<TenantContext> {
        let context = TenantContextBuilder::new()
            .tenant_id(organization_id)
            .permissions(
                TenantPermissions::builder()
                    .allow(Operation::Reconcile)
                    .build(),
            )
            .user_id("nfc-reconciler")
            .build()?;
        Ok(context)
    }
}

/// Retry policy for the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Deliveries of one message before it is dead-lettered.
    pub max_attempts: u32,
    /// Pause before a failed message is redelivered.
    pub retry_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// One message as handed over by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Routing key the message arrived on.
    pub routing_key: String,
    /// Raw body.
    pub body: Vec<u8>,
    /// 1 on first delivery, incremented on each redelivery.
    pub attempt: u32,
}

impl Delivery {
    /// Creates a first delivery.
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
            attempt: 1,
        }
    }

    fn redelivered(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// A message that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// The final delivery.
    pub delivery: Delivery,
    /// The last handling error.
    pub error: String,
}

/// What happened to a successfully handled delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    /// The decoded action.
    pub action: ReconcileAction,
    /// Tags deactivated by it.
    pub deactivated: u64,
}

/// Result of processing one delivery.
#[derive(Debug)]
pub enum Outcome {
    /// Handled or skipped; acknowledge.
    Ack(Handled),
    /// Failed; redeliver later.
    Requeue(LifecycleError),
    /// Failed on its last allowed attempt.
    DeadLetter(LifecycleError),
}

/// Counters accumulated by [`ReconciliationListener::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Deliveries processed, redeliveries included.
    pub processed: u64,
    /// Deliveries acknowledged.
    pub acknowledged: u64,
    /// Acknowledged without action.
    pub ignored: u64,
    /// Tags deactivated by cascades.
    pub deactivated: u64,
    /// Redeliveries scheduled.
    pub retried: u64,
    /// Messages dead-lettered.
    pub dead_lettered: u64,
}

/// Applies inbound lifecycle events to tag state.
pub struct ReconciliationListener<S: TagStore, R: TenantResolver> {
    engine: LifecycleEngine<S>,
    resolver: R,
    config: ListenerConfig,
    dead_letters: Option<mpsc::UnboundedSender<DeadLetter>>,
}

impl<S: TagStore, R: TenantResolver> ReconciliationListener<S, R> {
    /// Creates a listener.
    ///
    /// The engine should be built with a [`NoopPublisher`](crate::events::NoopPublisher);
    /// cascades publish nothing either way.
    pub fn new(engine: LifecycleEngine<S>, resolver: R, config: ListenerConfig) -> Self {
        Self {
            engine,
            resolver,
            config,
            dead_letters: None,
        }
    }

    /// Routes exhausted messages to `sender`.
    pub fn with_dead_letters(mut self, sender: mpsc::UnboundedSender<DeadLetter>) -> Self {
        self.dead_letters = Some(sender);
        self
    }

    /// Returns the retry policy.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Decodes and applies one delivery.
    pub async fn handle(&self, delivery: &Delivery) -> LifecycleResult<Handled> {
        let action = decode(&delivery.routing_key, &delivery.body);

        let deactivated = match &action {
            ReconcileAction::DeactivatePatient {
                organization_id,
                schema_name,
                patient_id,
            } => {
                let ctx = self
                    .resolver
                    .resolve(organization_id, schema_name.as_deref())
                    .await?;
                self.engine
                    .cascade_deactivate_for_patient(&ctx, patient_id)
                    .await?
            }
            ReconcileAction::DeactivateOrganization {
                organization_id,
                schema_name,
            } => {
                let ctx = self
                    .resolver
                    .resolve(organization_id, schema_name.as_deref())
                    .await?;
                self.engine.cascade_deactivate_all(&ctx).await?
            }
            ReconcileAction::Ignore(reason) => {
                debug!(event_type = %delivery.routing_key, reason = %reason, "Skipping event");
                0
            }
        };

        Ok(Handled {
            action,
            deactivated,
        })
    }

    /// Handles one delivery and decides its fate.
    pub async fn process(&self, delivery: &Delivery) -> Outcome {
        match self.handle(delivery).await {
            Ok(handled) => Outcome::Ack(handled),
            Err(e) if delivery.attempt >= self.config.max_attempts => Outcome::DeadLetter(e),
            Err(e) => Outcome::Requeue(e),
        }
    }

    /// Consumes deliveries until `inbound` closes and every retry has been
    /// settled, or until `shutdown` changes or its sender is dropped.
    ///
    /// A failed delivery waits `retry_delay` in a deadline-ordered queue
    /// while new deliveries keep flowing. Retries pending at shutdown are
    /// dropped; the broker redelivers them.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<Delivery>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ListenerStats {
        let mut stats = ListenerStats::default();
        // Constant delay, so push order is deadline order.
        let mut retries: VecDeque<(Instant, Delivery)> = VecDeque::new();
        let mut inbound_open = true;

        loop {
            if *shutdown.borrow() || (!inbound_open && retries.is_empty()) {
                break;
            }

            let next_due = retries.front().map(|(due, _)| *due);
            let delivery = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    match retries.pop_front() {
                        Some((_, delivery)) => delivery,
                        None => continue,
                    }
                }
                received = inbound.recv(), if inbound_open => match received {
                    Some(delivery) => delivery,
                    None => {
                        inbound_open = false;
                        continue;
                    }
                },
            };

            stats.processed += 1;
            match self.process(&delivery).await {
                Outcome::Ack(handled) => {
                    stats.acknowledged += 1;
                    stats.deactivated += handled.deactivated;
                    if matches!(handled.action, ReconcileAction::Ignore(_)) {
                        stats.ignored += 1;
                    }
                }
                Outcome::Requeue(e) => {
                    warn!(
                        event_type = %delivery.routing_key,
                        attempt = delivery.attempt,
                        error = %e,
                        "Event handling failed, will retry"
                    );
                    stats.retried += 1;
                    let due = Instant::now() + self.config.retry_delay;
                    retries.push_back((due, delivery.redelivered()));
                }
                Outcome::DeadLetter(e) => {
                    warn!(
                        event_type = %delivery.routing_key,
                        attempt = delivery.attempt,
                        error = %e,
                        "Event handling failed, dead-lettering"
                    );
                    stats.dead_lettered += 1;
                    self.dead_letter(delivery, e);
                }
            }
        }

        if !retries.is_empty() {
            warn!(pending = retries.len(), "Listener stopped with retries pending");
        }
        info!(
            processed = stats.processed,
            deactivated = stats.deactivated,
            dead_lettered = stats.dead_lettered,
            "Reconciliation listener stopped"
        );
        stats
    }

    fn dead_letter(&self, delivery: Delivery, error: LifecycleError) {
        if let Some(sender) = &self.dead_letters {
            let letter = DeadLetter {
                delivery,
                error: error.to_string(),
            };
            if sender.send(letter).is_err() {
                warn!("Dead-letter receiver dropped");
            }
        }
    }
}
