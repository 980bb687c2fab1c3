//! The per-instance evaluation flow
//!
//! One call to [`LifecycleEngine::evaluate`] is one reconciliation pass:
//! resolve policy, bootstrap timer state, refresh the activity signal,
//! evaluate both remaining-time functions, then terminate, warn, or
//! requeue. The engine holds no per-instance state of its own; everything
//! it needs to resume after a restart lives on the instance, and every
//! write is a single atomic, revision-checked patch. Calling it again on
//! the same instance is always safe.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use warden_api::{Instance, ALERT_COUNT_KEY};
use warden_config::{InstancePolicy, Settings};
use warden_store::{
    activity_refresh_patch, bootstrap_patch, increment_alert_count, last_activity, last_running,
    notification_sent_patch, reset_alert_patch, running_observed_patch, AuditEvent,
    AuditEventType, StateError, Store,
};
use warden_activity::ActivitySource;
use warden_util::{format_remaining, InstanceKey, PassId, Result, WardenError};

use crate::{
    is_due, min_remaining, remaining_inactivity, remaining_lifetime, EscalationPolicy,
    Notification, NotificationKind, Notifier, TerminationAction, TerminationExecutor,
    TerminationReason,
};

/// Result of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The instance no longer exists; nothing to do
    Gone,

    /// Both timeout dimensions are disabled; no requeue needed
    Unmanaged,

    /// The instance was terminated this pass
    Terminated {
        reason: TerminationReason,
        action: TerminationAction,
    },

    /// The instance stays; check again after this long
    Requeue {
        after: Duration,
        /// A warning notification was sent this pass
        warned: bool,
        /// The activity signal was unavailable; the inactivity dimension
        /// was skipped
        degraded: bool,
    },
}

/// The lifecycle policy engine
///
/// All collaborators are injected and scoped to the engine's lifetime;
/// the engine itself owns no connections and caches nothing per instance.
pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    activity: Arc<dyn ActivitySource>,
    notifier: Arc<dyn Notifier>,
    escalation: EscalationPolicy,
    executor: TerminationExecutor,
    default_max_alerts: u32,
    margin: Duration,
    reconcile_interval: Duration,
}

impl LifecycleEngine {
    /// Create a new engine
    pub fn new(
        store: Arc<dyn Store>,
        activity: Arc<dyn ActivitySource>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Self {
        info!(
            notifications_enabled = settings.notifications.enabled,
            max_alerts = settings.notifications.max_alerts,
            "Lifecycle engine initialized"
        );

        Self {
            executor: TerminationExecutor::new(store.clone()),
            store,
            activity,
            notifier,
            escalation: EscalationPolicy {
                enabled: settings.notifications.enabled,
                interval: settings.notifications.interval,
                margin: settings.daemon.margin,
            },
            default_max_alerts: settings.notifications.max_alerts,
            margin: settings.daemon.margin,
            reconcile_interval: settings.daemon.reconcile_interval,
        }
    }

    /// Evaluate one instance: one reconciliation pass.
    pub async fn evaluate(&self, key: &InstanceKey) -> Result<Outcome> {
        let pass = PassId::new();

        let Some(mut instance) = self.store.get_instance(key)? else {
            debug!(instance = %key, "Instance gone, nothing to evaluate");
            return Ok(Outcome::Gone);
        };

        let template = self
            .store
            .get_template(&instance.template)?
            .ok_or_else(|| WardenError::TemplateNotFound(instance.template.clone()))?;
        let policy = InstancePolicy::resolve(&template, self.default_max_alerts)?;

        if policy.is_unmanaged() {
            debug!(instance = %key, "Both timeout dimensions set to never, instance unmanaged");
            return Ok(Outcome::Unmanaged);
        }

        let now = warden_util::now();

        // Bootstrap timer state; a no-op on an already-bootstrapped instance
        if let Some(patch) = bootstrap_patch(&instance, now) {
            instance = self.store.patch_metadata(key, instance.revision, &patch)?;
            info!(instance = %key, pass = %pass, "Timer state bootstrapped");
            let _ = self.store.append_audit(AuditEvent::new(
                AuditEventType::StateBootstrapped {
                    instance: key.clone(),
                },
            ));
        }

        instance = self.reset_on_reactivation(instance, now)?;

        // Refresh the stored activity signal. The dimension only applies
        // while the instance is running; a stopped instance cannot go
        // "more idle".
        let inactivity_active = !policy.inactivity_timeout.is_never() && instance.running;
        let mut degraded = false;

        if inactivity_active {
            if self.activity.is_healthy().await {
                match self.activity.last_activity(&instance).await {
                    Ok(Some(observed)) => {
                        let stored = last_activity(&instance)?;
                        // Monotonic update: never move the stored timestamp
                        // backward
                        if observed > stored {
                            let patch = activity_refresh_patch(observed);
                            instance = self.store.patch_metadata(key, instance.revision, &patch)?;
                            debug!(
                                instance = %key,
                                last_activity = %observed,
                                "Fresh activity observed, escalation reset"
                            );
                            let _ = self.store.append_audit(AuditEvent::new(
                                AuditEventType::ActivityRefreshed {
                                    instance: key.clone(),
                                    last_activity: observed,
                                },
                            ));
                        }
                    }
                    Ok(None) => {
                        debug!(instance = %key, "No fresh activity reported");
                    }
                    Err(e) => {
                        warn!(instance = %key, error = %e, "Activity query failed, skipping inactivity check for this pass");
                        degraded = true;
                    }
                }
            } else {
                warn!(instance = %key, "Activity backend unhealthy, skipping inactivity check for this pass");
                degraded = true;
            }
        }

        // Evaluate both dimensions. No data is never interpreted as
        // inactivity: a degraded signal disables the inactivity dimension
        // for this pass while the absolute lifetime still applies.
        let lifetime_remaining = remaining_lifetime(instance.created_at, &policy.max_lifetime, now);
        let inactivity_remaining = if inactivity_active && !degraded {
            remaining_inactivity(last_activity(&instance)?, &policy.inactivity_timeout, now)
        } else {
            None
        };

        let lifetime_due = is_due(lifetime_remaining);
        let inactivity_due = is_due(inactivity_remaining);

        if lifetime_due || inactivity_due {
            let reason = if lifetime_due {
                TerminationReason::Expired
            } else {
                TerminationReason::Inactive
            };

            let action = self.executor.terminate(&instance, reason)?;

            if self.escalation.enabled {
                let notification =
                    Notification::new(&instance, NotificationKind::Terminated { reason, action });
                if let Err(e) = self.notifier.notify(&notification).await {
                    warn!(instance = %key, error = %e, "Failed delivering termination notification");
                }
            }

            info!(instance = %key, %reason, ?action, pass = %pass, "Instance terminated");
            return Ok(Outcome::Terminated { reason, action });
        }

        // Inside the warning window, run the escalation ladder
        let nearest = min_remaining(lifetime_remaining, inactivity_remaining);
        let mut warned = false;

        if let Some(remaining) = nearest
            && remaining <= self.escalation.warning_window(policy.max_alerts)
        {
            warned = self
                .maybe_warn(
                    &mut instance,
                    &policy,
                    remaining,
                    lifetime_remaining,
                    inactivity_remaining,
                    now,
                )
                .await?;
        }

        let after = self.requeue_after(nearest, &policy);
        debug!(
            instance = %key,
            after_secs = after.as_secs(),
            warned,
            degraded,
            pass = %pass,
            "Requeueing instance"
        );

        Ok(Outcome::Requeue {
            after,
            warned,
            degraded,
        })
    }

    /// Reset the alert state and inactivity clock when the instance went
    /// from stopped to running since the last pass, and keep the stored
    /// running flag current.
    fn reset_on_reactivation(&self, instance: Instance, now: DateTime<Utc>) -> Result<Instance> {
        let observed_before = last_running(&instance);

        if instance.running && observed_before == Some(false) {
            info!(
                instance = %instance.key,
                "Instance restarted, resetting alert state and inactivity clock"
            );
            let patch = activity_refresh_patch(now).merge(running_observed_patch(true));
            let updated = self
                .store
                .patch_metadata(&instance.key, instance.revision, &patch)?;
            let _ = self.store.append_audit(AuditEvent::new(
                AuditEventType::AlertStateReset {
                    instance: updated.key.clone(),
                },
            ));
            return Ok(updated);
        }

        if observed_before != Some(instance.running) {
            let patch = running_observed_patch(instance.running);
            let updated = self
                .store
                .patch_metadata(&instance.key, instance.revision, &patch)?;
            return Ok(updated);
        }

        Ok(instance)
    }

    /// Run the escalation decision and send at most one warning.
    async fn maybe_warn(
        &self,
        instance: &mut Instance,
        policy: &InstancePolicy,
        remaining: TimeDelta,
        lifetime_remaining: Option<TimeDelta>,
        inactivity_remaining: Option<TimeDelta>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let decision = match self
            .escalation
            .should_notify(instance, policy.max_alerts, now)
        {
            Ok(decision) => decision,
            Err(StateError::Malformed { field, value }) if field == ALERT_COUNT_KEY => {
                // The counter is an anti-spam safeguard, not a safety
                // value: self-heal instead of failing the pass.
                warn!(
                    instance = %instance.key,
                    value = %value,
                    "Malformed alert counter, resetting to 0"
                );
                *instance =
                    self.store
                        .patch_metadata(&instance.key, instance.revision, &reset_alert_patch())?;
                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::AlertStateReset {
                        instance: instance.key.clone(),
                    },
                ));
                self.escalation
                    .should_notify(instance, policy.max_alerts, now)?
            }
            Err(e) => return Err(e.into()),
        };

        if !decision {
            return Ok(false);
        }

        // Warn about whichever deadline is nearest
        let reason = match (lifetime_remaining, inactivity_remaining) {
            (Some(l), Some(i)) if l <= i => TerminationReason::Expired,
            (Some(_), None) => TerminationReason::Expired,
            _ => TerminationReason::Inactive,
        };

        let raw_count = instance.metadata_value(ALERT_COUNT_KEY).unwrap_or("0");
        let next_count = increment_alert_count(raw_count).unwrap_or_else(|_| "0".to_string());
        let sent_number: u32 = next_count.parse().unwrap_or(0);
        let alerts_remaining = policy.max_alerts.saturating_sub(sent_number);

        // Send before recording: only a delivered warning advances the
        // counter, so a failed send is retried on the next pass.
        let notification = Notification::new(
            instance,
            NotificationKind::Warning {
                reason,
                remaining,
                alerts_remaining,
            },
        );
        self.notifier.notify(&notification).await?;

        let patch = notification_sent_patch(&next_count, now);
        *instance = self
            .store
            .patch_metadata(&instance.key, instance.revision, &patch)?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::WarningSent {
                instance: instance.key.clone(),
                alert_number: sent_number,
                reason: reason.to_string(),
                remaining_seconds: remaining.num_seconds(),
            }));

        info!(
            instance = %instance.key,
            alert_number = sent_number,
            %reason,
            remaining = %format_remaining(remaining),
            "Warning sent"
        );

        Ok(true)
    }

    /// Next-check hint: the smallest positive remaining time, clamped to
    /// the notification cadence while the warning window is open, plus
    /// the margin so the instance is not requeued just before its
    /// deadline.
    fn requeue_after(&self, nearest: Option<TimeDelta>, policy: &InstancePolicy) -> Duration {
        let margin = TimeDelta::from_std(self.margin).unwrap_or_default();

        let hint = match nearest {
            Some(remaining) => {
                let mut hint = remaining;
                if remaining <= self.escalation.warning_window(policy.max_alerts) {
                    let interval = TimeDelta::from_std(self.escalation.interval)
                        .unwrap_or(TimeDelta::MAX);
                    hint = hint.min(interval);
                }
                hint.checked_add(&margin).unwrap_or(hint)
            }
            // Nothing finite to wait for this pass (degraded signal with
            // an unlimited lifetime, or a stopped instance); fall back to
            // the scheduler granularity
            None => return self.reconcile_interval,
        };

        hint.to_std().unwrap_or(self.reconcile_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockNotifier;
    use std::collections::BTreeMap;
    use warden_activity::MockActivitySource;
    use warden_api::{Template, LAST_ACTIVITY_KEY, LAST_NOTIFICATION_KEY, LAST_RUNNING_KEY};
    use warden_config::parse_settings;
    use warden_store::SqliteStore;
    use warden_util::TenantId;

    struct Harness {
        store: Arc<SqliteStore>,
        activity: MockActivitySource,
        notifier: MockNotifier,
        engine: LifecycleEngine,
    }

    fn make_harness() -> Harness {
        let settings = parse_settings(
            r#"
            config_version = 1

            [daemon]
            reconcile_interval_seconds = 60
            margin_seconds = 30

            [notifications]
            enabled = true
            interval_seconds = 3600
            max_alerts = 3

            [activity]
            base_url = "http://metrics.internal:9090"
            "#,
        )
        .unwrap();

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let activity = MockActivitySource::new();
        let notifier = MockNotifier::new();

        let engine = LifecycleEngine::new(
            store.clone(),
            Arc::new(activity.clone()),
            Arc::new(notifier.clone()),
            &settings,
        );

        Harness {
            store,
            activity,
            notifier,
            engine,
        }
    }

    fn seed_template(store: &dyn Store, delete_after: &str, inactivity_timeout: &str) {
        store
            .put_template(&Template {
                name: "netlab".into(),
                pretty_name: "Network Lab".into(),
                delete_after: delete_after.into(),
                inactivity_timeout: inactivity_timeout.into(),
                metadata: BTreeMap::new(),
            })
            .unwrap();
    }

    fn seed_instance(
        store: &dyn Store,
        name: &str,
        age: TimeDelta,
        persistent: bool,
        metadata: &[(&str, &str)],
    ) -> Instance {
        let instance = Instance {
            key: InstanceKey::new("tenant-alice", name),
            revision: 0,
            created_at: warden_util::now() - age,
            running: true,
            persistent,
            tenant: TenantId::new("alice"),
            tenant_email: "alice@example.com".into(),
            template: "netlab".into(),
            pretty_name: "Network Lab".into(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        store.create_instance(&instance).unwrap()
    }

    fn rfc3339_ago(delta: TimeDelta) -> String {
        warden_util::format_rfc3339(warden_util::now() - delta)
    }

    #[tokio::test]
    async fn expired_instance_is_deleted() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "1m", "never");
        // Created two minutes ago with a one-minute lifetime
        let instance = seed_instance(h.store.as_ref(), "inst", TimeDelta::minutes(2), false, &[]);

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Terminated {
                reason: TerminationReason::Expired,
                action: TerminationAction::Deleted,
            }
        );
        assert!(h.store.get_instance(&instance.key).unwrap().is_none());

        // Termination notification went out
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0].kind,
            NotificationKind::Terminated {
                reason: TerminationReason::Expired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn never_never_is_unmanaged() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "never");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::days(3650),
            false,
            &[],
        );

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert_eq!(outcome, Outcome::Unmanaged);
        assert!(h.store.get_instance(&instance.key).unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_instance_is_gone() {
        let h = make_harness();
        let outcome = h
            .engine
            .evaluate(&InstanceKey::new("ns", "ghost"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Gone);
    }

    #[tokio::test]
    async fn evaluate_bootstraps_idempotently() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "7d", "12h");
        let instance = seed_instance(h.store.as_ref(), "inst", TimeDelta::minutes(5), false, &[]);

        h.engine.evaluate(&instance.key).await.unwrap();
        let first = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert!(first.is_bootstrapped());

        h.engine.evaluate(&instance.key).await.unwrap();
        let second = h.store.get_instance(&instance.key).unwrap().unwrap();

        // Bootstrapping twice produces identical state
        assert_eq!(
            first.metadata_value(LAST_ACTIVITY_KEY),
            second.metadata_value(LAST_ACTIVITY_KEY)
        );
        assert_eq!(first.metadata_value(ALERT_COUNT_KEY), Some("0"));
        assert_eq!(second.metadata_value(ALERT_COUNT_KEY), Some("0"));
    }

    #[tokio::test]
    async fn inactive_instance_is_terminated() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "1m");
        // Last activity 1000 hours ago
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(2000),
            false,
            &[
                (ALERT_COUNT_KEY, "3"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(1000))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Terminated {
                reason: TerminationReason::Inactive,
                action: TerminationAction::Deleted,
            }
        );
    }

    #[tokio::test]
    async fn persistent_inactive_instance_is_stopped() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "1m");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            true,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(5))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Terminated {
                reason: TerminationReason::Inactive,
                action: TerminationAction::Stopped,
            }
        );

        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert!(!current.running);
    }

    #[tokio::test]
    async fn unhealthy_backend_skips_inactivity() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "1m");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(5))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        h.activity.set_healthy(false);

        // Stored activity is way past the timeout, but stale data must not
        // trigger termination
        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Requeue {
                degraded: true,
                warned: false,
                ..
            }
        ));
        assert!(h.store.get_instance(&instance.key).unwrap().is_some());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn erroring_backend_skips_inactivity() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "1m");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(5))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        h.activity.set_fail_queries(true);

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(outcome, Outcome::Requeue { degraded: true, .. }));
        assert!(h.store.get_instance(&instance.key).unwrap().is_some());
    }

    #[tokio::test]
    async fn fresh_activity_moves_the_clock_and_resets_alerts() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "12h");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(20),
            false,
            &[
                (ALERT_COUNT_KEY, "2"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(11))),
                (LAST_NOTIFICATION_KEY, &rfc3339_ago(TimeDelta::hours(1))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let fresh = warden_util::now() - TimeDelta::minutes(10);
        h.activity.set_activity(instance.key.clone(), fresh);

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Requeue {
                warned: false,
                degraded: false,
                ..
            }
        ));

        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert_eq!(current.metadata_value(ALERT_COUNT_KEY), Some("0"));
        assert!(current.metadata_value(LAST_NOTIFICATION_KEY).is_none());
        assert_eq!(
            current.metadata_value(LAST_ACTIVITY_KEY),
            Some(warden_util::format_rfc3339(fresh).as_str())
        );
    }

    #[tokio::test]
    async fn stale_signal_never_moves_the_clock_backward() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "12h");
        let stored = rfc3339_ago(TimeDelta::hours(1));
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(20),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &stored),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        // Provider reports something older than the stored value
        h.activity
            .set_activity(instance.key.clone(), warden_util::now() - TimeDelta::hours(3));

        h.engine.evaluate(&instance.key).await.unwrap();

        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert_eq!(current.metadata_value(LAST_ACTIVITY_KEY), Some(stored.as_str()));
    }

    #[tokio::test]
    async fn warning_fires_once_then_rate_limits() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "4h");
        // 1 hour of inactivity left: inside the 3h30s warning window
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(3))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(outcome, Outcome::Requeue { warned: true, .. }));
        assert_eq!(h.notifier.sent().len(), 1);

        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert_eq!(current.metadata_value(ALERT_COUNT_KEY), Some("1"));
        assert!(current.metadata_value(LAST_NOTIFICATION_KEY).is_some());

        // Immediately re-evaluating stays within the notification interval
        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(outcome, Outcome::Requeue { warned: false, .. }));
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn warnings_stop_at_the_cap() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "4h");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "3"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(3))),
                (LAST_NOTIFICATION_KEY, &rfc3339_ago(TimeDelta::hours(2))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        // Interval elapsed, but the cap has been reached
        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(outcome, Outcome::Requeue { warned: false, .. }));
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_warning_delivery_fails_the_pass_without_advancing() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "4h");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(3))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        h.notifier.set_fail(true);
        let result = h.engine.evaluate(&instance.key).await;
        assert!(matches!(result, Err(WardenError::NotifyError(_))));

        // Counter untouched: the warning will be retried
        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert_eq!(current.metadata_value(ALERT_COUNT_KEY), Some("0"));
        assert!(current.metadata_value(LAST_NOTIFICATION_KEY).is_none());
    }

    #[tokio::test]
    async fn malformed_alert_counter_self_heals() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "4h");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "abc"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(3))),
                (LAST_NOTIFICATION_KEY, &rfc3339_ago(TimeDelta::minutes(5))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        // Counter healed to 0 and lastNotification cleared, so the first
        // warning of the fresh cycle fires
        assert!(matches!(outcome, Outcome::Requeue { warned: true, .. }));

        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert_eq!(current.metadata_value(ALERT_COUNT_KEY), Some("1"));
    }

    #[tokio::test]
    async fn malformed_activity_timestamp_fails_loud() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "4h");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(10),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, "three days ago"),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let result = h.engine.evaluate(&instance.key).await;
        assert!(matches!(result, Err(WardenError::MalformedState { .. })));

        // Fail-open: the instance was not terminated on guessed data
        assert!(h.store.get_instance(&instance.key).unwrap().is_some());
    }

    #[tokio::test]
    async fn reactivation_resets_the_escalation_state() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "never", "12h");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(30),
            true,
            &[
                (ALERT_COUNT_KEY, "2"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(24))),
                (LAST_NOTIFICATION_KEY, &rfc3339_ago(TimeDelta::hours(13))),
                (LAST_RUNNING_KEY, "false"),
            ],
        );

        // running = true while lastRunning records false: a restart
        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Requeue { warned: false, .. }
        ));

        let current = h.store.get_instance(&instance.key).unwrap().unwrap();
        assert_eq!(current.metadata_value(ALERT_COUNT_KEY), Some("0"));
        assert_eq!(current.metadata_value(LAST_RUNNING_KEY), Some("true"));
        assert!(current.metadata_value(LAST_NOTIFICATION_KEY).is_none());

        // The inactivity clock restarted, so the instance is far from due
        let fresh_activity =
            warden_util::parse_rfc3339(current.metadata_value(LAST_ACTIVITY_KEY).unwrap()).unwrap();
        assert!(warden_util::now().signed_duration_since(fresh_activity) < TimeDelta::minutes(1));
    }

    #[tokio::test]
    async fn expired_wins_ties_over_inactive() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "1m", "1m");
        let instance = seed_instance(
            h.store.as_ref(),
            "inst",
            TimeDelta::hours(2),
            false,
            &[
                (ALERT_COUNT_KEY, "0"),
                (LAST_ACTIVITY_KEY, &rfc3339_ago(TimeDelta::hours(2))),
                (LAST_RUNNING_KEY, "true"),
            ],
        );

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Terminated {
                reason: TerminationReason::Expired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn malformed_template_policy_fails_the_pass() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "1 week", "12h");
        let instance = seed_instance(h.store.as_ref(), "inst", TimeDelta::hours(1), false, &[]);

        let result = h.engine.evaluate(&instance.key).await;
        assert!(matches!(result, Err(WardenError::InvalidPolicyFormat(_))));
        assert!(h.store.get_instance(&instance.key).unwrap().is_some());
    }

    #[tokio::test]
    async fn requeue_hint_tracks_the_nearest_deadline() {
        let h = make_harness();
        seed_template(h.store.as_ref(), "30d", "never");
        let instance = seed_instance(h.store.as_ref(), "inst", TimeDelta::days(1), false, &[]);

        let outcome = h.engine.evaluate(&instance.key).await.unwrap();
        let Outcome::Requeue { after, .. } = outcome else {
            panic!("expected requeue, got {outcome:?}");
        };

        // 29 days remaining plus the 30s margin, far outside the warning
        // window; allow slack for test execution time
        let expected = Duration::from_secs(29 * 86400 + 30);
        assert!(after <= expected);
        assert!(after > expected - Duration::from_secs(60));
    }
}
