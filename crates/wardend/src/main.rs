//! wardend - the warden background service
//!
//! This is the main entry point for the wardend service.
//! It wires together all the components:
//! - Settings loading
//! - Store initialization
//! - Activity metrics client
//! - Notification delivery
//! - The lifecycle engine and its reconcile scheduling loop
//!
//! The loop is a minimal at-least-once scheduler: every instance is
//! evaluated when its next-check hint comes due, and the hints themselves
//! are only an optimization. All timer state lives on the instances, so a
//! restarted daemon picks up exactly where it left off.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_activity::HttpActivitySource;
use warden_config::{load_settings, Settings};
use warden_core::{LifecycleEngine, LogNotifier, Notifier, Outcome, WebhookNotifier};
use warden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use warden_util::InstanceKey;

/// Re-resolve policy for quiet instances at least this often, so template
/// edits take effect without waiting out a multi-day requeue hint.
const MAX_REQUEUE: Duration = Duration::from_secs(3600);

/// wardend - Lifecycle policy enforcement for ephemeral compute instances
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(about = "Lifecycle policy enforcement for ephemeral compute instances", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/wardend/config.toml")]
    config: PathBuf,

    /// Data directory override (or set WARDEN_DATA_DIR env var)
    #[arg(short, long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    engine: LifecycleEngine,
    store: Arc<dyn Store>,
    settings: Settings,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        // Load settings
        let settings = load_settings(&args.config)
            .with_context(|| format!("Failed to load settings from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            reconcile_interval_secs = settings.daemon.reconcile_interval.as_secs(),
            "Settings loaded"
        );

        // Determine data directory
        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = data_dir.join("wardend.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // Log service start
        store.append_audit(AuditEvent::new(AuditEventType::DaemonStarted))?;

        // Activity metrics client
        let activity = HttpActivitySource::new(
            settings.activity.base_url.clone(),
            settings.activity.channels.clone(),
            settings.activity.request_timeout,
        )
        .context("Failed to build activity metrics client")?;

        info!(
            base_url = %settings.activity.base_url,
            channels = ?settings.activity.channels,
            "Activity metrics client initialized"
        );

        // Notification delivery
        let notifier: Arc<dyn Notifier> = match &settings.notifications.webhook_url {
            Some(url) => {
                info!(webhook_url = %url, "Webhook notifier initialized");
                Arc::new(
                    WebhookNotifier::new(url.clone(), settings.activity.request_timeout)
                        .context("Failed to build webhook notifier")?,
                )
            }
            None => {
                warn!("No webhook configured, notifications are log-only");
                Arc::new(LogNotifier)
            }
        };

        // Lifecycle engine
        let engine = LifecycleEngine::new(store.clone(), Arc::new(activity), notifier, &settings);

        Ok(Self {
            engine,
            store,
            settings,
        })
    }

    async fn run(self) -> Result<()> {
        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        // Per-instance next-check deadlines, rebuilt as evaluations return
        // requeue hints. Purely an optimization: losing this map only means
        // instances are evaluated again sooner.
        let mut next_check: HashMap<InstanceKey, Instant> = HashMap::new();

        let mut ticker = tokio::time::interval(self.settings.daemon.reconcile_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // Tick timer - evaluate instances whose next check is due
                _ = ticker.tick() => {
                    self.reconcile_due(&mut next_check).await;
                }
            }
        }

        // Log shutdown
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::DaemonStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// One scheduler tick: evaluate every instance whose deadline passed.
    async fn reconcile_due(&self, next_check: &mut HashMap<InstanceKey, Instant>) {
        let instances = match self.store.list_instances() {
            Ok(instances) => instances,
            Err(e) => {
                error!(error = %e, "Failed listing instances");
                return;
            }
        };

        // Forget deadlines of instances that no longer exist
        next_check.retain(|key, _| instances.iter().any(|i| &i.key == key));

        let now = Instant::now();

        for instance in instances {
            if let Some(due) = next_check.get(&instance.key)
                && *due > now
            {
                continue;
            }

            match self.engine.evaluate(&instance.key).await {
                Ok(Outcome::Gone) | Ok(Outcome::Terminated { .. }) => {
                    next_check.remove(&instance.key);
                }
                Ok(Outcome::Unmanaged) => {
                    // Nothing to enforce; look again next interval in case
                    // the template changed
                    next_check.insert(
                        instance.key.clone(),
                        now + self.settings.daemon.reconcile_interval,
                    );
                }
                Ok(Outcome::Requeue { after, .. }) => {
                    next_check.insert(instance.key.clone(), now + after.min(MAX_REQUEUE));
                }
                Err(e) => {
                    error!(
                        instance = %instance.key,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Evaluation failed"
                    );
                    let _ = self.store.append_audit(AuditEvent::new(
                        AuditEventType::EvaluationFailed {
                            instance: instance.key.clone(),
                            error: e.to_string(),
                        },
                    ));
                    next_check.insert(
                        instance.key.clone(),
                        now + self.settings.daemon.reconcile_interval,
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");

    // Create and run the service
    let service = Service::new(&args)?;
    service.run().await
}
