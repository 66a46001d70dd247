//! Gateway connection management.
//!
//! One live connection per enabled app, reconciled against storage on a
//! fixed tick. Connections are produced by a [`GatewayConnector`] and push
//! `(app_id, event)` pairs into the engine's event channel; the manager
//! only cares that a connection exists, is alive, and reflects the latest
//! app row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::model::GatewayEvent;
use crate::store::{App, AppStore, StoreError};

pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Delay between consecutive connection opens in one reconcile pass, so a
/// cold start doesn't burst-identify hundreds of bots at once.
pub const CONNECT_STAGGER: Duration = Duration::from_millis(100);

pub type EventSender = flume::Sender<(String, GatewayEvent)>;

#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    #[error("gateway connect failed: {0}")]
    #[diagnostic(code(flowcord::gateway::connect))]
    Connect(String),

    #[error(transparent)]
    #[diagnostic(code(flowcord::gateway::store))]
    Store(#[from] StoreError),
}

/// Opens gateway connections. The production implementation wraps a real
/// Discord gateway client; tests hand out recording fakes.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(
        &self,
        app: App,
        events: EventSender,
    ) -> Result<Box<dyn GatewayHandle>, GatewayError>;
}

/// A live connection. `update_app` lets the manager propagate token or
/// settings changes without a reconnect; a handle that reports dead gets
/// dropped and recreated on the next tick.
#[async_trait]
pub trait GatewayHandle: Send + Sync {
    fn is_alive(&self) -> bool;
    fn update_app(&self, app: App);
    async fn close(&self);
}

pub struct GatewayManager {
    apps: Arc<dyn AppStore>,
    connector: Arc<dyn GatewayConnector>,
    events: EventSender,
    gateways: Mutex<FxHashMap<String, Box<dyn GatewayHandle>>>,
    last_update: Mutex<DateTime<Utc>>,
}

impl GatewayManager {
    pub fn new(
        apps: Arc<dyn AppStore>,
        connector: Arc<dyn GatewayConnector>,
        events: EventSender,
    ) -> Self {
        GatewayManager {
            apps,
            connector,
            events,
            gateways: Mutex::new(FxHashMap::default()),
            last_update: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(RECONCILE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.reconcile().await {
                tracing::error!(error = %err, "gateway reconcile failed");
            }
        }
    }

    /// One reconcile pass: drop gateways for disabled apps, refresh or
    /// recreate gateways for apps updated since the previous pass.
    pub async fn reconcile(&self) -> Result<(), GatewayError> {
        // Snapshot-then-stamp so an update racing the query is retried on
        // the next pass instead of lost.
        let since = {
            let mut last_update = self.last_update.lock();
            std::mem::replace(&mut *last_update, Utc::now())
        };

        let enabled = self.apps.enabled_app_ids().await?;

        let dangling: Vec<Box<dyn GatewayHandle>> = {
            let mut gateways = self.gateways.lock();
            let keep: std::collections::HashSet<&String> = enabled.iter().collect();
            let dropped: Vec<String> = gateways
                .keys()
                .filter(|id| !keep.contains(id))
                .cloned()
                .collect();
            dropped
                .into_iter()
                .filter_map(|id| {
                    tracing::info!(app_id = %id, "closing gateway for disabled app");
                    gateways.remove(&id)
                })
                .collect()
        };
        for handle in dangling {
            handle.close().await;
        }

        let mut first_connect = true;
        for app in self.apps.enabled_apps_updated_since(since).await? {
            let app_id = app.id.clone();
            let reusable = {
                let gateways = self.gateways.lock();
                gateways.get(&app_id).is_some_and(|g| g.is_alive())
            };
            if reusable {
                self.gateways.lock()[&app_id].update_app(app);
                continue;
            }

            if !first_connect {
                tokio::time::sleep(CONNECT_STAGGER).await;
            }
            first_connect = false;

            match self.connector.connect(app, self.events.clone()).await {
                Ok(handle) => {
                    tracing::info!(app_id = %app_id, "gateway connected");
                    if let Some(old) = self.gateways.lock().insert(app_id, handle) {
                        old.close().await;
                    }
                }
                Err(err) => {
                    tracing::warn!(app_id = %app_id, error = %err, "gateway connect failed");
                }
            }
        }
        Ok(())
    }

    pub fn gateway_count(&self) -> usize {
        self.gateways.lock().len()
    }
}
