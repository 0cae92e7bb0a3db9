//! Alert correlation and dispatch
//!
//! Every alert is written to the durable log. Whether it also reaches the
//! notification channels depends on two things:
//!
//! 1. **Topology**: a target going offline while one of its ancestors
//!    (parent device, owning tower, that tower's parent tower) is already
//!    offline is recorded as suppressed. The ancestor's own alert explains it.
//! 2. **Muting**: operators can mute dispatch for a while, e.g. during
//!    maintenance. Muted alerts are recorded as suppressed too.
//!
//! Dispatch is fire-and-forget: each channel delivery runs in its own task
//! and a failing channel only logs.

pub mod template;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::channels::{ChannelRoute, routes_from_settings};
use crate::config::AlertSettings;
use crate::registry::{Registry, Snapshot};
use crate::storage::StorageBackend;
use crate::{
    Alert, AlertKind, DeviceStatus, MonitoredTarget, StatusTransition, SyntheticTarget, TargetKey,
    TargetKind,
};

use template::{DEFAULT_DOWN_TEMPLATE, DEFAULT_UP_TEMPLATE, TemplateContext, render_or};

/// Something that may deserve a human's attention
#[derive(Debug, Clone)]
pub enum AlertEvent {
    StatusChanged(StatusTransition),
    Threshold {
        target: MonitoredTarget,
        kind: AlertKind,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Anomaly {
        target: SyntheticTarget,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Capacity {
        target: MonitoredTarget,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// First ancestor of `target` that is currently offline
pub fn offline_ancestor(
    target: &MonitoredTarget,
    snapshot: &Snapshot,
    status: impl Fn(&TargetKey) -> DeviceStatus,
) -> Option<TargetKey> {
    let owning_tower = target.parent_tower_id.map(TargetKey::tower);
    let grand_tower = owning_tower
        .and_then(|tower| snapshot.get(&tower))
        .and_then(|tower| tower.parent_tower_id)
        .map(TargetKey::tower);

    [
        target.parent_device_id.map(TargetKey::device),
        owning_tower,
        grand_tower,
    ]
    .into_iter()
    .flatten()
    .filter(|ancestor| *ancestor != target.key)
    .find(|ancestor| status(ancestor) == DeviceStatus::Offline)
}

/// Result of handling one event
#[derive(Debug)]
pub struct Handled {
    pub alert: Alert,
    /// One task per channel delivery; dropping them detaches the deliveries
    pub deliveries: Vec<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub recorded: u64,
    pub dispatched: u64,
    pub suppressed: u64,
}

#[derive(Clone)]
pub struct Correlator {
    store: Arc<dyn StorageBackend>,
    registry: Registry,
    client: reqwest::Client,
    fixed_routes: Option<Vec<ChannelRoute>>,
    muted_until: Option<DateTime<Utc>>,
    stats: CorrelatorStats,
}

impl Correlator {
    pub fn new(store: Arc<dyn StorageBackend>, registry: Registry) -> Self {
        Self {
            store,
            registry,
            client: reqwest::Client::new(),
            fixed_routes: None,
            muted_until: None,
            stats: CorrelatorStats::default(),
        }
    }

    /// Deliver to these routes instead of the ones configured in settings
    pub fn with_routes(mut self, routes: Vec<ChannelRoute>) -> Self {
        self.fixed_routes = Some(routes);
        self
    }

    pub fn mute_until(&mut self, until: DateTime<Utc>) {
        info!("alert dispatch muted until {until}");
        self.muted_until = Some(until);
    }

    pub fn unmute(&mut self) {
        self.muted_until = None;
    }

    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| now < until)
    }

    pub fn muted_until(&self) -> Option<DateTime<Utc>> {
        self.muted_until
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    /// Turn an event into an alert record, or `None` if it is not alert-worthy
    pub fn build_alert(event: &AlertEvent, settings: &AlertSettings) -> Option<Alert> {
        match event {
            AlertEvent::StatusChanged(transition) => {
                let (kind, configured, fallback) =
                    match (transition.old_status, transition.new_status) {
                        (_, DeviceStatus::Offline) => (
                            AlertKind::Down,
                            settings.template_down.as_deref(),
                            DEFAULT_DOWN_TEMPLATE,
                        ),
                        (DeviceStatus::Offline, DeviceStatus::Online) => (
                            AlertKind::Recovered,
                            settings.template_up.as_deref(),
                            DEFAULT_UP_TEMPLATE,
                        ),
                        _ => return None,
                    };

                let target = &transition.target;
                let name = target.display_name();
                let message = render_or(
                    configured,
                    fallback,
                    &TemplateContext {
                        name: &name,
                        ip: &target.address,
                        kind: target.key.kind.as_str(),
                        status: transition.new_status.as_str(),
                        timestamp: transition.timestamp,
                    },
                );

                Some(Alert {
                    device_kind: target.key.kind,
                    device_name: name,
                    address: target.address.clone(),
                    kind,
                    message,
                    timestamp: transition.timestamp,
                    suppressed: false,
                })
            }
            AlertEvent::Threshold {
                target,
                kind,
                message,
                timestamp,
            } => Some(Alert {
                device_kind: target.key.kind,
                device_name: target.display_name(),
                address: target.address.clone(),
                kind: *kind,
                message: message.clone(),
                timestamp: *timestamp,
                suppressed: false,
            }),
            AlertEvent::Anomaly {
                target,
                message,
                timestamp,
            } => Some(Alert {
                device_kind: TargetKind::Synthetic,
                device_name: target.name.clone(),
                address: target.address.clone(),
                kind: AlertKind::LatencyAnomaly,
                message: message.clone(),
                timestamp: *timestamp,
                suppressed: false,
            }),
            AlertEvent::Capacity {
                target,
                message,
                timestamp,
            } => Some(Alert {
                device_kind: target.key.kind,
                device_name: target.display_name(),
                address: target.address.clone(),
                kind: AlertKind::Capacity,
                message: message.clone(),
                timestamp: *timestamp,
                suppressed: false,
            }),
        }
    }

    /// Record the event and dispatch it unless suppressed
    #[instrument(skip_all)]
    pub async fn handle(&mut self, event: AlertEvent) -> Option<Handled> {
        let settings = self.registry.settings();
        let mut alert = Self::build_alert(&event, &settings.alerts)?;

        if let AlertEvent::StatusChanged(transition) = &event
            && transition.new_status == DeviceStatus::Offline
        {
            let snapshot = self.registry.snapshot();
            if let Some(ancestor) =
                offline_ancestor(&transition.target, &snapshot, |key| self.registry.status(key))
            {
                info!(
                    "suppressing down alert for {}: {ancestor} is already offline",
                    transition.target.key
                );
                alert.suppressed = true;
            }
        }

        if self.is_muted(Utc::now()) {
            debug!("alerts muted, recording {} without dispatch", alert.kind);
            alert.suppressed = true;
        }

        if let Err(e) = self.store.insert_alert(&alert).await {
            error!("failed to record alert for {}: {e}", alert.device_name);
        }
        self.stats.recorded += 1;

        let deliveries = if alert.suppressed {
            self.stats.suppressed += 1;
            Vec::new()
        } else {
            self.stats.dispatched += 1;
            self.dispatch(&alert, &settings.alerts)
        };

        Some(Handled { alert, deliveries })
    }

    fn dispatch(&self, alert: &Alert, settings: &AlertSettings) -> Vec<JoinHandle<()>> {
        let routes = match &self.fixed_routes {
            Some(routes) => routes.clone(),
            None => routes_from_settings(settings, &self.client),
        };

        if routes.is_empty() {
            debug!("no notification channels enabled");
        }

        routes
            .into_iter()
            .map(|route| {
                let alert = alert.clone();
                tokio::spawn(async move {
                    if let Err(e) = route.channel.send(&route.destination, &alert).await {
                        warn!(
                            "{} delivery for {} failed: {e}",
                            route.channel.name(),
                            alert.device_name
                        );
                    }
                })
            })
            .collect()
    }
}
