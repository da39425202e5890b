//! Sync scheduling
//!
//! Cycles are driven by a fixed interval and by connectivity coming back.
//! Both feed one loop per engine, so cycles of the same engine never
//! overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;
use crate::error::{Result, SyncError};

/// Observable network availability
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Keep `connectivity` in step with whether the host of `base_url` accepts
/// TCP connections, checking every `period` until `stop` fires.
///
/// Fails only if `base_url` names no host and port.
pub async fn monitor_reachability(
    connectivity: Connectivity,
    base_url: &str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let address = endpoint_address(base_url)?;
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let reachable = matches!(
            tokio::time::timeout(period, TcpStream::connect(&address)).await,
            Ok(Ok(_))
        );
        if reachable != connectivity.is_online() {
            if reachable {
                info!(address = %address, "Sync endpoint reachable");
            } else {
                warn!(address = %address, "Sync endpoint unreachable, pausing sync");
            }
        }
        connectivity.set_online(reachable);
    }

    debug!("Reachability monitor finished");
    Ok(())
}

/// `host:port` of an HTTP(S) base URL, with the scheme's default port
fn endpoint_address(base_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| SyncError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| SyncError::InvalidEndpoint(format!("{}: no host", base_url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SyncError::InvalidEndpoint(format!("{}: no port", base_url)))?;

    Ok(format!("{}:{}", host, port))
}

/// Drive `engine` until `stop` fires.
///
/// The first interval tick completes immediately, which gives the initial
/// cycle. A tick while offline is skipped; an offline-to-online transition
/// runs a cycle straight away.
pub(crate) async fn run_schedule(
    engine: Arc<SyncEngine>,
    period: Duration,
    mut online: watch::Receiver<bool>,
    mut stop: watch::Receiver<bool>,
) {
    // tokio panics on a zero period
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut was_online = *online.borrow_and_update();
    let mut watching_online = true;

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            changed = online.changed(), if watching_online => {
                if changed.is_err() {
                    watching_online = false;
                    continue;
                }
                let now_online = *online.borrow_and_update();
                let regained = now_online && !was_online;
                was_online = now_online;
                if !regained {
                    continue;
                }
                info!("Connectivity regained, syncing");
            }

            _ = ticker.tick() => {
                if !*online.borrow() {
                    debug!("Offline, skipping scheduled sync");
                    continue;
                }
            }
        }

        if engine.is_stopped() {
            break;
        }
        engine.sync_once().await;
    }

    debug!("Sync schedule finished");
}
