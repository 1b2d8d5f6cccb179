//! Long-lived active hub set
//!
//! Hubs are keyed by the USB2 half's port path. Each rebuild diffs the
//! freshly discovered hubs against the active set: vanished hubs are closed
//! and dropped, new hubs are added and opened, surviving hubs are refreshed
//! in place without touching their endpoint.

use super::instance::{HubInstance, SendOutcome};
use super::memory::CompanionMemory;
use super::pairing::DiscoveredHub;
use crate::endpoint::EndpointFactory;
use common::DriveInfo;
use std::collections::HashSet;
use tracing::{info, warn};

/// What a reconcile pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub refreshed: usize,
}

impl ReconcileReport {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Heartbeat tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub sent: usize,
    pub unavailable: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct ActiveHubs {
    hubs: Vec<HubInstance>,
}

impl ActiveHubs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HubInstance> {
        self.hubs.iter()
    }

    pub fn get(&self, path2: &str) -> Option<&HubInstance> {
        self.hubs.iter().find(|h| h.path2() == path2)
    }

    /// Merge a discovery result into the active set
    pub fn reconcile(
        &mut self,
        discovered: Vec<DiscoveredHub>,
        factory: &dyn EndpointFactory,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut seen = HashSet::new();
        let discovered: Vec<DiscoveredHub> = discovered
            .into_iter()
            .filter(|d| {
                let fresh = seen.insert(d.path2().to_string());
                if !fresh {
                    warn!("Hub port path {} reported twice, keeping the first", d.path2());
                }
                fresh
            })
            .collect();

        let present: HashSet<&str> = discovered.iter().map(DiscoveredHub::path2).collect();
        let mut kept = Vec::with_capacity(self.hubs.len());
        for mut hub in self.hubs.drain(..) {
            if present.contains(hub.path2()) {
                kept.push(hub);
            } else {
                hub.close();
                info!("Hub {} removed", hub.path2());
                report.removed.push(hub.path2().to_string());
            }
        }
        self.hubs = kept;

        for found in discovered {
            match self.hubs.iter_mut().find(|h| h.path2() == found.path2()) {
                Some(hub) => {
                    hub.refresh(found);
                    report.refreshed += 1;
                }
                None => {
                    let mut hub = HubInstance::new(found);
                    hub.open(factory);
                    info!(
                        "Hub {} added (companion {}, port '{}', live {})",
                        hub.path2(),
                        hub.path3().unwrap_or("none"),
                        hub.endpoint_name(),
                        hub.is_live()
                    );
                    report.added.push(hub.path2().to_string());
                    self.hubs.push(hub);
                }
            }
        }

        report
    }

    /// Record the current companion of every paired hub
    pub fn remember_companions(&self, memory: &mut CompanionMemory) {
        for hub in &self.hubs {
            if let Some(path3) = hub.path3() {
                memory.upsert(hub.path2(), path3);
            }
        }
    }

    pub fn update_occupancy(&mut self, drives: &[DriveInfo]) {
        for hub in &mut self.hubs {
            hub.update_occupancy(drives);
        }
    }

    /// Send every hub its current frame
    pub fn heartbeat(&mut self, factory: &dyn EndpointFactory) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        for hub in &mut self.hubs {
            match hub.send_frame(factory) {
                SendOutcome::Sent => report.sent += 1,
                SendOutcome::Unavailable => report.unavailable += 1,
                SendOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    /// Close every endpoint and empty the set
    pub fn drain(&mut self) -> usize {
        let count = self.hubs.len();
        for hub in &mut self.hubs {
            hub.close();
        }
        self.hubs.clear();
        count
    }
}
