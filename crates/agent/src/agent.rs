//! Agent state and the rebuild/heartbeat cycles
//!
//! [`InsightAgent`] owns everything that survives between cycles: the active
//! hub set and the companion memory. A rebuild has two halves: the
//! [`Discoverer`] queries the directory and pairs hubs, then
//! [`InsightAgent::apply`] merges the result. The service loop runs the first
//! half without holding the agent; `--list` calls [`InsightAgent::rebuild`].

use crate::directory::DeviceDirectory;
use crate::endpoint::EndpointFactory;
use crate::hub::{
    ActiveHubs, CompanionMemory, DiscoveredHub, HardwareIds, HeartbeatReport, HubInstance,
    ReconcileReport, discover_hubs,
};
use crate::topology::{DeviceTree, build_topology};
use common::DirectorySnapshot;
use protocol::PortOccupancy;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of one rebuild cycle
#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub devices: usize,
    pub hubs: usize,
    pub changes: ReconcileReport,
    pub duration: Duration,
}

/// Display-ready view of one active hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStatus {
    pub path2: String,
    pub path3: Option<String>,
    pub endpoint: String,
    pub live: bool,
    pub occupancy: PortOccupancy,
}

impl From<&HubInstance> for HubStatus {
    fn from(hub: &HubInstance) -> Self {
        Self {
            path2: hub.path2().to_string(),
            path3: hub.path3().map(str::to_string),
            endpoint: hub.endpoint_name().to_string(),
            live: hub.is_live(),
            occupancy: hub.occupancy().clone(),
        }
    }
}

/// Directory side of a rebuild
///
/// Needs nothing from the active set, so the service runs it without holding
/// the agent.
#[derive(Clone)]
pub struct Discoverer {
    directory: Arc<dyn DeviceDirectory>,
    ids: HardwareIds,
}

/// Hubs found by one directory query, ready to merge into the active set
pub struct Discovery {
    snapshot: DirectorySnapshot,
    tree: DeviceTree,
    hubs: Vec<DiscoveredHub>,
    started: Instant,
}

impl Discoverer {
    pub fn new(directory: Arc<dyn DeviceDirectory>, ids: HardwareIds) -> Self {
        Self { directory, ids }
    }

    /// Query the directory and pair the hubs found, consulting `memory`
    pub fn discover(&self, memory: &CompanionMemory) -> Discovery {
        let started = Instant::now();

        let snapshot = self.directory.snapshot();
        let tree = build_topology(&snapshot.devices);
        debug!("USB device tree:\n{}", tree.render());

        let hubs = discover_hubs(&tree, &self.ids, memory);
        for hub in &hubs {
            debug!(
                "Insight Hub at {} (companion {}, port '{}')",
                hub.path2(),
                hub.path3().unwrap_or("none"),
                hub.endpoint_name
            );
        }

        Discovery {
            snapshot,
            tree,
            hubs,
            started,
        }
    }
}

pub struct InsightAgent {
    discoverer: Discoverer,
    endpoints: Arc<dyn EndpointFactory>,
    active: ActiveHubs,
    memory: CompanionMemory,
    last_tree: DeviceTree,
}

impl InsightAgent {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        endpoints: Arc<dyn EndpointFactory>,
        ids: HardwareIds,
    ) -> Self {
        Self {
            discoverer: Discoverer::new(directory, ids),
            endpoints,
            active: ActiveHubs::new(),
            memory: CompanionMemory::new(),
            last_tree: DeviceTree::default(),
        }
    }

    pub fn discoverer(&self) -> Discoverer {
        self.discoverer.clone()
    }

    /// Query the directory and bring the active set up to date
    pub fn rebuild(&mut self) -> RebuildSummary {
        let discovery = self.discoverer.discover(&self.memory);
        self.apply(discovery)
    }

    /// Merge a discovery into the active set, then reclassify every port
    pub fn apply(&mut self, discovery: Discovery) -> RebuildSummary {
        let Discovery {
            snapshot,
            tree,
            hubs: discovered,
            started,
        } = discovery;
        let hubs = discovered.len();

        let changes = self.active.reconcile(discovered, self.endpoints.as_ref());
        self.active.remember_companions(&mut self.memory);
        self.active.update_occupancy(&snapshot.drives);
        self.last_tree = tree;

        for hub in self.active.iter() {
            info!(
                "Active hub [{}][{}][{}][{}]",
                hub.path2(),
                hub.path3().unwrap_or_default(),
                hub.is_live(),
                hub.endpoint_name()
            );
            for (port, devices) in hub.occupancy().iter() {
                let labels: Vec<String> = devices
                    .iter()
                    .map(|d| format!("[{}-USB{}]", d.short_name, d.generation))
                    .collect();
                debug!("  Port {}: {}", port, labels.concat());
            }
        }
        for (path2, path3) in self.memory.iter() {
            debug!("Companion memory [{}][{}]", path2, path3);
        }

        let duration = started.elapsed();
        info!(
            "Rebuild finished in {} ms: {} devices, {} hubs (+{} -{})",
            duration.as_millis(),
            snapshot.devices.len(),
            self.active.len(),
            changes.added.len(),
            changes.removed.len()
        );

        RebuildSummary {
            devices: snapshot.devices.len(),
            hubs,
            changes,
            duration,
        }
    }

    /// Send every active hub its current frame
    pub fn heartbeat(&mut self) -> HeartbeatReport {
        let report = self.active.heartbeat(self.endpoints.as_ref());
        if report.failed > 0 || report.unavailable > 0 {
            debug!(
                "Heartbeat: {} sent, {} unavailable, {} failed",
                report.sent, report.unavailable, report.failed
            );
        }
        report
    }

    /// Close every endpoint and forget the active set; memory is kept
    pub fn stop(&mut self) -> usize {
        let closed = self.active.drain();
        info!("Closed {} hub endpoints", closed);
        closed
    }

    pub fn hub_count(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self) -> &ActiveHubs {
        &self.active
    }

    pub fn memory(&self) -> &CompanionMemory {
        &self.memory
    }

    /// Tree built by the last rebuild
    pub fn last_tree(&self) -> &DeviceTree {
        &self.last_tree
    }

    pub fn hub_statuses(&self) -> Vec<HubStatus> {
        self.active.iter().map(HubStatus::from).collect()
    }
}

impl Drop for InsightAgent {
    fn drop(&mut self) {
        self.active.drain();
    }
}
