//! Control surface for the service loop
//!
//! [`AgentHandle`] is what a status shell (the TUI, the service wrapper)
//! holds. Commands travel over the channel bridge; state the shell polls is
//! read from [`SharedStatus`] without touching the agent itself.

use crate::agent::{HubStatus, InsightAgent};
use crate::scheduler::{Service, Timing};
use common::{
    Error, HotplugSender, Result, ServiceBridge, ServiceCommand, create_service_bridge,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Summary a status shell shows for the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected(usize),
    Disconnected,
    Paused,
}

impl ConnectionState {
    pub fn new(running: bool, hubs: usize) -> Self {
        match (running, hubs) {
            (false, _) => ConnectionState::Paused,
            (true, 0) => ConnectionState::Disconnected,
            (true, n) => ConnectionState::Connected(n),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected(n) => write!(f, "Connected ({})", n),
            ConnectionState::Disconnected => f.write_str("Disconnected"),
            ConnectionState::Paused => f.write_str("Paused"),
        }
    }
}

/// State published by the service loop for the control surface
#[derive(Debug, Default)]
pub struct SharedStatus {
    updated: AtomicBool,
    running: AtomicBool,
    hub_count: AtomicUsize,
    rebuilds: AtomicU64,
    hubs: Mutex<Vec<HubStatus>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a rebuild and raise the updated flag
    pub fn publish(&self, hubs: Vec<HubStatus>) {
        self.hub_count.store(hubs.len(), Ordering::SeqCst);
        *self.hubs.lock().unwrap_or_else(PoisonError::into_inner) = hubs;
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        self.updated.store(true, Ordering::SeqCst);
    }

    /// Forget every hub after a stop and raise the updated flag
    pub fn clear(&self) {
        self.hub_count.store(0, Ordering::SeqCst);
        self.hubs.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.updated.store(true, Ordering::SeqCst);
    }

    /// Replace the per-hub view without raising the updated flag
    pub fn refresh_hubs(&self, hubs: Vec<HubStatus>) {
        *self.hubs.lock().unwrap_or_else(PoisonError::into_inner) = hubs;
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn acknowledge_update(&self) {
        self.updated.store(false, Ordering::SeqCst);
    }

    pub fn hub_count(&self) -> usize {
        self.hub_count.load(Ordering::SeqCst)
    }

    /// Number of rebuilds completed since the service was spawned
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub fn hubs(&self) -> Vec<HubStatus> {
        self.hubs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to a running service loop
#[derive(Clone)]
pub struct AgentHandle {
    bridge: ServiceBridge,
    status: Arc<SharedStatus>,
}

impl AgentHandle {
    /// Rebuild immediately, then arm the debounce and heartbeat timers
    pub async fn start(&self) -> Result<()> {
        self.request(|response| ServiceCommand::Start { response })
            .await
    }

    /// Close every hub endpoint, then disarm the timers
    pub async fn stop(&self) -> Result<()> {
        self.request(|response| ServiceCommand::Stop { response })
            .await
    }

    /// Stop and end the service loop
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|response| ServiceCommand::Shutdown { response })
            .await
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<()>) -> ServiceCommand,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.bridge.send_command(command(tx)).await?;
        rx.await
            .map_err(|e| Error::Channel(format!("service loop dropped request: {}", e)))
    }

    /// True once a rebuild has finished since the last acknowledgement
    pub fn is_updated(&self) -> bool {
        self.status.is_updated()
    }

    pub fn acknowledge_update(&self) {
        self.status.acknowledge_update();
    }

    pub fn connected_hub_count(&self) -> usize {
        self.status.hub_count()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn hubs(&self) -> Vec<HubStatus> {
        self.status.hubs()
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::new(self.is_running(), self.connected_hub_count())
    }

    pub fn status(&self) -> &Arc<SharedStatus> {
        &self.status
    }

    /// Sender for a hot-plug source
    pub fn hotplug_sender(&self) -> HotplugSender {
        self.bridge.hotplug_sender()
    }
}

/// Spawn the service loop on the current tokio runtime
///
/// The loop starts idle; call [`AgentHandle::start`] to run the first rebuild.
pub fn spawn_service(agent: InsightAgent, timing: Timing) -> (AgentHandle, JoinHandle<()>) {
    let (bridge, worker) = create_service_bridge();
    let status = Arc::new(SharedStatus::new());
    let service = Service::new(agent, worker, status.clone(), timing);
    let task = tokio::spawn(service.run());
    (AgentHandle { bridge, status }, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_raises_updated() {
        let status = SharedStatus::new();
        assert!(!status.is_updated());

        status.publish(Vec::new());
        assert!(status.is_updated());
        assert_eq!(status.rebuild_count(), 1);

        status.acknowledge_update();
        assert!(!status.is_updated());

        status.refresh_hubs(Vec::new());
        assert!(!status.is_updated());
    }

    #[test]
    fn test_connection_state_labels() {
        assert_eq!(ConnectionState::new(true, 0).to_string(), "Disconnected");
        assert_eq!(ConnectionState::new(true, 2).to_string(), "Connected (2)");
        assert_eq!(ConnectionState::new(false, 2).to_string(), "Paused");
    }
}
