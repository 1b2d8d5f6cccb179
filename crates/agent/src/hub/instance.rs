//! One tracked Insight Hub and its controller endpoint

use super::classifier::classify_ports;
use super::pairing::DiscoveredHub;
use crate::endpoint::{Endpoint, EndpointFactory};
use crate::topology::DeviceTree;
use common::DriveInfo;
use protocol::{ControllerReply, Frame, PortOccupancy};
use tracing::{debug, trace, warn};

/// Result of one frame send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame written
    Sent,
    /// No endpoint could be opened
    Unavailable,
    /// Endpoint failed during the exchange and was closed
    Failed,
}

/// An active hub: the USB2 subtree, its companion and the controller link
pub struct HubInstance {
    hub2: DeviceTree,
    companion: Option<DeviceTree>,
    endpoint_name: String,
    endpoint: Option<Box<dyn Endpoint>>,
    live: bool,
    occupancy: PortOccupancy,
}

impl HubInstance {
    pub fn new(discovered: DiscoveredHub) -> Self {
        Self {
            hub2: discovered.hub2,
            companion: discovered.companion,
            endpoint_name: discovered.endpoint_name,
            endpoint: None,
            live: false,
            occupancy: PortOccupancy::new(),
        }
    }

    pub fn path2(&self) -> &str {
        self.hub2
            .root_node()
            .map(|n| n.port_path.as_str())
            .unwrap_or_default()
    }

    pub fn path3(&self) -> Option<&str> {
        self.companion
            .as_ref()
            .and_then(DeviceTree::root_node)
            .map(|n| n.port_path.as_str())
    }

    pub fn hub2(&self) -> &DeviceTree {
        &self.hub2
    }

    pub fn companion(&self) -> Option<&DeviceTree> {
        self.companion.as_ref()
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn occupancy(&self) -> &PortOccupancy {
        &self.occupancy
    }

    /// Open the controller endpoint; failure leaves the hub not live
    pub fn open(&mut self, factory: &dyn EndpointFactory) -> bool {
        self.close();
        if self.endpoint_name.is_empty() {
            debug!("Hub {} exposes no serial port", self.path2());
            return false;
        }

        match factory.open(&self.endpoint_name) {
            Ok(endpoint) => {
                debug!("Hub {} connected on {}", self.path2(), self.endpoint_name);
                self.endpoint = Some(endpoint);
                self.live = true;
            }
            Err(e) => {
                warn!("Hub {}: cannot open {}: {}", self.path2(), self.endpoint_name, e);
            }
        }
        self.live
    }

    /// Release the endpoint
    pub fn close(&mut self) {
        if self.endpoint.take().is_some() {
            debug!("Hub {} closed {}", self.path2(), self.endpoint_name);
        }
        self.live = false;
    }

    /// Take the freshly discovered subtrees, keeping the endpoint
    ///
    /// If the controller now reports a different serial port the old endpoint
    /// is closed so the next send reopens on the new name.
    pub fn refresh(&mut self, discovered: DiscoveredHub) {
        self.hub2 = discovered.hub2;
        self.companion = discovered.companion;
        if discovered.endpoint_name != self.endpoint_name {
            self.close();
            self.endpoint_name = discovered.endpoint_name;
        }
    }

    /// Reclassify the ports from the current subtrees
    pub fn update_occupancy(&mut self, drives: &[DriveInfo]) {
        self.occupancy = classify_ports(&self.hub2, self.companion.as_ref(), drives);
    }

    pub fn frame(&self) -> Frame {
        Frame::from_occupancy(&self.occupancy)
    }

    /// Send the current frame, reopening the endpoint first if needed
    ///
    /// One reply line is read and only logged; a read timeout is tolerated.
    pub fn send_frame(&mut self, factory: &dyn EndpointFactory) -> SendOutcome {
        if !self.live && !self.open(factory) {
            return SendOutcome::Unavailable;
        }
        let line = self.frame().to_string();
        let path = self.path2().to_string();

        let Some(endpoint) = self.endpoint.as_mut() else {
            self.live = false;
            return SendOutcome::Unavailable;
        };

        if let Err(e) = endpoint.write_line(&line) {
            warn!("Hub {}: write to {} failed: {}", path, self.endpoint_name, e);
            self.close();
            return SendOutcome::Failed;
        }
        trace!("Hub {} <- {}", path, line);

        match endpoint.read_line() {
            Ok(Some(reply)) => match ControllerReply::parse(&reply) {
                Ok(r) if r.is_ok() => trace!("Hub {} -> ok", path),
                Ok(r) => debug!(
                    "Hub {} -> error {:?}: {}",
                    path,
                    r.error_code(),
                    r.message().unwrap_or_default()
                ),
                Err(e) => trace!("Hub {} -> unparsed reply '{}': {}", path, reply, e),
            },
            Ok(None) => trace!("Hub {}: no reply", path),
            Err(e) => {
                warn!("Hub {}: read from {} failed: {}", path, self.endpoint_name, e);
                self.close();
                return SendOutcome::Failed;
            }
        }

        SendOutcome::Sent
    }
}

impl Drop for HubInstance {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RecordingEndpointFactory;
    use crate::hub::{CompanionMemory, HardwareIds, discover_hubs};
    use crate::topology::build_topology;
    use common::test_utils::SnapshotBuilder;
    use protocol::TURN_OFF_FRAME;

    fn hub_with(com: &str) -> HubInstance {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        builder.add_insight_hub(&host, "1", "15", com);
        let tree = build_topology(&builder.build().devices);
        let mut hubs = discover_hubs(&tree, &HardwareIds::default(), &CompanionMemory::new());
        HubInstance::new(hubs.remove(0))
    }

    #[test]
    fn test_send_opens_lazily_and_writes_frame() {
        let factory = RecordingEndpointFactory::new();
        let mut hub = hub_with("COM5");
        assert!(!hub.is_live());

        assert_eq!(hub.send_frame(&factory), SendOutcome::Sent);
        assert!(hub.is_live());
        assert_eq!(factory.lines("COM5"), vec![TURN_OFF_FRAME]);
    }

    #[test]
    fn test_write_failure_closes_then_recovers() {
        let factory = RecordingEndpointFactory::new();
        let mut hub = hub_with("COM5");
        assert!(hub.open(&factory));

        factory.set_fail_writes(true);
        assert_eq!(hub.send_frame(&factory), SendOutcome::Failed);
        assert!(!hub.is_live());
        assert_eq!(factory.live_count(), 0);

        factory.set_fail_writes(false);
        assert_eq!(hub.send_frame(&factory), SendOutcome::Sent);
        assert_eq!(factory.open_count(), 2);
    }

    #[test]
    fn test_unavailable_port() {
        let factory = RecordingEndpointFactory::new();
        factory.set_unavailable("COM5", true);
        let mut hub = hub_with("COM5");

        assert!(!hub.open(&factory));
        assert_eq!(hub.send_frame(&factory), SendOutcome::Unavailable);
    }

    #[test]
    fn test_drop_closes_endpoint() {
        let factory = RecordingEndpointFactory::new();
        let mut hub = hub_with("COM5");
        hub.open(&factory);
        drop(hub);
        assert_eq!(factory.close_count(), 1);
    }
}
