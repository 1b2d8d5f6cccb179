//! Insight Hub tracking
//!
//! This module turns a device forest into tracked hubs:
//! - [`recognition`]: identifying the USB2/USB3 halves and the controller port
//! - [`pairing`]: binding each USB2 half to its USB3 companion
//! - [`memory`]: pairings remembered across rebuilds
//! - [`reconciler`]: the long-lived active set
//! - [`classifier`]: per-port device labels

pub mod classifier;
pub mod ids;
pub mod instance;
pub mod memory;
pub mod pairing;
pub mod reconciler;
pub mod recognition;

pub use classifier::classify_ports;
pub use ids::{HardwareIds, UsbIds};
pub use instance::{HubInstance, SendOutcome};
pub use memory::CompanionMemory;
pub use pairing::{DiscoveredHub, discover_hubs, pair_companions};
pub use reconciler::{ActiveHubs, HeartbeatReport, ReconcileReport};
pub use recognition::{path_head, serial_port_token};
