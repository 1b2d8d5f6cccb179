//! USB Insight Hub agent
//!
//! Watches the host's USB device tree, recognises Insight Hub units, works out
//! what is plugged into each downstream port and keeps each hub's display
//! controller updated over its serial port.
//!
//! - [`directory`]: device directory adapters (sysfs, snapshots)
//! - [`topology`]: device forest, port paths and subtree extraction
//! - [`hub`]: hub recognition, pairing, the active set and port labels
//! - [`endpoint`]: serial endpoints
//! - [`agent`]: one rebuild/heartbeat cycle
//! - [`scheduler`] and [`handle`]: the service loop and its control surface
//! - [`hotplug`]: hardware change notifications

pub mod agent;
pub mod config;
pub mod directory;
pub mod endpoint;
pub mod handle;
pub mod hotplug;
pub mod hub;
pub mod scheduler;
pub mod systemd;
pub mod topology;
pub mod tui;

pub use agent::{Discoverer, Discovery, HubStatus, InsightAgent, RebuildSummary};
pub use config::AgentConfig;
pub use handle::{AgentHandle, ConnectionState, SharedStatus, spawn_service};
pub use scheduler::Timing;
