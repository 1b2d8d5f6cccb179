//! Common utilities for the USB Insight Hub agent
//!
//! This crate provides the pieces shared between the agent library, its
//! binary and the test suites: error handling, logging setup, the device
//! snapshot types produced by directory adapters, and the channel bridge that
//! carries control commands and hot-plug notifications into the service loop.

pub mod channel;
pub mod device;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{
    HotplugEvent, HotplugSender, ServiceBridge, ServiceCommand, ServiceWorker,
    create_service_bridge,
};
pub use device::{DeviceRecord, DirectorySnapshot, DriveInfo, usb_instance_id};
pub use error::{Error, Result};
pub use logging::{setup_file_logging, setup_logging};
