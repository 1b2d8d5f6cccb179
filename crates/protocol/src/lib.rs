//! Controller wire protocol for the USB Insight Hub
//!
//! This crate defines the per-port occupancy types produced by the agent and
//! the line-oriented frame format understood by the hub's display controller.
//!
//! # Example
//!
//! ```
//! use protocol::{DeviceCategory, HubGeneration, PortDevice, PortOccupancy, encode_frame};
//!
//! let mut occupancy = PortOccupancy::new();
//! occupancy.push(1, PortDevice::new("COM7", DeviceCategory::Com, HubGeneration::Usb2));
//!
//! let line = encode_frame(&occupancy);
//! assert!(line.starts_with(r#"{"action":"set","params":{"CH1":{"Dev1_name":"COM7""#));
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{
    ChannelSlots, EMPTY_SLOT, Frame, GRID_CELL_WIDTH, RICH_LAYOUT_COUNT, SLOT_NAME_WIDTH,
    TURN_OFF_FRAME, encode_channel, encode_frame,
};
pub use error::{ProtocolError, Result};
pub use messages::{ControllerReply, ReplyStatus};
pub use types::{DeviceCategory, HubGeneration, PORT_COUNT, PortDevice, PortOccupancy};
