//! Controller frame encoding
//!
//! Renders a hub's [`PortOccupancy`] into the single-line JSON-like command the
//! controller firmware parses. The text is assembled by hand rather than
//! through a serializer: the firmware expects this exact layout, including
//! the leading spaces in the three-row grids and the unescaped names.
//!
//! # Frame Format
//!
//! ```text
//! {"action":"set","params":{"CH1":{"Dev1_name":<slot>,"Dev2_name":<slot>,"numDev":"<n>","usbType":"<g>"},"CH2":{..},"CH3":{..}}}
//! ```
//!
//! A `<slot>` is either a quoted name or, for three or more devices on a
//! port, a nested text-grid object in `Dev1_name` with `numDev` set to `10`.

use crate::types::{PORT_COUNT, PortDevice, PortOccupancy};
use std::fmt;

/// Command sent when a hub has nothing plugged into any port
pub const TURN_OFF_FRAME: &str = r#"{ "action":"set","params":{ "ledState":"false"}}"#;

/// Placeholder for an unused name slot
pub const EMPTY_SLOT: &str = "\"-\"";

/// `numDev` value signalling a text-grid layout instead of a device count
pub const RICH_LAYOUT_COUNT: &str = "10";

/// Longest name shown in a plain slot
pub const SLOT_NAME_WIDTH: usize = 7;

/// Fixed cell width used in the two-column grids
pub const GRID_CELL_WIDTH: usize = 6;

/// The four wire fields of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSlots {
    pub dev1_name: String,
    pub dev2_name: String,
    pub num_dev: String,
    pub usb_type: String,
}

impl Default for ChannelSlots {
    fn default() -> Self {
        Self {
            dev1_name: EMPTY_SLOT.to_string(),
            dev2_name: EMPTY_SLOT.to_string(),
            num_dev: "0".to_string(),
            usb_type: "0".to_string(),
        }
    }
}

/// A complete command for one hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Update the three channel displays
    SetChannels([ChannelSlots; PORT_COUNT]),
    /// Switch the channel displays off
    TurnOff,
}

impl Frame {
    /// Build the frame for a hub's current occupancy
    pub fn from_occupancy(occupancy: &PortOccupancy) -> Self {
        if occupancy.is_empty() {
            return Frame::TurnOff;
        }

        let channels = std::array::from_fn(|i| encode_channel(occupancy.port(i + 1)));
        Frame::SetChannels(channels)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::TurnOff => f.write_str(TURN_OFF_FRAME),
            Frame::SetChannels(channels) => {
                f.write_str(r#"{"action":"set","params":{"#)?;
                for (i, ch) in channels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(
                        f,
                        r#""CH{}":{{"Dev1_name":{},"Dev2_name":{},"numDev":"{}","usbType":"{}"}}"#,
                        i + 1,
                        ch.dev1_name,
                        ch.dev2_name,
                        ch.num_dev,
                        ch.usb_type
                    )?;
                }
                f.write_str("}}")
            }
        }
    }
}

/// Encode a hub's occupancy as one wire line (without the trailing newline)
pub fn encode_frame(occupancy: &PortOccupancy) -> String {
    Frame::from_occupancy(occupancy).to_string()
}

/// Encode the slots for one port's device list
pub fn encode_channel(devices: &[PortDevice]) -> ChannelSlots {
    let mut slots = ChannelSlots::default();
    let Some(first) = devices.first() else {
        return slots;
    };

    let n = devices.len();
    if n <= 2 {
        slots.dev1_name = quoted(&clip(&devices[0].short_name, SLOT_NAME_WIDTH));
        if let Some(second) = devices.get(1) {
            slots.dev2_name = quoted(&clip(&second.short_name, SLOT_NAME_WIDTH));
        }
        slots.num_dev = n.to_string();
    } else {
        slots.dev1_name = text_grid(devices);
        slots.num_dev = RICH_LAYOUT_COUNT.to_string();
    }
    slots.usb_type = first.generation.as_digit().to_string();
    slots
}

fn text_grid(devices: &[PortDevice]) -> String {
    let n = devices.len();
    let cell = |i: usize| grid_cell(&devices[i].short_name);

    match n {
        3 => grid(&[
            (devices[0].short_name.clone(), "center"),
            (devices[1].short_name.clone(), "center"),
            (devices[2].short_name.clone(), "center"),
        ]),
        4 => grid(&[
            (format!("{},{}", cell(0), cell(2)), "center"),
            (format!("{},{}", cell(1), cell(3)), "center"),
        ]),
        5 => grid(&[
            (format!(" {},{}", cell(0), cell(3)), "left"),
            (format!(" {},{}", cell(1), cell(4)), "left"),
            (format!(" {}", cell(2)), "left"),
        ]),
        6 => grid(&[
            (format!(" {},{}", cell(0), cell(3)), "center"),
            (format!(" {},{}", cell(1), cell(4)), "center"),
            (format!(" {},{}", cell(2), cell(5)), "center"),
        ]),
        _ => grid(&[
            (format!(" {},{}", cell(0), cell(3)), "center"),
            (format!(" {},{}", cell(1), cell(4)), "center"),
            (format!(" {}, +{}", cell(2), n - 5), "center"),
        ]),
    }
}

fn grid(rows: &[(String, &str)]) -> String {
    let body = rows
        .iter()
        .enumerate()
        .map(|(i, (txt, align))| {
            format!(
                r#""T{}":{{"txt":"{}","align":"{}"}}"#,
                i + 1,
                txt,
                align
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}

/// Keep at most `width` characters
fn clip(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

/// Clip to the grid cell width and right-pad with spaces
fn grid_cell(s: &str) -> String {
    format!("{:<width$}", clip(s, GRID_CELL_WIDTH), width = GRID_CELL_WIDTH)
}
