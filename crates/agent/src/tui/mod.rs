//! Terminal status view
//!
//! Shows the connection state and per-hub port occupancy, with pause/resume.

pub mod app;
pub mod events;
pub mod ui;

pub use app::run;
