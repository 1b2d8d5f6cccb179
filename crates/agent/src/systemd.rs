//! Systemd service integration
//!
//! sd-notify messages for service mode. The status line carries the
//! connection state shown by `systemctl status`.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// An sd-notify message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Ready,
    Stopping,
    Watchdog,
    Status(String),
}

impl Notification {
    fn message(&self) -> String {
        match self {
            Notification::Ready => "READY=1".to_string(),
            Notification::Stopping => "STOPPING=1".to_string(),
            Notification::Watchdog => "WATCHDOG=1".to_string(),
            Notification::Status(status) => format!("STATUS={}", status),
        }
    }
}

/// Send a notification if running under systemd; a no-op otherwise
pub fn notify(notification: Notification) -> Result<()> {
    match env::var("NOTIFY_SOCKET") {
        Ok(socket_path) => send_to(Path::new(&socket_path), &notification),
        Err(_) => {
            if notification != Notification::Watchdog {
                debug!("NOTIFY_SOCKET not set, skipping systemd notification");
            }
            Ok(())
        }
    }
}

fn send_to(socket_path: &Path, notification: &Notification) -> Result<()> {
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    let message = notification.message();
    socket
        .send_to(message.as_bytes(), socket_path)
        .with_context(|| format!("Failed to send {} to systemd", message))?;
    debug!("Notified systemd: {}", message);
    Ok(())
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Watchdog timeout configured by systemd, if any
pub fn watchdog_timeout() -> Option<Duration> {
    env::var("WATCHDOG_USEC")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_micros)
}

/// Send keepalives at half the watchdog timeout
///
/// Returns `None` when the watchdog is not enabled.
pub fn spawn_watchdog_task() -> Option<JoinHandle<()>> {
    let timeout = watchdog_timeout()?;
    let interval = (timeout / 2).max(Duration::from_secs(1));
    info!(
        "Systemd watchdog enabled, interval: {}s (timeout: {}s)",
        interval.as_secs(),
        timeout.as_secs()
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = notify(Notification::Watchdog) {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    }))
}
