//! Hot-plug notification source
//!
//! Runs on a dedicated thread. With libusb hot-plug support the thread pumps
//! `handle_events()` and forwards arrival/removal callbacks; without it the
//! directory is polled and a fingerprint change is reported as `Modified`.

use crate::directory::DeviceDirectory;
use common::{DirectorySnapshot, HotplugEvent, HotplugSender};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Which mechanism a source ended up using
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugMode {
    Libusb,
    Polling,
}

/// Background thread feeding hot-plug events to the service loop
pub struct HotplugSource {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugSource {
    /// Spawn the source, preferring libusb callbacks when the platform has them
    pub fn spawn(
        sender: HotplugSender,
        directory: Arc<dyn DeviceDirectory>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let mode = if rusb::has_hotplug() {
            HotplugMode::Libusb
        } else {
            HotplugMode::Polling
        };
        Self::spawn_with_mode(mode, sender, directory, poll_interval)
    }

    pub fn spawn_with_mode(
        mode: HotplugMode,
        sender: HotplugSender,
        directory: Arc<dyn DeviceDirectory>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("hotplug".to_string())
            .spawn(move || {
                if mode == HotplugMode::Libusb {
                    match run_libusb(&sender, &flag) {
                        Ok(()) => return,
                        Err(e) => warn!("libusb hot-plug unavailable ({}), polling instead", e),
                    }
                }
                run_polling(&sender, directory.as_ref(), poll_interval, &flag);
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Hot-plug thread panicked");
        }
    }
}

impl Drop for HotplugSource {
    fn drop(&mut self) {
        self.join();
    }
}

struct HotplugCallback {
    sender: HotplugSender,
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        debug!(
            "Hot-plug: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.sender.notify(HotplugEvent::Connected);
    }

    fn device_left(&mut self, device: Device<T>) {
        debug!(
            "Hot-plug: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        let _ = self.sender.notify(HotplugEvent::Disconnected);
    }
}

fn run_libusb(sender: &HotplugSender, stop: &AtomicBool) -> rusb::Result<()> {
    let context = Context::new()?;
    let _registration: Registration<Context> = HotplugBuilder::new()
        .enumerate(false)
        .register(
            &context,
            Box::new(HotplugCallback {
                sender: sender.clone(),
            }),
        )?;
    info!("Watching libusb hot-plug events");

    while !stop.load(Ordering::SeqCst) && !sender.is_closed() {
        match context.handle_events(Some(EVENT_TIMEOUT)) {
            Ok(()) => {}
            Err(rusb::Error::Interrupted) => debug!("USB event handling interrupted"),
            Err(e) => {
                warn!("Error handling USB events: {}", e);
                thread::sleep(EVENT_TIMEOUT);
            }
        }
    }
    Ok(())
}

fn run_polling(
    sender: &HotplugSender,
    directory: &dyn DeviceDirectory,
    interval: Duration,
    stop: &AtomicBool,
) {
    info!("Polling for device changes every {:?}", interval);
    let mut last = fingerprint(&directory.snapshot());

    while !stop.load(Ordering::SeqCst) && !sender.is_closed() {
        let deadline = Instant::now() + interval;
        while Instant::now() < deadline {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(EVENT_TIMEOUT.min(interval));
        }

        let current = fingerprint(&directory.snapshot());
        if current != last {
            debug!("Device directory changed");
            last = current;
            if sender.notify(HotplugEvent::Modified).is_err() {
                break;
            }
        }
    }
}

/// Order-independent digest of what a rebuild would see
pub fn fingerprint(snapshot: &DirectorySnapshot) -> u64 {
    let mut entries: Vec<(&str, &str, &str)> = snapshot
        .devices
        .iter()
        .map(|d| {
            (
                d.instance_id.as_str(),
                d.location_path.as_str(),
                d.parent_id.as_deref().unwrap_or_default(),
            )
        })
        .chain(
            snapshot
                .drives
                .iter()
                .map(|d| (d.letter.as_str(), d.device_id.as_str(), "")),
        )
        .collect();
    entries.sort_unstable();

    let mut hasher = DefaultHasher::new();
    entries.hash(&mut hasher);
    hasher.finish()
}
