//! Async channel bridge into the agent service loop
//!
//! Control commands come from the status surface (TUI, service wrapper);
//! hot-plug notifications come from the dedicated hot-plug thread. Both are
//! consumed by the single service task.

use async_channel::{Receiver, Sender, TrySendError, bounded};

/// Hardware change notification; carries no payload beyond "something changed"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    Connected,
    Disconnected,
    Modified,
}

/// Commands from the control surface to the service loop
#[derive(Debug)]
pub enum ServiceCommand {
    /// Run a rebuild now and arm the timers
    Start {
        response: tokio::sync::oneshot::Sender<()>,
    },

    /// Close every endpoint and disarm the timers
    Stop {
        response: tokio::sync::oneshot::Sender<()>,
    },

    /// Stop and leave the service loop
    Shutdown {
        response: tokio::sync::oneshot::Sender<()>,
    },
}

/// Handle held by the control surface (async)
#[derive(Clone)]
pub struct ServiceBridge {
    cmd_tx: Sender<ServiceCommand>,
    hotplug_tx: Sender<HotplugEvent>,
}

impl ServiceBridge {
    /// Send a command to the service loop
    pub async fn send_command(&self, cmd: ServiceCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Sender for a hot-plug producer
    pub fn hotplug_sender(&self) -> HotplugSender {
        HotplugSender {
            tx: self.hotplug_tx.clone(),
        }
    }
}

/// Hot-plug producer handle (usable from any thread)
#[derive(Clone)]
pub struct HotplugSender {
    tx: Sender<HotplugEvent>,
}

impl HotplugSender {
    /// Queue a notification without blocking
    ///
    /// A full queue already guarantees a pending rebuild, so the event is
    /// dropped. Returns an error only once the service loop is gone.
    pub fn notify(&self, event: HotplugEvent) -> crate::Result<()> {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => {
                Err(crate::Error::Channel("service loop closed".to_string()))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side owned by the service loop
pub struct ServiceWorker {
    cmd_rx: Receiver<ServiceCommand>,
    hotplug_rx: Receiver<HotplugEvent>,
}

impl ServiceWorker {
    /// Receive the next control command
    pub async fn recv_command(&self) -> crate::Result<ServiceCommand> {
        self.cmd_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next hot-plug notification
    pub async fn recv_hotplug(&self) -> crate::Result<HotplugEvent> {
        self.hotplug_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Drop every queued hot-plug notification, returning how many there were
    pub fn drain_hotplug(&self) -> usize {
        let mut drained = 0;
        while self.hotplug_rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Create the channel bridge
///
/// Returns (ServiceBridge for producers, ServiceWorker for the service loop)
pub fn create_service_bridge() -> (ServiceBridge, ServiceWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (hotplug_tx, hotplug_rx) = bounded(64);

    (
        ServiceBridge { cmd_tx, hotplug_tx },
        ServiceWorker { cmd_rx, hotplug_rx },
    )
}
