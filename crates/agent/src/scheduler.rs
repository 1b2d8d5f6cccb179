//! Service loop: debounced rebuilds and the heartbeat
//!
//! A single tokio task owns the timers. Hot-plug notifications re-arm a
//! debounce deadline; when it expires one rebuild runs on the blocking pool.
//! The directory query of a rebuild runs without holding the agent, so a
//! forced rebuild can overtake one stuck in the query. The heartbeat ticks
//! independently and sends the current frames, skipping any tick that lands
//! while a rebuild is in flight.

use crate::agent::{Discoverer, InsightAgent};
use crate::handle::SharedStatus;
use common::{ServiceCommand, ServiceWorker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Timer settings for the service loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Quiet period after the last hot-plug event before rebuilding
    pub debounce: Duration,
    /// Interval between frame sends
    pub heartbeat: Duration,
    /// Busy re-arms tolerated before a rebuild is forced
    pub max_reschedules: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            heartbeat: Duration::from_millis(500),
            max_reschedules: 2,
        }
    }
}

/// What to do when the debounce deadline expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    /// A rebuild is in flight; try again after another debounce period
    Rearm,
    /// The busy flag outlived the re-arm budget and was cleared
    ForceRun,
}

/// Busy flag with a bounded reschedule budget
///
/// The flag holds the generation of the rebuild in flight, zero when idle.
#[derive(Debug)]
pub struct RebuildGate {
    busy: Arc<AtomicU64>,
    generation: u64,
    reschedules: u32,
    max_reschedules: u32,
}

impl RebuildGate {
    pub fn new(max_reschedules: u32) -> Self {
        Self {
            busy: Arc::new(AtomicU64::new(0)),
            generation: 0,
            reschedules: 0,
            max_reschedules,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst) != 0
    }

    pub fn on_fire(&mut self) -> GateDecision {
        if !self.is_busy() {
            self.reschedules = 0;
            return GateDecision::Run;
        }
        if self.reschedules < self.max_reschedules {
            self.reschedules += 1;
            return GateDecision::Rearm;
        }
        warn!(
            "Rebuild still busy after {} reschedules, forcing a new rebuild",
            self.reschedules
        );
        self.busy.store(0, Ordering::SeqCst);
        self.reschedules = 0;
        GateDecision::ForceRun
    }

    /// Mark a new rebuild generation as in flight until the guard drops
    pub fn begin(&mut self) -> BusyGuard {
        self.generation += 1;
        self.busy.store(self.generation, Ordering::SeqCst);
        BusyGuard {
            busy: self.busy.clone(),
            generation: self.generation,
        }
    }
}

/// Clears the busy flag when the rebuild finishes, panics included
///
/// A guard whose rebuild was overtaken by a forced one leaves the newer
/// generation's flag alone.
#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicU64>,
    generation: u64,
}

impl BusyGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let _ = self.busy.compare_exchange(
            self.generation,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

fn lock_agent(agent: &Mutex<InsightAgent>) -> MutexGuard<'_, InsightAgent> {
    agent.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The service loop; see [`crate::handle::spawn_service`]
pub struct Service {
    agent: Arc<Mutex<InsightAgent>>,
    discoverer: Discoverer,
    /// Generation of the last rebuild merged into the agent
    applied: Arc<AtomicU64>,
    worker: ServiceWorker,
    status: Arc<SharedStatus>,
    timing: Timing,
    gate: RebuildGate,
    debounce_at: Option<Instant>,
}

impl Service {
    pub fn new(
        agent: InsightAgent,
        worker: ServiceWorker,
        status: Arc<SharedStatus>,
        timing: Timing,
    ) -> Self {
        Self {
            discoverer: agent.discoverer(),
            agent: Arc::new(Mutex::new(agent)),
            applied: Arc::new(AtomicU64::new(0)),
            worker,
            status,
            gate: RebuildGate::new(timing.max_reschedules),
            timing,
            debounce_at: None,
        }
    }

    fn running(&self) -> bool {
        self.status.is_running()
    }

    pub async fn run(mut self) {
        let mut heartbeat = time::interval(self.timing.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let running = self.running();
            let debounce_armed = running && self.debounce_at.is_some();
            let deadline = self
                .debounce_at
                .unwrap_or_else(|| Instant::now() + self.timing.debounce);

            tokio::select! {
                command = self.worker.recv_command() => {
                    match command {
                        Ok(ServiceCommand::Start { response }) => {
                            self.start().await;
                            heartbeat.reset();
                            let _ = response.send(());
                        }
                        Ok(ServiceCommand::Stop { response }) => {
                            self.stop().await;
                            let _ = response.send(());
                        }
                        Ok(ServiceCommand::Shutdown { response }) => {
                            self.stop().await;
                            let _ = response.send(());
                            break;
                        }
                        Err(e) => {
                            debug!("Control channel closed: {}", e);
                            self.stop().await;
                            break;
                        }
                    }
                }

                event = self.worker.recv_hotplug(), if running => {
                    match event {
                        Ok(event) => {
                            debug!("Hot-plug event: {:?}", event);
                            self.debounce_at = Some(Instant::now() + self.timing.debounce);
                        }
                        Err(e) => {
                            debug!("Hot-plug channel closed: {}", e);
                            self.stop().await;
                            break;
                        }
                    }
                }

                _ = time::sleep_until(deadline), if debounce_armed => {
                    self.debounce_at = None;
                    self.on_debounce();
                }

                _ = heartbeat.tick(), if running => {
                    self.heartbeat();
                }
            }
        }

        info!("Service loop finished");
    }

    async fn start(&mut self) {
        if self.running() {
            debug!("Start requested while already running");
            return;
        }
        self.status.set_running(true);
        let dropped = self.worker.drain_hotplug();
        if dropped > 0 {
            debug!("Dropped {} hot-plug events queued while stopped", dropped);
        }
        info!("Starting hub monitoring");
        if let Err(e) = self.spawn_rebuild().await {
            error!("Initial rebuild failed: {}", e);
        }
    }

    async fn stop(&mut self) {
        if !self.running() {
            return;
        }
        // In-flight rebuilds check the flag once they hold the agent
        self.status.set_running(false);

        let agent = self.agent.clone();
        let status = self.status.clone();
        let closed = task::spawn_blocking(move || {
            let mut agent = lock_agent(&agent);
            let closed = agent.stop();
            status.clear();
            closed
        })
        .await;
        match closed {
            Ok(closed) => info!("Hub monitoring stopped ({} endpoints closed)", closed),
            Err(e) => error!("Stop failed: {}", e),
        }

        self.debounce_at = None;
    }

    fn on_debounce(&mut self) {
        match self.gate.on_fire() {
            GateDecision::Run | GateDecision::ForceRun => {
                // Completion is observed through the busy flag
                drop(self.spawn_rebuild());
            }
            GateDecision::Rearm => {
                debug!("Rebuild in progress, rescheduling");
                self.debounce_at = Some(Instant::now() + self.timing.debounce);
            }
        }
    }

    fn spawn_rebuild(&mut self) -> JoinHandle<()> {
        let guard = self.gate.begin();
        let discoverer = self.discoverer.clone();
        let agent = self.agent.clone();
        let status = self.status.clone();
        let applied = self.applied.clone();
        task::spawn_blocking(move || {
            let generation = guard.generation();
            let memory = lock_agent(&agent).memory().clone();
            let discovery = discoverer.discover(&memory);

            let mut agent = lock_agent(&agent);
            if !status.is_running() {
                debug!("Skipping rebuild after stop");
                return;
            }
            let latest = applied.load(Ordering::SeqCst);
            if generation < latest {
                debug!("Discarding rebuild {}, already overtaken by {}", generation, latest);
                return;
            }
            applied.store(generation, Ordering::SeqCst);
            agent.apply(discovery);
            status.publish(agent.hub_statuses());
        })
    }

    fn heartbeat(&self) {
        if self.gate.is_busy() {
            debug!("Heartbeat skipped, rebuild in progress");
            return;
        }
        let agent = self.agent.clone();
        let status = self.status.clone();
        drop(task::spawn_blocking(move || {
            let mut agent = match agent.try_lock() {
                Ok(agent) => agent,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            if !status.is_running() {
                return;
            }
            agent.heartbeat();
            status.refresh_hubs(agent.hub_statuses());
        }));
    }
}
