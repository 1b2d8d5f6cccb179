//! Service loop integration tests
//!
//! Drive the real scheduler with short timers against a snapshot directory
//! and recording endpoints:
//! - start rebuilds immediately, the heartbeat keeps sending frames
//! - hot-plug bursts coalesce into one rebuild
//! - removed hubs lose their endpoint and receive nothing further
//! - stop and shutdown leave no endpoint open
//! - a rebuild stuck in the directory query is overtaken by a forced one

use agent::directory::{DeviceDirectory, SnapshotDirectory};
use agent::endpoint::RecordingEndpointFactory;
use agent::hub::HardwareIds;
use agent::{AgentHandle, ConnectionState, InsightAgent, Timing, spawn_service};
use common::test_utils::{DEFAULT_TEST_TIMEOUT, SnapshotBuilder, with_timeout};
use common::{DeviceRecord, DirectorySnapshot, DriveInfo, HotplugEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const FAST: Timing = Timing {
    debounce: Duration::from_millis(50),
    heartbeat: Duration::from_millis(20),
    max_reschedules: 2,
};

struct Rig {
    directory: SnapshotDirectory,
    endpoints: RecordingEndpointFactory,
    handle: AgentHandle,
    task: JoinHandle<()>,
}

fn spawn_rig(snapshot: DirectorySnapshot) -> Rig {
    let directory = SnapshotDirectory::new(snapshot);
    let endpoints = RecordingEndpointFactory::new();
    let agent = InsightAgent::new(
        Arc::new(directory.clone()),
        Arc::new(endpoints.clone()),
        HardwareIds::default(),
    );
    let (handle, task) = spawn_service(agent, FAST);
    Rig {
        directory,
        endpoints,
        handle,
        task,
    }
}

fn one_hub() -> DirectorySnapshot {
    let mut builder = SnapshotBuilder::new();
    let host = builder.add_host("0014");
    builder.add_insight_hub(&host, "1", "15", "COM5");
    builder.build()
}

fn bare_host() -> DirectorySnapshot {
    let mut builder = SnapshotBuilder::new();
    builder.add_host("0014");
    builder.build()
}

async fn wait_for(condition: impl Fn() -> bool) -> bool {
    with_timeout(DEFAULT_TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test]
async fn test_start_rebuilds_immediately() {
    let rig = spawn_rig(one_hub());
    assert!(!rig.handle.is_running());

    rig.handle.start().await.unwrap();

    assert!(rig.handle.is_running());
    assert!(rig.handle.is_updated());
    assert_eq!(rig.handle.connected_hub_count(), 1);
    assert_eq!(rig.handle.status().rebuild_count(), 1);
    assert_eq!(rig.endpoints.open_count(), 1);

    rig.handle.acknowledge_update();
    assert!(!rig.handle.is_updated());
}

#[tokio::test]
async fn test_heartbeat_sends_wellformed_frames() {
    let rig = spawn_rig(one_hub());
    rig.handle.start().await.unwrap();

    assert!(wait_for(|| rig.endpoints.lines("COM5").len() >= 3).await);
    for line in rig.endpoints.lines("COM5") {
        serde_json::from_str::<serde_json::Value>(&line).unwrap();
    }
}

#[tokio::test]
async fn test_hotplug_burst_coalesces() {
    let rig = spawn_rig(one_hub());
    rig.handle.start().await.unwrap();
    let base = rig.handle.status().rebuild_count();

    let sender = rig.handle.hotplug_sender();
    for event in [
        HotplugEvent::Connected,
        HotplugEvent::Modified,
        HotplugEvent::Disconnected,
        HotplugEvent::Connected,
        HotplugEvent::Modified,
    ] {
        sender.notify(event).unwrap();
    }

    assert!(wait_for(|| rig.handle.status().rebuild_count() == base + 1).await);
    tokio::time::sleep(FAST.debounce * 4).await;
    assert_eq!(rig.handle.status().rebuild_count(), base + 1);
}

#[tokio::test]
async fn test_new_hub_is_picked_up() {
    let rig = spawn_rig(bare_host());
    rig.handle.start().await.unwrap();
    assert_eq!(rig.handle.connection_state(), ConnectionState::Disconnected);

    rig.directory.replace(one_hub());
    rig.handle
        .hotplug_sender()
        .notify(HotplugEvent::Connected)
        .unwrap();

    assert!(wait_for(|| rig.handle.connected_hub_count() == 1).await);
    assert_eq!(rig.handle.connection_state(), ConnectionState::Connected(1));
    assert!(wait_for(|| !rig.endpoints.lines("COM5").is_empty()).await);
}

#[tokio::test]
async fn test_removed_hub_gets_no_more_frames() {
    let rig = spawn_rig(one_hub());
    rig.handle.start().await.unwrap();
    assert!(wait_for(|| !rig.endpoints.lines("COM5").is_empty()).await);

    rig.directory.replace(bare_host());
    rig.handle
        .hotplug_sender()
        .notify(HotplugEvent::Disconnected)
        .unwrap();

    assert!(wait_for(|| rig.handle.connected_hub_count() == 0).await);
    assert_eq!(rig.endpoints.live_count(), 0);

    let sent = rig.endpoints.lines("COM5").len();
    tokio::time::sleep(FAST.heartbeat * 5).await;
    assert_eq!(rig.endpoints.lines("COM5").len(), sent);
}

#[tokio::test]
async fn test_stop_closes_endpoints_and_ignores_hotplug() {
    let mut builder = SnapshotBuilder::new();
    let first = builder.add_host("0014");
    let second = builder.add_host("0015");
    builder.add_insight_hub(&first, "1", "15", "COM5");
    builder.add_insight_hub(&second, "2", "16", "COM6");
    let rig = spawn_rig(builder.build());

    rig.handle.start().await.unwrap();
    assert_eq!(rig.endpoints.live_count(), 2);

    rig.handle.stop().await.unwrap();
    assert_eq!(rig.endpoints.live_count(), 0);
    assert_eq!(rig.handle.connection_state(), ConnectionState::Paused);
    assert!(rig.handle.hubs().is_empty());

    let rebuilds = rig.handle.status().rebuild_count();
    let sent = rig.endpoints.lines("COM5").len();
    rig.handle
        .hotplug_sender()
        .notify(HotplugEvent::Connected)
        .unwrap();
    tokio::time::sleep(FAST.debounce * 4).await;
    assert_eq!(rig.handle.status().rebuild_count(), rebuilds);
    assert_eq!(rig.endpoints.lines("COM5").len(), sent);

    rig.handle.start().await.unwrap();
    assert_eq!(rig.endpoints.live_count(), 2);
    assert_eq!(rig.handle.connection_state(), ConnectionState::Connected(2));
}

#[tokio::test]
async fn test_shutdown_ends_loop() {
    let rig = spawn_rig(one_hub());
    rig.handle.start().await.unwrap();

    rig.handle.shutdown().await.unwrap();
    with_timeout(DEFAULT_TEST_TIMEOUT, rig.task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(rig.endpoints.live_count(), 0);
    assert!(rig.handle.start().await.is_err());
}

/// Serves a snapshot, stalling once on a chosen device query
struct StallingDirectory {
    inner: SnapshotDirectory,
    calls: Arc<AtomicUsize>,
    stall_on: usize,
    stall: Duration,
}

impl DeviceDirectory for StallingDirectory {
    fn devices(&self) -> common::Result<Vec<DeviceRecord>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.stall_on {
            std::thread::sleep(self.stall);
        }
        self.inner.devices()
    }

    fn removable_drives(&self) -> common::Result<Vec<DriveInfo>> {
        self.inner.removable_drives()
    }
}

#[tokio::test]
async fn test_stuck_rebuild_is_overtaken_by_forced_rebuild() {
    let stall = Duration::from_secs(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let directory = StallingDirectory {
        inner: SnapshotDirectory::new(one_hub()),
        calls: calls.clone(),
        stall_on: 2,
        stall,
    };
    let endpoints = RecordingEndpointFactory::new();
    let agent = InsightAgent::new(
        Arc::new(directory),
        Arc::new(endpoints.clone()),
        HardwareIds::default(),
    );
    let (handle, _task) = spawn_service(agent, FAST);

    handle.start().await.unwrap();
    assert_eq!(handle.status().rebuild_count(), 1);

    let sender = handle.hotplug_sender();
    sender.notify(HotplugEvent::Modified).unwrap();
    assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 2).await);
    let stalled_at = Instant::now();

    // Two busy re-arms, then the flag is cleared and a rebuild runs anyway
    sender.notify(HotplugEvent::Modified).unwrap();
    assert!(wait_for(|| handle.status().rebuild_count() == 2).await);
    assert!(calls.load(Ordering::SeqCst) >= 3);
    assert!(stalled_at.elapsed() < stall);
    assert_eq!(handle.connected_hub_count(), 1);

    // The stalled rebuild completes later and is discarded
    tokio::time::sleep(stall).await;
    assert_eq!(handle.status().rebuild_count(), 2);
    assert_eq!(endpoints.live_count(), 1);
}
