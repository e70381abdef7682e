//! Exercises the allocate handler's rollback path directly: when a spawn
//! fails partway through a multi-device request, every device already
//! committed in that same call must be returned to its pre-call state
//! and left out of the registry.

use std::path::PathBuf;

use device_inspector::{ComputeMode, DeviceInspector};
use gpu_broker::logging::Logger;
use gpu_broker::registry::Registry;
use holder_supervisor::HolderSupervisor;

fn fake_holder_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fake-holder"))
}

#[tokio::test]
async fn failed_spawn_rolls_back_devices_already_committed_in_the_same_call() {
    let total = 16 * 1024 * 1024 * 1024u64;
    let inspector = device_inspector::mock::MockInspector::new(3, total);
    let registry = Registry::new();
    let supervisor = HolderSupervisor::new(fake_holder_path())
        .with_extra_args(vec!["--fail-attach-index".to_string(), "2".to_string()]);
    let logger_dir = tempfile::tempdir().unwrap();
    let logger = Logger::open(logger_dir.path()).unwrap();

    let reply = gpu_broker::admission::allocate(
        &inspector,
        &registry,
        &supervisor,
        &logger,
        3,
        true,
        None,
    )
    .await;

    assert_eq!(
        reply,
        broker_protocol::Reply::AllocateGpus {
            success: false,
            device_indices: vec![],
            pids: vec![],
            handles: vec![],
        }
    );

    // Nothing survives in the registry...
    assert_eq!(registry.handles().await.len(), 0);
    // ...and every device's compute mode is back to its pre-call default,
    // including the two devices whose holders did spawn successfully
    // before device 2's spawn failed.
    for index in 0..3 {
        assert_eq!(
            inspector.get_compute_mode(index).unwrap(),
            ComputeMode::Default
        );
    }
}
