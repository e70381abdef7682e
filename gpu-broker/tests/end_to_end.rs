//! End-to-end scenarios driven over the real TCP wire protocol against a
//! broker backed by `MockInspector` and the `fake-holder` test fixture
//! instead of real GPU hardware.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use broker_protocol::{codec, Reply, Request};
use device_inspector::mock::MockInspector;
use device_inspector::DeviceInspector;
use gpu_broker::{Broker, BrokerConfig};
use tokio::net::TcpStream;

fn fake_holder_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fake-holder"))
}

fn test_config(logger_dir_name: &str) -> BrokerConfig {
    BrokerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: 0,
        logger_dir: std::env::temp_dir().join(logger_dir_name),
        reaper_interval: Duration::from_millis(200),
        holder_binary: fake_holder_path(),
    }
}

async fn roundtrip(addr: std::net::SocketAddr, request: &Request) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    codec::write_message(&mut stream, request).await.unwrap();
    codec::read_message(&mut stream).await.unwrap()
}

/// Scenario 1: info on an empty host.
#[tokio::test]
async fn info_on_an_empty_host() {
    let inspector: Arc<dyn DeviceInspector> = Arc::new(MockInspector::new(1, 16 * 1024 * 1024 * 1024));
    let broker = Broker::with_inspector(test_config("scenario-info"), inspector)
        .await
        .unwrap();
    let addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    let reply = roundtrip(addr, &Request::GetSystemInfo).await;
    match reply {
        Reply::GetSystemInfo { info } => {
            assert_eq!(info.get("device_num").unwrap(), &serde_json::json!(1));
            assert!(info.get("driver_version").unwrap().as_str().unwrap().len() > 0);
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

/// Scenario 2: non-exclusive allocate then release.
#[tokio::test]
async fn non_exclusive_allocate_then_release() {
    let total = 16 * 1024 * 1024 * 1024u64;
    let inspector: Arc<dyn DeviceInspector> = Arc::new(MockInspector::new(1, total));
    let broker = Broker::with_inspector(test_config("scenario-alloc-release"), inspector)
        .await
        .unwrap();
    let addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    let reply = roundtrip(
        addr,
        &Request::AllocateGpus {
            num_gpus: 1,
            exclusive: false,
            mem_size: None,
        },
    )
    .await;
    let handles = match reply {
        Reply::AllocateGpus {
            success: true,
            device_indices,
            handles,
            ..
        } => {
            assert_eq!(device_indices, vec![0]);
            assert_eq!(handles.len(), 1);
            handles
        }
        other => panic!("unexpected reply: {:?}", other),
    };

    let reply = roundtrip(addr, &Request::ReleaseGpus { handles }).await;
    assert_eq!(
        reply,
        Reply::ReleaseGpus {
            success: true,
            failed_handles: vec![],
        }
    );
}

/// Scenario 3: oversubscription of exclusive reservations.
#[tokio::test]
async fn oversubscription_of_exclusive_gpus() {
    let total = 16 * 1024 * 1024 * 1024u64;
    let inspector: Arc<dyn DeviceInspector> = Arc::new(MockInspector::new(2, total));
    let broker = Broker::with_inspector(test_config("scenario-oversubscribe"), inspector)
        .await
        .unwrap();
    let addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    let reply_a = roundtrip(
        addr,
        &Request::AllocateGpus {
            num_gpus: 2,
            exclusive: true,
            mem_size: None,
        },
    )
    .await;
    assert!(matches!(reply_a, Reply::AllocateGpus { success: true, .. }));

    let reply_b = roundtrip(
        addr,
        &Request::AllocateGpus {
            num_gpus: 1,
            exclusive: true,
            mem_size: None,
        },
    )
    .await;
    assert_eq!(
        reply_b,
        Reply::AllocateGpus {
            success: false,
            device_indices: vec![],
            pids: vec![],
            handles: vec![],
        }
    );
}

/// Scenario 4: release of an unknown handle.
#[tokio::test]
async fn release_of_unknown_handle() {
    let inspector: Arc<dyn DeviceInspector> = Arc::new(MockInspector::new(1, 1024));
    let broker = Broker::with_inspector(test_config("scenario-unknown-handle"), inspector)
        .await
        .unwrap();
    let addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    let reply = roundtrip(
        addr,
        &Request::ReleaseGpus {
            handles: vec!["deadbeef".to_string()],
        },
    )
    .await;
    assert_eq!(
        reply,
        Reply::ReleaseGpus {
            success: false,
            failed_handles: vec!["deadbeef".to_string()],
        }
    );
}

/// Scenario 5: reaping a killed holder.
#[tokio::test]
async fn reaping_a_killed_holder() {
    let total = 16 * 1024 * 1024 * 1024u64;
    let inspector: Arc<dyn DeviceInspector> = Arc::new(MockInspector::new(1, total));
    let broker = Broker::with_inspector(test_config("scenario-reap"), inspector.clone())
        .await
        .unwrap();
    let addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    let reply = roundtrip(
        addr,
        &Request::AllocateGpus {
            num_gpus: 1,
            exclusive: true,
            mem_size: None,
        },
    )
    .await;
    let pid = match reply {
        Reply::AllocateGpus {
            success: true,
            pids,
            ..
        } => pids[0],
        other => panic!("unexpected reply: {:?}", other),
    };

    assert_eq!(
        inspector.get_compute_mode(0).unwrap(),
        device_inspector::ComputeMode::ExclusiveProcess
    );

    // Kill the holder out-of-band, as an operator or OOM-killer would.
    unsafe {
        libc_kill(pid as i32);
    }

    // Two reaper periods (200ms each in this config) plus slack.
    tokio::time::sleep(Duration::from_millis(900)).await;

    let reply = roundtrip(addr, &Request::GetSystemInfo).await;
    assert!(matches!(reply, Reply::GetSystemInfo { .. }));
    assert_eq!(
        inspector.get_compute_mode(0).unwrap(),
        device_inspector::ComputeMode::Default
    );
}

/// Minimal `kill(2)` call so the test doesn't need a `nix`/`libc`
/// dependency just for one syscall.
unsafe fn libc_kill(pid: i32) {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    const SIGKILL: i32 = 9;
    kill(pid, SIGKILL);
}

/// Scenario 6: mem-size filter.
#[tokio::test]
async fn mem_size_filter_rejects_insufficient_free_memory() {
    let one_gib = 1024u64 * 1024 * 1024;
    let inspector = MockInspector::new(1, 4 * one_gib);
    inspector.set_free_bytes(0, one_gib);
    let inspector: Arc<dyn DeviceInspector> = Arc::new(inspector);
    let broker = Broker::with_inspector(test_config("scenario-mem-filter"), inspector)
        .await
        .unwrap();
    let addr = broker.local_addr().unwrap();
    tokio::spawn(broker.run());

    let reply = roundtrip(
        addr,
        &Request::AllocateGpus {
            num_gpus: 1,
            exclusive: false,
            mem_size: Some(2 * one_gib),
        },
    )
    .await;
    assert!(matches!(reply, Reply::AllocateGpus { success: false, .. }));
}
