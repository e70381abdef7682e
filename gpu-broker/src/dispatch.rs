//! The wire endpoint and request dispatcher: one request, one reply, per
//! TCP connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use broker_protocol::{codec, Reply, Request};
use device_inspector::{DeviceInspector, InspectorError};
use holder_supervisor::HolderSupervisor;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::admission;
use crate::logging::Logger;
use crate::registry::Registry;
use crate::release;

/// Read-only handles shared by every connection task and the reaper —
/// the broker-wide state a dispatch needs, grouped into one cloneable
/// bundle.
#[derive(Clone)]
pub struct BrokerState {
    pub inspector: Arc<dyn DeviceInspector>,
    pub registry: Registry,
    pub supervisor: HolderSupervisor,
    pub logger: Arc<Logger>,
    /// Serializes `AllocateGpus` calls against each other. Each connection
    /// runs in its own task, so without this an idle-device scan in one
    /// task and the commit of another task's allocate can interleave
    /// between the registry check and the holder spawn, double-booking an
    /// exclusive device. `release`/the reaper mutate the registry directly
    /// and don't need it: they only ever remove a reservation, which is
    /// already atomic under the registry's own lock.
    pub admission_lock: Arc<Mutex<()>>,
}

/// Query driver version + device count. Any driver error (including
/// permission-denied) yields an empty `info` map: a system-info request
/// never triggers the broker's fatal-error shutdown policy, only the
/// reaper's and the startup device reset's driver errors do.
pub fn system_info(inspector: &dyn DeviceInspector, logger: &Logger) -> Reply {
    let queried = (|| -> Result<BTreeMap<String, serde_json::Value>, InspectorError> {
        let mut info = BTreeMap::new();
        info.insert(
            "driver_version".to_string(),
            serde_json::Value::String(inspector.driver_version()?),
        );
        info.insert(
            "device_num".to_string(),
            serde_json::Value::from(inspector.device_count()?),
        );
        Ok(info)
    })();

    match queried {
        Ok(info) => Reply::GetSystemInfo { info },
        Err(err) => {
            logger.error(format!("system info query failed: {}", err));
            Reply::GetSystemInfo {
                info: BTreeMap::new(),
            }
        }
    }
}

/// Decode one request, dispatch it, encode and send the reply, close the
/// connection. No request handled here can trigger the broker's fatal
/// shutdown path — that path is reserved for the reaper and startup.
pub async fn handle_connection(mut stream: TcpStream, state: BrokerState) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());

    let request: Request = match codec::read_message(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            state
                .logger
                .error(format!("connection from {} closed unexpectedly: {}", peer, err));
            return;
        }
    };
    state.logger.info(format!("request from {}: {:?}", peer, request));

    let reply = match request {
        Request::AllocateGpus {
            num_gpus,
            exclusive,
            mem_size,
        } => {
            let _admission_guard = state.admission_lock.lock().await;
            admission::allocate(
                &*state.inspector,
                &state.registry,
                &state.supervisor,
                &state.logger,
                num_gpus,
                exclusive,
                mem_size,
            )
            .await
        }
        Request::ReleaseGpus { handles } => {
            release::release(&*state.inspector, &state.registry, &state.logger, handles).await
        }
        Request::GetSystemInfo => system_info(&*state.inspector, &state.logger),
    };

    if let Err(err) = codec::write_message(&mut stream, &reply).await {
        state
            .logger
            .error(format!("failed writing reply to {}: {}", peer, err));
    }
}
