use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The reply counterpart to `Request`, one variant per request kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Reply {
    AllocateGpus {
        success: bool,
        device_indices: Vec<u32>,
        pids: Vec<u32>,
        handles: Vec<String>,
    },
    ReleaseGpus {
        success: bool,
        failed_handles: Vec<String>,
    },
    GetSystemInfo {
        /// Recognized keys: `driver_version` (string), `device_num` (int).
        /// A `BTreeMap` keeps wire output deterministic.
        info: BTreeMap<String, serde_json::Value>,
    },
}

impl Reply {
    /// An `AllocateGpus` failure carries empty lists, per the wire contract.
    pub fn allocate_failed() -> Self {
        Reply::AllocateGpus {
            success: false,
            device_indices: Vec::new(),
            pids: Vec::new(),
            handles: Vec::new(),
        }
    }
}
