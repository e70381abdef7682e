use serde::{Deserialize, Serialize};

/// One of the three request variants the wire endpoint understands.
///
/// Tagged on the wire as `{"type": "AllocateGpus", ...}`, matching the
/// tagged-union style used for wire messages elsewhere in this broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    AllocateGpus {
        num_gpus: u32,
        exclusive: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        mem_size: Option<u64>,
    },
    ReleaseGpus {
        handles: Vec<String>,
    },
    GetSystemInfo,
}
