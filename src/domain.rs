use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One Prometheus target group: a set of instances sharing a label set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

pub type TargetGroupList = Vec<TargetGroup>;

/// Successful cache payload as stored by both cache bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub updated_timestamp: f64,
    pub results: TargetGroupList,
}

/// Error-shadow cache payload (split mode only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub error_type: String,
    pub message: String,
    pub traceback: String,
    pub worker_id: String,
    pub job_id: String,
    pub path: String,
    pub args: BTreeMap<String, String>,
    pub timestamp: String,
    pub processing_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCacheEntry {
    pub updated_timestamp: f64,
    pub status: String,
    pub error_details: ErrorDetails,
}

/// A request's normalized identity plus the raw arguments the generator
/// should be invoked with.
#[derive(Debug, Clone)]
pub struct RequestTarget {
    pub fp: String,
    pub path: String,
    pub args: BTreeMap<String, String>,
}

/// Per-fingerprint refresh state (monolith dispatcher).
#[derive(Debug, Clone)]
pub struct Task {
    pub fp: String,
    pub path: String,
    pub args: BTreeMap<String, String>,
    pub need_update: bool,
    pub running: bool,
}

impl Task {
    pub fn new(fp: String, path: String, args: BTreeMap<String, String>) -> Self {
        Task {
            fp,
            path,
            args,
            need_update: true,
            running: false,
        }
    }
}

/// A unit of work on the split-mode queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub fp: String,
    pub path: String,
    pub args: BTreeMap<String, String>,
}

impl Job {
    pub fn new(fp: String, path: String, args: BTreeMap<String, String>, now: f64) -> Self {
        let job_id = format!("{}:{}", fp, now as i64);
        Job {
            job_id,
            fp,
            path,
            args,
        }
    }
}
