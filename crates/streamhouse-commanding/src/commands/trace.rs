//! Thread inventory for `consumers.trace`.
//!
//! On Linux every live thread is enumerated from `/proc/self/task`. Only the
//! calling thread can capture its own stack; every other thread gets
//! [`UNAVAILABLE`] instead of a backtrace. Elsewhere only the calling thread
//! is reported.

use serde_json::{json, Map, Value};
use std::backtrace::Backtrace;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Placeholder for threads whose stack cannot be captured.
pub const UNAVAILABLE: &str = "<backtrace unavailable>";

/// Label and backtrace of one live thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    /// Synthetic id: hash of the thread identity XOR the process id, base 36.
    pub id: String,
    pub label: String,
    pub backtrace: String,
}

/// Snapshot every live thread of the current process.
pub fn capture(pid: u32) -> Vec<ThreadSnapshot> {
    #[cfg(target_os = "linux")]
    {
        if let Some(threads) = capture_proc(pid) {
            return threads;
        }
    }

    vec![capture_current(pid)]
}

/// Render snapshots as the `threads` object of a trace result.
pub fn to_fields(threads: Vec<ThreadSnapshot>) -> Map<String, Value> {
    threads
        .into_iter()
        .map(|t| {
            (
                t.id,
                json!({ "label": t.label, "backtrace": t.backtrace }),
            )
        })
        .collect()
}

fn capture_current(pid: u32) -> ThreadSnapshot {
    let current = std::thread::current();
    let label = current.name().unwrap_or("unnamed").to_string();

    ThreadSnapshot {
        id: synthetic_id(&format!("{:?}", current.id()), pid),
        label,
        backtrace: Backtrace::force_capture().to_string(),
    }
}

#[cfg(target_os = "linux")]
fn capture_proc(pid: u32) -> Option<Vec<ThreadSnapshot>> {
    let current_tid = std::fs::read_link("/proc/thread-self")
        .ok()
        .and_then(|link| link.file_name().map(|n| n.to_string_lossy().into_owned()));

    let mut threads = Vec::new();

    for entry in std::fs::read_dir("/proc/self/task").ok()?.flatten() {
        let tid = entry.file_name().to_string_lossy().into_owned();
        let comm = std::fs::read_to_string(entry.path().join("comm"))
            .map(|c| c.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let backtrace = if current_tid.as_deref() == Some(tid.as_str()) {
            Backtrace::force_capture().to_string()
        } else {
            UNAVAILABLE.to_string()
        };

        threads.push(ThreadSnapshot {
            id: synthetic_id(&tid, pid),
            label: format!("{} (tid {})", comm, tid),
            backtrace,
        });
    }

    if threads.is_empty() {
        None
    } else {
        Some(threads)
    }
}

fn synthetic_id(identity: &str, pid: u32) -> String {
    let mut hasher = DefaultHasher::new();
    identity.hash(&mut hasher);
    to_base36(hasher.finish() ^ u64::from(pid))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
