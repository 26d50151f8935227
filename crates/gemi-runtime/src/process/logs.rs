//! Forwarding of backend stdout/stderr into `tracing`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::debug;

/// Target used for every line the backend prints.
pub const BACKEND_LOG_TARGET: &str = "gemi::backend";

/// Lines kept for crash reports.
const TAIL_CAPACITY: usize = 50;

/// The most recent lines the backend printed, newest last.
#[derive(Debug, Clone, Default)]
pub struct LogTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogTail {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() >= TAIL_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }
}

/// Take the child's piped stdout/stderr and forward them line by line.
///
/// Lines are decoded lossily; the backend's output is not guaranteed to be
/// valid UTF-8.
pub fn spawn_log_readers(child: &mut Child, tail: &LogTail) -> Vec<JoinHandle<()>> {
    let pid = child.id();
    let mut readers = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward(stdout, "stdout", pid, tail.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward(stderr, "stderr", pid, tail.clone())));
    }

    readers
}

async fn forward<R>(reader: R, stream: &'static str, pid: Option<u32>, tail: LogTail)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!(target: BACKEND_LOG_TARGET, pid, stream, "{}", line);
                tail.push(line);
            }
            Err(e) => {
                debug!(target: BACKEND_LOG_TARGET, pid, stream, "Output reader stopped: {}", e);
                break;
            }
        }
    }
}
