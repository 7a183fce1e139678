//! Shared helpers for the loader integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex};

use treeline::Network;

/// In-process allgather shared by the simulated ranks of one test.
///
/// Each rank copies its byte range into the shared buffer, waits on the
/// barrier, then reads the gathered whole. The trailing barrier keeps a
/// fast rank from starting the next collective before everyone has read.
pub struct SharedGather {
    buf: Mutex<Vec<u8>>,
    barrier: Barrier,
}

impl SharedGather {
    pub fn new(num_machines: usize) -> Arc<Self> {
        Arc::new(Self {
            buf: Mutex::new(Vec::new()),
            barrier: Barrier::new(num_machines),
        })
    }
}

/// One rank's handle onto a [`SharedGather`].
pub struct RankNetwork {
    shared: Arc<SharedGather>,
    rank: usize,
}

impl RankNetwork {
    pub fn new(shared: Arc<SharedGather>, rank: usize) -> Self {
        Self { shared, rank }
    }
}

impl Network for RankNetwork {
    fn allgather(&self, input: &[u8], starts: &[usize], lens: &[usize], output: &mut [u8]) {
        {
            let mut buf = self.shared.buf.lock().unwrap();
            if buf.len() < output.len() {
                buf.resize(output.len(), 0);
            }
            let start = starts[self.rank];
            let len = lens[self.rank];
            buf[start..start + len].copy_from_slice(&input[start..start + len]);
        }
        self.shared.barrier.wait();
        output.copy_from_slice(&self.shared.buf.lock().unwrap()[..output.len()]);
        self.shared.barrier.wait();
    }
}

/// Write a file under `dir` and return its path.
pub fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}
