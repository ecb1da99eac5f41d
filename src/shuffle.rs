//! Disk-backed shuffle I/O (spec §4.6): map tasks spill one file per output
//! bucket; reduce tasks read back every file registered for their bucket, in
//! upstream-task order.

use crate::dataset_id::DatasetId;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A registered shuffle output file (spec §4.6, §6).
#[derive(Clone, Debug)]
pub struct ShuffleDescriptor {
    pub host: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Flush threshold for a single shuffle writer (spec §4.6).
pub const FLUSH_BYTES: usize = 64 * 1024;

/// Buffered, newline-delimited writer for one map task's output to one
/// bucket. Flushes to disk once the in-memory buffer reaches
/// [`FLUSH_BYTES`], and again on [`ShuffleWriter::finish`].
pub struct ShuffleWriter {
    file: BufWriter<File>,
    buffer: Vec<u8>,
    total_bytes: u64,
    path: PathBuf,
}

impl ShuffleWriter {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        log::debug!("opened shuffle file {}", path.display());
        Ok(Self {
            file: BufWriter::new(file),
            buffer: Vec::with_capacity(FLUSH_BYTES),
            total_bytes: 0,
            path,
        })
    }

    /// Append one canonical-serialized record as a newline-delimited line.
    pub fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.buffer.extend_from_slice(record);
        self.buffer.push(b'\n');
        if self.buffer.len() >= FLUSH_BYTES {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buffer)?;
        self.total_bytes += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Flush any remaining buffered bytes and return this file's descriptor.
    pub fn finish(mut self, host: impl Into<String>) -> std::io::Result<ShuffleDescriptor> {
        self.flush()?;
        self.file.flush()?;
        log::debug!(
            "closed shuffle file {} ({} bytes)",
            self.path.display(),
            self.total_bytes
        );
        Ok(ShuffleDescriptor {
            host: host.into(),
            path: self.path,
            size: self.total_bytes,
        })
    }
}

/// Reads back every newline-delimited record from a shuffle file.
pub fn read_records(descriptor: &ShuffleDescriptor) -> std::io::Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(&descriptor.path)?;
    Ok(bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.to_vec())
        .collect())
}

/// Registers, per wide dataset, the descriptors written to each of its
/// output buckets by every map task that has completed so far (spec §4.6
/// `files[outputPartition]`).
#[derive(Default)]
pub struct ShuffleRegistry {
    // dataset -> bucket -> descriptors, in the order map tasks completed.
    buckets: Mutex<HashMap<DatasetId, Vec<Vec<ShuffleDescriptor>>>>,
}

impl ShuffleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_bucket_count(&self, dataset: DatasetId, bucket_count: usize) {
        let mut map = self.buckets.lock().unwrap();
        let entry = map.entry(dataset).or_default();
        if entry.len() < bucket_count {
            entry.resize_with(bucket_count, Vec::new);
        }
    }

    /// Register one map task's output descriptor for `dataset`'s `bucket`.
    pub fn register(&self, dataset: DatasetId, bucket_count: usize, bucket: usize, descriptor: ShuffleDescriptor) {
        self.ensure_bucket_count(dataset, bucket_count);
        let mut map = self.buckets.lock().unwrap();
        map.get_mut(&dataset).unwrap()[bucket].push(descriptor);
    }

    /// All descriptors registered so far for `dataset`'s `bucket`, in
    /// upstream-task completion order (spec §5 "a non-commutative combiner
    /// sees a deterministic input sequence" relies on callers reading in
    /// upstream partition id order when that matters; plain `AggregateByKey`
    /// reduction does not care about this order).
    pub fn descriptors_for(&self, dataset: DatasetId, bucket: usize) -> Vec<ShuffleDescriptor> {
        self.buckets
            .lock()
            .unwrap()
            .get(&dataset)
            .and_then(|buckets| buckets.get(bucket))
            .cloned()
            .unwrap_or_default()
    }

    /// Read every record across all descriptors registered for `dataset`'s
    /// `bucket`, in descriptor registration order.
    pub fn read_bucket(&self, dataset: DatasetId, bucket: usize) -> Vec<Vec<u8>> {
        self.descriptors_for(dataset, bucket)
            .iter()
            .flat_map(|d| read_records(d).unwrap_or_default())
            .collect()
    }
}

/// A worker-local scratch directory for shuffle files (spec §3's "shuffle
/// files live under the executing worker's scratch directory").
#[derive(Clone)]
pub struct ScratchDir {
    root: PathBuf,
    host: String,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            host: host.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path for a fresh shuffle file, named by a random uuid (spec §4.6
    /// `{worker-scratch}/shuffle/{uuid}`).
    pub fn new_shuffle_file_path(&self) -> PathBuf {
        self.root
            .join("shuffle")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

/// Shared handle combining a scratch directory and the shuffle registry for
/// one job run.
pub struct ShuffleContext {
    pub scratch: ScratchDir,
    pub registry: Arc<ShuffleRegistry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shuffle-test");
        let mut writer = ShuffleWriter::create(&path).unwrap();
        writer.write_record(b"one").unwrap();
        writer.write_record(b"two").unwrap();
        let descriptor = writer.finish("localhost").unwrap();
        let records = read_records(&descriptor).unwrap();
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn registry_accumulates_across_tasks() {
        let registry = ShuffleRegistry::new();
        let ds = DatasetId::new(0);
        let dir = tempfile::tempdir().unwrap();

        for i in 0..3 {
            let path = dir.path().join(format!("task-{i}"));
            let mut writer = ShuffleWriter::create(&path).unwrap();
            writer.write_record(format!("rec-{i}").as_bytes()).unwrap();
            let descriptor = writer.finish("localhost").unwrap();
            registry.register(ds, 2, 0, descriptor);
        }

        let records = registry.read_bucket(ds, 0);
        assert_eq!(records.len(), 3);
    }
}
