//! Export actions (spec §6 `save`/`stream`): one data file per partition,
//! optionally gzip- or columnar-compressed, written through a small
//! [`ObjectStore`] port so the destination scheme can vary without the
//! writer itself changing — mirroring spec §1's framing of S3/Azure as
//! "external collaborators... specified only by the interfaces the core
//! uses" rather than SDKs this crate links.
//!
//! Per spec §7, a failed per-partition upload is logged and does not fail
//! the job (`EngineError::UploadError` is non-fatal); `save`/`stream` only
//! return an error for a job-level failure (planning, shuffle, task panics).

use crate::actions::RunOptions;
use crate::config::RunnerConfig;
use crate::dataset::{Dataset, RFBound};
use crate::error::{EngineError, Result};
use crate::runtime::{LocalPool, LocalTransport, ShuffleTransport, WorkerPool};
use crate::shuffle::ShuffleRegistry;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Destination for a `save`d partition file (spec §6's "destination schemes
/// recognized in the path URI").
pub trait ObjectStore: Send + Sync {
    /// Open a fresh writer for `key` (a full path or object name), truncating
    /// any existing object at that key.
    fn create(&self, key: &str) -> io::Result<Box<dyn Write + Send>>;
}

/// The only binding this crate implements directly. S3 and Azure blob are
/// out of scope (spec §1) — `store_for_uri` recognizes their schemes but
/// returns an error instead of fabricating a cloud SDK dependency; a real
/// deployment supplies its own `ObjectStore` for those schemes.
pub struct LocalObjectStore;

impl ObjectStore for LocalObjectStore {
    fn create(&self, key: &str) -> io::Result<Box<dyn Write + Send>> {
        let path = Path::new(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

/// Resolve a `save`/`stream` destination URI to the store owning its scheme,
/// plus the scheme-stripped path to pass to [`ObjectStore::create`].
pub fn store_for_uri(uri: &str) -> anyhow::Result<(Arc<dyn ObjectStore>, String)> {
    if let Some(rest) = uri.strip_prefix("s3://") {
        anyhow::bail!("s3://{rest}: S3 is an external collaborator (spec §1); bind a real ObjectStore for it")
    } else if let Some(rest) = uri.strip_prefix("azure://") {
        anyhow::bail!("azure://{rest}: Azure blob is an external collaborator (spec §1); bind a real ObjectStore for it")
    } else {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok((Arc::new(LocalObjectStore) as Arc<dyn ObjectStore>, path.to_string()))
    }
}

/// Options for [`Dataset::save`] (spec §6's `gzip`/`parquet` column).
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveOptions {
    pub gzip: bool,
    pub parquet: bool,
}

fn write_plain<T: Serialize>(mut writer: Box<dyn Write + Send>, items: &[T]) -> anyhow::Result<()> {
    for item in items {
        writer.write_all(&serde_json::to_vec(item)?)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(feature = "source-gzip")]
fn write_gzip<T: Serialize>(writer: Box<dyn Write + Send>, items: &[T]) -> anyhow::Result<()> {
    let mut gz = flate2::write::GzEncoder::new(writer, flate2::Compression::fast());
    for item in items {
        gz.write_all(&serde_json::to_vec(item)?)?;
        gz.write_all(b"\n")?;
    }
    gz.finish()?;
    Ok(())
}

#[cfg(not(feature = "source-gzip"))]
fn write_gzip<T: Serialize>(_writer: Box<dyn Write + Send>, _items: &[T]) -> anyhow::Result<()> {
    anyhow::bail!("gzip export requested but the crate was built without the `source-gzip` feature")
}

/// Columnar export, grounded in the teacher's `io::parquet::write_parquet_vec`
/// (schema inferred via `SchemaLike::from_type`, flushed every 10,000 rows
/// per spec §6).
#[cfg(feature = "source-parquet")]
fn write_parquet<T: RFBound>(base_path: &str, pid: usize, items: &[T]) -> anyhow::Result<()> {
    use arrow::datatypes::FieldRef;
    use parquet::arrow::arrow_writer::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use serde_arrow::schema::{SchemaLike, TracingOptions};
    use serde_arrow::to_record_batch;

    let dir = Path::new(base_path);
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("part-{pid:05}.parquet"));

    let fields: Vec<FieldRef> =
        Vec::<FieldRef>::from_type::<T>(TracingOptions::default()).map_err(|e| anyhow::anyhow!("infer parquet schema: {e}"))?;
    let first_batch = to_record_batch(&fields, &items[..items.len().min(10_000)].to_vec())?;
    let file = File::create(&path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, first_batch.schema(), Some(props))?;

    for chunk in items.chunks(10_000) {
        let batch = to_record_batch(&fields, &chunk.to_vec())?;
        writer.write(&batch)?;
    }
    writer.close()?;
    Ok(())
}

#[cfg(not(feature = "source-parquet"))]
fn write_parquet<T: RFBound>(_base_path: &str, _pid: usize, _items: &[T]) -> anyhow::Result<()> {
    anyhow::bail!("parquet export requested but the crate was built without the `source-parquet` feature")
}

fn write_partition_file<T: RFBound>(
    store: &dyn ObjectStore,
    base_path: &str,
    pid: usize,
    items: &[T],
    opts: &SaveOptions,
) -> anyhow::Result<()> {
    if opts.parquet {
        return write_parquet(base_path, pid, items);
    }
    let ext = if opts.gzip { "jsonl.gz" } else { "jsonl" };
    let key = format!("{base_path}/part-{pid:05}.{ext}");
    let writer = store.create(&key)?;
    if opts.gzip {
        write_gzip(writer, items)
    } else {
        write_plain(writer, items)
    }
}

/// Options for [`Dataset::stream`] (spec §6's `gzip`/`end` column).
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamOptions {
    pub gzip: bool,
    /// Finalize the stream once every partition has been piped through: for
    /// gzip, write the trailer (`try_finish`); for plain output, just flush.
    pub end: bool,
}

impl<T: RFBound> Dataset<T> {
    /// `save(path, opts)` (spec §6): dispatches the tail's result stage and
    /// writes each partition's rows to its own file under `path`, in
    /// partition order — one writer opened per partition, closed before the
    /// next partition's rows are written (spec §6's columnar writer
    /// lifecycle, generalized to every format here).
    pub fn save(&self, config: &RunnerConfig, path: &str, opts: &SaveOptions) -> Result<()> {
        let (store, base_path) = store_for_uri(path).map_err(|source| EngineError::UploadError { partition: 0, source })?;
        let pool = LocalPool::default_sized(config)
            .map_err(|e| EngineError::ProgrammerError(format!("failed to start local worker pool: {e}")))?;
        let transport: Arc<dyn ShuffleTransport> = Arc::new(LocalTransport);
        let registry = Arc::new(ShuffleRegistry::new());

        let opts = *opts;
        let mut next_pid = 0usize;
        crate::driver::run_job::<T, ()>(&self.context, &pool, transport, registry, self.id, &RunOptions::default(), (), move |(), items| {
            let pid = next_pid;
            next_pid += 1;
            if let Err(source) = write_partition_file(store.as_ref(), &base_path, pid, &items, &opts) {
                log::warn!("{}", EngineError::UploadError { partition: pid, source });
            }
        })
        .map_err(|source| EngineError::TaskError { stage: 0, partition: 0, source })
    }

    /// `stream(opts)` (spec §6): pipes every partition's rows, in partition
    /// order, through `sink` as newline-delimited canonical-serialized
    /// records, optionally gzip-wrapped.
    pub fn stream(&self, config: &RunnerConfig, sink: Box<dyn Write + Send>, opts: &StreamOptions) -> Result<()> {
        let pool = LocalPool::default_sized(config)
            .map_err(|e| EngineError::ProgrammerError(format!("failed to start local worker pool: {e}")))?;
        let transport: Arc<dyn ShuffleTransport> = Arc::new(LocalTransport);
        let registry = Arc::new(ShuffleRegistry::new());

        #[cfg(feature = "source-gzip")]
        let sink: Box<dyn Write + Send> = if opts.gzip {
            Box::new(flate2::write::GzEncoder::new(sink, flate2::Compression::fast()))
        } else {
            sink
        };
        #[cfg(not(feature = "source-gzip"))]
        if opts.gzip {
            return Err(EngineError::UploadError {
                partition: 0,
                source: anyhow::anyhow!("gzip stream requested but the crate was built without the `source-gzip` feature"),
            });
        }

        let sink = Arc::new(Mutex::new(sink));
        let end = opts.end;
        let sink_for_job = Arc::clone(&sink);

        crate::driver::run_job::<T, ()>(&self.context, &pool, transport, registry, self.id, &RunOptions::default(), (), move |(), items| {
            let mut guard = sink_for_job.lock().unwrap();
            for item in &items {
                let line = match serde_json::to_vec(item) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::warn!("stream: failed to serialize a record: {e}");
                        continue;
                    }
                };
                if let Err(e) = guard.write_all(&line).and_then(|_| guard.write_all(b"\n")) {
                    log::warn!("stream: failed to write a chunk: {e}");
                }
            }
        })
        .map_err(|source| EngineError::TaskError { stage: 0, partition: 0, source })?;

        if end {
            let mut guard = sink.lock().unwrap();
            let _ = guard.flush();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::from_vec;
    use crate::graph::Context;

    #[test]
    fn save_writes_one_file_per_partition() {
        let dir = tempfile::tempdir().unwrap();
        let context = Context::default();
        let ds = from_vec(&context, vec![1, 2, 3, 4], 2);

        ds.save(&RunnerConfig::default(), &dir.path().display().to_string(), &SaveOptions::default())
            .unwrap();

        let mut files: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        files.sort();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn save_rejects_s3_scheme_as_external() {
        let context = Context::default();
        let ds = from_vec(&context, vec![1, 2], 1);
        let err = ds.save(&RunnerConfig::default(), "s3://bucket/key", &SaveOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn stream_writes_every_partition_in_order() {
        let context = Context::default();
        let ds = from_vec(&context, vec![1, 2, 3, 4, 5], 3);
        let buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().write(data)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        ds.stream(
            &RunnerConfig::default(),
            Box::new(SharedBuf(Arc::clone(&buf))),
            &StreamOptions { gzip: false, end: true },
        )
        .unwrap();

        let written = buf.lock().unwrap().clone();
        let text = String::from_utf8(written).unwrap();
        assert_eq!(text.lines().count(), 5);
    }
}
