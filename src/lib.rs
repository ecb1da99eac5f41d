//! # shardflow
//!
//! A distributed, parallel data-processing engine core: a lazy dataset DAG,
//! a stage planner that cuts the graph at shuffle boundaries, a fused
//! per-partition pipeline executor, a disk-backed shuffle subsystem, and an
//! action driver that dispatches tasks and combines their partial results.
//!
//! This crate is the *core* in the sense spec.md §1 draws the line: cluster
//! membership, the driver/worker RPC transport, the on-disk block-transfer
//! mechanism, the CLI, auth, and the object-storage/columnar-file SDK
//! bindings are out of scope, appearing only as the typed ports
//! ([`runtime::WorkerPool`], [`runtime::ShuffleTransport`],
//! [`export::ObjectStore`]) this crate calls through.
//!
//! ## Quick start
//!
//! ```no_run
//! use shardflow::config::RunnerConfig;
//! use shardflow::dataset::from_vec;
//! use shardflow::graph::Context;
//!
//! # fn main() -> anyhow::Result<()> {
//! let context = Context::default();
//! let lines = vec!["a b".to_string(), "a c".to_string()];
//! let counts = from_vec(&context, lines, 2)
//!     .flat_map(|line: &String| line.split_whitespace().map(|w| w.to_string()).collect::<Vec<_>>())
//!     .map(|w: &String| (w.clone(), 1u64))
//!     .reduce_by_key(|a: &u64, b: &u64| a + b, 2);
//!
//! let config = RunnerConfig::default();
//! let result = counts.collect(&config)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module map
//!
//! - [`dataset_id`], [`graph`]: the DAG registry (spec §3).
//! - [`erased`], [`canonical`]: type-erasure and canonical key serialization
//!   used to move data across shuffle boundaries.
//! - [`partitioner`], [`rng`]: hash/range partitioners and the fixed xorshift
//!   RNG backing `sample` (spec §4.1).
//! - [`partition`]: partition metadata and the per-worker memory manager
//!   (spec §4.2).
//! - [`operator`], [`narrow_ops`]: the operator catalog (spec §4.3).
//! - [`dataset`]: the typed `Dataset<T>` API users chain transforms on.
//! - [`sources`]: source adapters (spec §4.3, §4.7).
//! - [`pipeline_exec`]: the fused narrow-chain executor (spec §4.4).
//! - [`shuffle`]: disk-backed shuffle I/O (spec §4.6).
//! - [`runtime`]: the worker-pool/shuffle-transport ports and their local
//!   (in-process) implementations.
//! - [`stage`], [`driver`]: the stage planner and action driver (spec §4.5).
//! - [`actions`]: the terminal action surface (spec §6).
//! - [`combiners`]: ready-made `Aggregator` implementations.
//! - [`export`]: `save`/`stream` export actions (spec §6).
//! - [`config`], [`error`], [`metrics`]: the ambient runtime stack.
//! - [`testing`]: collection-comparison assertions for this crate's own
//!   tests and downstream users'.

pub mod actions;
pub mod canonical;
pub mod combiners;
pub mod config;
pub mod dataset;
pub mod dataset_id;
pub mod driver;
pub mod erased;
pub mod error;
pub mod export;
pub mod graph;
pub mod metrics;
pub mod narrow_ops;
pub mod operator;
pub mod partition;
pub mod partitioner;
pub mod pipeline_exec;
pub mod rng;
pub mod runtime;
pub mod shuffle;
pub mod sources;
pub mod stage;
pub mod testing;

pub use actions::RunOptions;
pub use config::RunnerConfig;
pub use dataset::{Dataset, RFBound, from_vec};
pub use dataset_id::DatasetId;
pub use error::{EngineError, Result};
pub use export::{ObjectStore, SaveOptions, StreamOptions};
pub use graph::Context;
