//! Drift Scan - Scan orchestration engine
//!
//! This crate provides a bounded-concurrency task scheduler, an LRU result
//! cache with TTL and persistence, and a module dependency graph.

pub mod cache;
pub mod graph;
pub mod reporter;
pub mod scheduler;
pub mod task;

pub use cache::{
    compute_file_hash, compute_hash, CacheEntry, CacheError, CacheOptions, CacheStats, ResultCache,
};
pub use graph::{
    CycleReport, DependencyEdge, ExportInfo, ExportKind, GraphError, GraphOptions, ImportInfo,
    ImportKind, ModuleGraph, ModuleNode,
};
pub use reporter::{
    CollectingReporter, ReporterRegistry, SchedulerEvent, SchedulerReporter, SubscriptionId,
    TracingReporter,
};
pub use scheduler::{
    BatchResult, Processor, SchedulerError, SchedulerOptions, SchedulerStats, TaskScheduler,
};
pub use task::{IdGenerator, SequentialIds, Task, TaskError, TaskId, TaskStatus, UuidIds};
