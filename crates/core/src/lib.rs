//! ps-core: core library for the pshell storage client
//!
//! This crate provides the backend-agnostic heart of pshell:
//! - Virtual path canonicalization and the mount router
//! - The `Backend` contract every storage adapter implements
//! - Endpoint descriptors, profiles, and the session manager
//! - The concurrent, cancellable transfer engine
//!
//! It is independent of any storage SDK; adapters live in their own crates
//! and the engine and router are tested against in-memory fakes.

pub mod backend;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod router;
pub mod session;
pub mod transfer;
pub mod vpath;

pub use backend::{
    Backend, BackendFactory, Confirm, InfoStream, ItemStream, LifecycleAction, LifecycleRuleSpec,
    LineStream, ProgressFn, PutOutcome, TransferItem, TransferPlan, noop_progress,
    plan_local_uploads,
};
pub use config::{Config, ConfigManager, DEFAULT_PROFILE, Profile};
pub use endpoint::{
    BackendKind, Credentials, DelegateLifetime, EndpointDescriptor, RetryConfig, SsoKeySet,
    TimeoutConfig,
};
pub use error::{Error, Result};
pub use router::{Mount, MountStatus, MountTable};
pub use session::{MountAttempt, SessionManager};
pub use transfer::{
    CounterSnapshot, DEFAULT_WORKERS, ItemOp, ItemResult, TransferCounters, TransferEngine,
    TransferReport,
};
pub use vpath::VPath;
