//! Session-scoped registry for named, disk-backed collections.
//! - `DataRegistry` maps logical names to in-memory values or disk containers,
//!   reconciling loaded file state with caller-supplied initial values.
//! - `storage` holds the persist-on-mutation container types.
//! - `SaveDaemon` flushes registered entries in the background on a timer.

pub mod binding;
pub mod daemon;
pub mod errors;
pub mod registry;
pub mod storage;
pub mod value;

pub use binding::{CodecOptions, FileBindery, FileBinding, SaveMode};
pub use daemon::{DaemonState, SaveDaemon};
pub use errors::RegistryError;
pub use registry::{DataRegistry, StoredEntry};
pub use storage::{DiskLog, DiskMap, DiskSet};
pub use value::{DataValue, Scalar};
