//! Disk-backed container types.
//!
//! Each container keeps its working copy in memory behind a lock and rewrites
//! a `data.json` snapshot inside its backing directory after every mutation,
//! so the directory alone is enough to reconstruct the container on the next
//! run. Deleting the directory (see `DataRegistry::clean`) reclaims the space.

mod disk_log;
mod disk_map;
mod disk_set;

pub use disk_log::DiskLog;
pub use disk_map::DiskMap;
pub use disk_set::DiskSet;

pub(crate) const DATA_FILE: &str = "data.json";
