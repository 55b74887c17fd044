//! Transformations that restructure memories: compaction, splitting into
//! independent partitions, wholesale duplication, and dual port allocation.

mod cluster;
mod compact;
mod copy;
mod dual_port;
mod split;

pub use cluster::{build_location_maps, BaseLocationMap, LocationCluster};
pub use compact::compact;
pub use copy::{copy_memory, copy_value, correlated_location, MemoryCopy};
pub use dual_port::{balance_contexts, balance_reads, DualPortOptions};
pub use split::split_memories;
