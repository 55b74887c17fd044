//! This library contains the byte-level memory model used by the partitioning and
//! port allocation passes: memories made of allocations, locations denoting ranges
//! within them, accesses that touch sets of locations, and the pointers and location
//! constants that feed those accesses their addresses.
//!
//! Everything lives in a single [`Design`] arena and is addressed through small
//! copyable handles. Designs have a canonical textual form produced by their
//! [`Display`](std::fmt::Display) implementation and read back by [`parse`].

mod value;
mod location;
mod design;
mod resolver;
mod print;
mod parse;
mod isomorphic;

pub use value::{LogicalValue, RangeNotRemovable};
pub use location::Location;
pub(crate) use location::LocationData;
pub use design::{
    AccessKind, Allocation, Design, LValue, LocationConstant, Memory, MemoryStyle, Pointer, Port, Task,
};
pub use resolver::{AddressResolver, AddressSource, SourceTable};
pub use parse::{parse, ParseError};
pub use isomorphic::{isomorphic, NotIsomorphic};
