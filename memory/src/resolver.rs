use std::collections::{BTreeMap, BTreeSet};

use crate::{Design, LValue, Location, LocationConstant, Pointer};

/// The origin of an address that can steer an access: either a pointer stored in
/// some allocation, or a free-standing location constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressSource {
    Pointer(Pointer),
    Constant(LocationConstant),
}

impl AddressSource {
    pub fn target(self, design: &Design) -> Location {
        match self {
            AddressSource::Pointer(pointer) => design.pointer_target(pointer),
            AddressSource::Constant(constant) => design.constant_target(constant),
        }
    }

    pub fn set_target(self, design: &mut Design, target: Location) {
        match self {
            AddressSource::Pointer(pointer) => design.set_pointer_target(pointer, target),
            AddressSource::Constant(constant) => design.set_constant_target(constant, target),
        }
    }
}

/// Answers which address sources can feed a given access.
///
/// Two accesses that share a source must end up in the same memory even when their
/// recorded locations are disjoint, because at run time the shared source can steer
/// either access to the same bytes.
pub trait AddressResolver {
    fn address_sources(&self, lvalue: LValue) -> BTreeSet<AddressSource>;
}

/// A resolver backed by a plain table, either snapshotted from the source
/// annotations of a design or built up by hand.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    sources: BTreeMap<LValue, BTreeSet<AddressSource>>,
}

impl SourceTable {
    pub fn new() -> SourceTable {
        SourceTable { sources: BTreeMap::new() }
    }

    pub fn collect(design: &Design) -> SourceTable {
        let mut table = SourceTable::new();
        for memory in design.iter_memories() {
            for lvalue in design.lvalues_of(memory) {
                for &source in design.lvalue_sources(lvalue) {
                    table.insert(lvalue, source);
                }
            }
        }
        table
    }

    pub fn insert(&mut self, lvalue: LValue, source: AddressSource) {
        self.sources.entry(lvalue).or_default().insert(source);
    }
}

impl AddressResolver for SourceTable {
    fn address_sources(&self, lvalue: LValue) -> BTreeSet<AddressSource> {
        self.sources.get(&lvalue).cloned().unwrap_or_default()
    }
}
