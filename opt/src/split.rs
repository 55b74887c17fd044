use std::collections::{BTreeMap, BTreeSet};

use prjfabric_memory::{
    AddressResolver, AddressSource, Allocation, Design, LValue, Location, Memory, Pointer,
};

use crate::compact::source_pointers;
use crate::copy::{copy_value, correlated_location};

/// One partition of a memory under construction: the accesses that have to
/// stay together, the bytes they can touch, and the address sources feeding
/// them. Two accesses belong to the same partition when their locations can
/// alias or when they share an address source.
#[derive(Debug)]
struct MemoryContents {
    accesses: BTreeSet<LValue>,
    locations: BTreeSet<Location>,
    sources: BTreeSet<AddressSource>,
    correlation: BTreeMap<Location, Location>,
}

impl MemoryContents {
    fn new(design: &Design, memory: Memory, lvalue: LValue, sources: BTreeSet<AddressSource>) -> MemoryContents {
        MemoryContents {
            accesses: BTreeSet::from([lvalue]),
            locations: design.accesses_of(memory, lvalue).clone(),
            sources,
            correlation: BTreeMap::new(),
        }
    }

    fn overlaps(
        &self,
        design: &Design,
        locations: &BTreeSet<Location>,
        sources: &BTreeSet<AddressSource>,
    ) -> bool {
        if self.sources.intersection(sources).next().is_some() {
            return true;
        }
        locations
            .iter()
            .any(|&theirs| self.locations.iter().any(|&ours| design.overlaps(ours, theirs)))
    }

    fn add(&mut self, design: &Design, memory: Memory, lvalue: LValue, sources: BTreeSet<AddressSource>) {
        self.locations.extend(design.accesses_of(memory, lvalue).iter().copied());
        self.sources.extend(sources);
        self.accesses.insert(lvalue);
    }

    fn merge(&mut self, other: MemoryContents) {
        self.accesses.extend(other.accesses);
        self.locations.extend(other.locations);
        self.sources.extend(other.sources);
    }

    /// Materializes this partition as a memory of its own: the base
    /// allocations its locations reach are duplicated, and its accesses are
    /// rebound, their locations rebuilt on top of the duplicates. Address
    /// sources still point into the old memory afterwards; they are retargeted
    /// once every memory has been split.
    fn build_memory(&mut self, design: &mut Design, original: Memory) -> (Memory, BTreeMap<Pointer, Pointer>) {
        let mut bases = Vec::new();
        for &allocation in design.allocations_of(original) {
            if self.locations.iter().any(|&location| design.absolute_base(location) == allocation) {
                bases.push(allocation);
            }
        }

        let memory = design.add_memory(design.style(original));
        let port = design.add_port(memory, false);
        let mut pointers = BTreeMap::new();
        for base in bases {
            let value = design.value_of(base).clone();
            let (value, map) = copy_value(design, &value);
            let ident = design.ident_of(base).to_owned();
            let duplicate = design.add_allocation(memory, &ident, value);
            pointers.extend(map);
            self.correlation.insert(design.root_location(base), design.root_location(duplicate));
        }

        for lvalue in self.accesses.iter().copied().collect::<Vec<_>>() {
            let locations = design.remove_access(original, lvalue);
            design.bind_lvalue(lvalue, memory);
            design.replace_access_locations(memory, lvalue, Default::default());
            for location in locations {
                let location = correlated_location(design, &self.correlation, location);
                design.add_access(memory, lvalue, location);
            }
            design.attach_access(port, lvalue);
        }
        (memory, pointers)
    }

    /// Points the address sources of this partition's accesses at the
    /// partition's own copy of the bytes. A source that was duplicated along
    /// with a split memory is represented by its copies from here on.
    fn retarget_address_sources(
        &self,
        design: &mut Design,
        correlations: &BTreeMap<Pointer, BTreeSet<Pointer>>,
    ) {
        for &lvalue in &self.accesses {
            let mut rewritten = BTreeSet::new();
            for source in design.lvalue_sources(lvalue).clone() {
                match source {
                    AddressSource::Pointer(pointer) => {
                        let correlated = correlations
                            .get(&pointer)
                            .cloned()
                            .unwrap_or_else(|| BTreeSet::from([pointer]));
                        for pointer in correlated {
                            let target = design.pointer_target(pointer);
                            let target = correlated_location(design, &self.correlation, target);
                            design.set_pointer_target(pointer, target);
                            rewritten.insert(AddressSource::Pointer(pointer));
                        }
                    }
                    AddressSource::Constant(constant) => {
                        let target = design.constant_target(constant);
                        let target = correlated_location(design, &self.correlation, target);
                        design.set_constant_target(constant, target);
                        rewritten.insert(AddressSource::Constant(constant));
                    }
                }
            }
            design.set_lvalue_sources(lvalue, rewritten);
        }
    }
}

/// Breaks every memory apart into the smallest partitions whose accesses are
/// provably independent, so that each part can later be implemented with a
/// single port of its own. Returns the number of memories created.
///
/// Partitioning is decided per access: byte overlap between access locations
/// or a shared address source forces two accesses into the same partition, and
/// a single access bridging two partitions fuses them. A memory whose accesses
/// all end up in one partition is left untouched.
pub fn split_memories(design: &mut Design, resolver: &impl AddressResolver) -> usize {
    let sources = source_pointers(design);
    let mut split: Vec<Vec<MemoryContents>> = Vec::new();
    let mut correlations: BTreeMap<Pointer, BTreeSet<Pointer>> = BTreeMap::new();
    let mut created = 0;

    for memory in design.iter_memories().collect::<Vec<_>>() {
        if design.is_implemented(memory) {
            continue;
        }
        let mut contents: Vec<MemoryContents> = Vec::new();
        for lvalue in design.lvalues_of(memory).collect::<Vec<_>>() {
            let sources = resolver.address_sources(lvalue);
            let locations = design.accesses_of(memory, lvalue);
            let mut hits = Vec::new();
            for (index, content) in contents.iter().enumerate() {
                if content.overlaps(design, locations, &sources) {
                    hits.push(index);
                }
            }
            match hits.first() {
                None => contents.push(MemoryContents::new(design, memory, lvalue, sources)),
                Some(&first) => {
                    for &index in hits.iter().skip(1).rev() {
                        let other = contents.remove(index);
                        contents[first].merge(other);
                    }
                    contents[first].add(design, memory, lvalue, sources);
                }
            }
        }
        if contents.len() <= 1 {
            continue;
        }
        // an allocation no partition reaches is dropped by splitting
        let touched: BTreeSet<Allocation> = contents
            .iter()
            .flat_map(|content| content.locations.iter().map(|&location| design.absolute_base(location)))
            .collect();
        if dropped_bytes_in_use(design, memory, &touched, &sources) {
            log::warn!("cannot split memory {}: bytes no access reaches are still referenced", memory.index());
            continue;
        }

        for content in &mut contents {
            let (_, pointers) = content.build_memory(design, memory);
            for (old, new) in pointers {
                correlations.entry(old).or_default().insert(new);
            }
            created += 1;
        }
        log::debug!("split memory {} into {} memories", memory.index(), contents.len());
        design.delete_memory(memory);
        split.push(contents);
    }

    for contents in &split {
        for content in contents {
            content.retarget_address_sources(design, &correlations);
        }
    }
    retarget_strays(design, &split);
    created
}

/// Allocations no partition touches are not copied into any new memory. The
/// memory cannot be split if their bytes hold an address source, or if a
/// pointer or constant that survives the split targets them.
fn dropped_bytes_in_use(
    design: &Design,
    memory: Memory,
    touched: &BTreeSet<Allocation>,
    sources: &BTreeSet<Pointer>,
) -> bool {
    let dropped = |allocation: Allocation| {
        design.memory_of(allocation) == memory && !touched.contains(&allocation)
    };
    for other in design.iter_memories() {
        for &allocation in design.allocations_of(other) {
            for (_, pointer) in design.value_of(allocation).pointers() {
                if dropped(allocation) {
                    // the pointer dies with its holder unless it steers an access
                    if sources.contains(&pointer) {
                        return true;
                    }
                } else if dropped(design.absolute_base(design.pointer_target(pointer))) {
                    return true;
                }
            }
        }
    }
    design
        .iter_constants()
        .any(|constant| dropped(design.absolute_base(design.constant_target(constant))))
}

/// Pointers and constants that never fed an access are not touched by
/// `retarget_address_sources`, but they may still point into a memory that was
/// just split. Each one is sent to the partition that copied its target
/// allocation, picking the first partition when several did.
fn retarget_strays(design: &mut Design, split: &[Vec<MemoryContents>]) {
    let mut pointers = Vec::new();
    for memory in design.iter_memories().collect::<Vec<_>>() {
        for &allocation in design.allocations_of(memory) {
            for (_, pointer) in design.value_of(allocation).pointers() {
                pointers.push(pointer);
            }
        }
    }
    for pointer in pointers {
        let target = design.pointer_target(pointer);
        if let Some(correlation) = stray_correlation(design, split, target) {
            let target = correlated_location(design, correlation, target);
            design.set_pointer_target(pointer, target);
        }
    }
    for constant in design.iter_constants().collect::<Vec<_>>() {
        let target = design.constant_target(constant);
        if let Some(correlation) = stray_correlation(design, split, target) {
            let target = correlated_location(design, correlation, target);
            design.set_constant_target(constant, target);
        }
    }
}

fn stray_correlation<'a>(
    design: &Design,
    split: &'a [Vec<MemoryContents>],
    target: Location,
) -> Option<&'a BTreeMap<Location, Location>> {
    let base = design.absolute_base(target);
    if !design.is_dead(base) {
        return None;
    }
    let root = design.root_location(base);
    let correlation = split
        .iter()
        .flatten()
        .map(|content| &content.correlation)
        .find(|correlation| correlation.contains_key(&root));
    match correlation {
        Some(correlation) => Some(correlation),
        None => panic!("pointer targets split memory bytes that no access reaches"),
    }
}
