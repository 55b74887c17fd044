use std::collections::{BTreeMap, BTreeSet};

use prjfabric_memory::{AddressSource, Allocation, Design, Location, LogicalValue, Memory, Pointer};

use crate::cluster::{build_location_maps, BaseLocationMap};

/// Shrinks every memory to the bytes its accesses can actually reach, cutting
/// away the common leading gap and each allocation's unreachable tail.
pub fn compact(design: &mut Design) {
    let sources = source_pointers(design);
    for memory in design.iter_memories().collect::<Vec<_>>() {
        if design.is_implemented(memory) {
            continue;
        }
        compact_memory(design, memory, &sources);
    }
}

/// Every pointer some access is steered by.
pub(crate) fn source_pointers(design: &Design) -> BTreeSet<Pointer> {
    let mut sources = BTreeSet::new();
    for memory in design.iter_memories() {
        for lvalue in design.lvalues_of(memory) {
            for &source in design.lvalue_sources(lvalue) {
                if let AddressSource::Pointer(pointer) = source {
                    sources.insert(pointer);
                }
            }
        }
    }
    sources
}

/// The distance every accessed allocation of a memory can move towards offset
/// zero. All allocations move together, and the distance has to be a multiple
/// of each allocation's access unit so indexed locations keep their stride.
fn find_delta(maps: &BTreeMap<Allocation, BaseLocationMap>) -> u32 {
    let unit = maps.values().map(BaseLocationMap::max_size).max().unwrap_or(0);
    if unit == 0 {
        return 0;
    }
    let mut delta = u32::MAX;
    for map in maps.values() {
        let movable = map.is_movable_by();
        if movable % unit != 0 {
            return 0;
        }
        delta = delta.min(movable);
    }
    if delta == 0 || delta == u32::MAX {
        return 0;
    }
    for map in maps.values() {
        if delta % map.max_size() != 0 {
            return 0;
        }
    }
    delta
}

fn compact_memory(design: &mut Design, memory: Memory, sources: &BTreeSet<Pointer>) {
    let mut maps = build_location_maps(design, memory);
    // allocations nothing accesses are exempt from moving and trimming; a
    // pointer may still target their bytes
    maps.retain(|_, map| map.max_size() > 0);
    let delta = find_delta(&maps);
    let trimmable = maps.values().map(|map| map.trimmable_bytes(design)).max().unwrap_or(0);
    if delta == 0 && trimmable == 0 {
        return;
    }

    let mut moved: BTreeMap<Allocation, LogicalValue> = BTreeMap::new();
    for (&base, map) in &maps {
        match map.move_by(design, delta) {
            Ok(value) => {
                moved.insert(base, value);
            }
            Err(error) => {
                log::warn!("cannot compact memory {}: {}", memory.index(), error);
                return;
            }
        }
    }

    let mut kept = BTreeSet::new();
    for value in moved.values() {
        kept.extend(value.pointers().into_iter().map(|(_, pointer)| pointer));
    }
    for &base in moved.keys() {
        for (_, pointer) in design.value_of(base).pointers() {
            if !kept.contains(&pointer) && sources.contains(&pointer) {
                log::warn!("cannot compact memory {}: an address source would be discarded", memory.index());
                return;
            }
        }
    }
    if targets_removed_bytes(design, &moved, &kept, delta) {
        log::warn!("cannot compact memory {}: removed bytes are still targeted", memory.index());
        return;
    }

    let mut correlation = BTreeMap::new();
    for (&base, value) in &moved {
        let ident = design.ident_of(base).to_owned();
        let replacement = design.add_allocation(memory, &ident, value.clone());
        correlation.insert(design.root_location(base), design.root_location(replacement));
    }
    for base in moved.into_keys() {
        design.delete_allocation(base);
    }

    for lvalue in design.lvalues_of(memory).collect::<Vec<_>>() {
        let mut locations = BTreeSet::new();
        for location in design.accesses_of(memory, lvalue).clone() {
            let root = design.root_location(design.absolute_base(location));
            locations.insert(design.chop_start(location, correlation[&root], delta));
        }
        design.replace_access_locations(memory, lvalue, locations);
    }

    let mut live = Vec::new();
    for other in design.iter_memories() {
        for &allocation in design.allocations_of(other) {
            for (_, pointer) in design.value_of(allocation).pointers() {
                live.push(pointer);
            }
        }
    }
    for pointer in live {
        let target = design.pointer_target(pointer);
        let root = design.root_location(design.absolute_base(target));
        if let Some(&replacement) = correlation.get(&root) {
            // a target in the removed gap degrades to the start of the moved bytes
            let chop = delta.min(design.absolute_min(target));
            let target = design.chop_start(target, replacement, chop);
            design.set_pointer_target(pointer, target);
        }
    }
    for constant in design.iter_constants().collect::<Vec<_>>() {
        let target = design.constant_target(constant);
        let root = design.root_location(design.absolute_base(target));
        if let Some(&replacement) = correlation.get(&root) {
            let chop = delta.min(design.absolute_min(target));
            let target = design.chop_start(target, replacement, chop);
            design.set_constant_target(constant, target);
        }
    }

    log::debug!(
        "compacted memory {}: moved by {} bytes, {} bytes remain",
        memory.index(),
        delta,
        design.size_in_bytes(memory)
    );
}

/// A pointer or constant that outlives the move may target bytes the move cuts
/// away. `chop_start` can rebuild a target only when it is the whole
/// allocation, a window inside the kept bytes, or a fixed target in the
/// removed gap (which degrades to the start of the moved bytes); anything else
/// blocks compaction.
fn targets_removed_bytes(
    design: &Design,
    moved: &BTreeMap<Allocation, LogicalValue>,
    kept: &BTreeSet<Pointer>,
    delta: u32,
) -> bool {
    let cut_away = |target: Location| {
        let Some(value) = moved.get(&design.absolute_base(target)) else { return false };
        if design.is_root(target) {
            return false;
        }
        let min = design.absolute_min(target);
        if min >= delta {
            design.location_end(target) > delta + value.size()
        } else {
            min != design.absolute_max(target) || design.location_size(target) > value.size()
        }
    };
    for memory in design.iter_memories() {
        for &allocation in design.allocations_of(memory) {
            for (_, pointer) in design.value_of(allocation).pointers() {
                // a pointer dropped by the move dies rather than retargets
                if moved.contains_key(&allocation) && !kept.contains(&pointer) {
                    continue;
                }
                if cut_away(design.pointer_target(pointer)) {
                    return true;
                }
            }
        }
    }
    design.iter_constants().any(|constant| cut_away(design.constant_target(constant)))
}
