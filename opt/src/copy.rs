use std::collections::BTreeMap;

use prjfabric_memory::{
    AddressSource, Design, LValue, Location, LocationConstant, LogicalValue, Memory, Pointer, Port,
};

/// Duplicates a value, giving every pointer inside it a fresh handle. The
/// fresh pointers keep the original targets until the caller retargets them.
/// Returns the duplicate together with the original-to-copy pointer map.
pub fn copy_value(design: &mut Design, value: &LogicalValue) -> (LogicalValue, BTreeMap<Pointer, Pointer>) {
    fn walk(
        design: &mut Design,
        value: &LogicalValue,
        map: &mut BTreeMap<Pointer, Pointer>,
    ) -> LogicalValue {
        match value {
            LogicalValue::Scalar(bytes) => LogicalValue::Scalar(bytes.clone()),
            LogicalValue::Record(parts) => {
                LogicalValue::Record(parts.iter().map(|part| walk(design, part, map)).collect())
            }
            LogicalValue::Pointer { pointer, size } => {
                let copy = design.add_pointer(design.pointer_target(*pointer));
                map.insert(*pointer, copy);
                LogicalValue::Pointer { pointer: copy, size: *size }
            }
        }
    }
    let mut map = BTreeMap::new();
    let copy = walk(design, value, &mut map);
    (copy, map)
}

/// Finds the counterpart of `location` under a correlation of root locations,
/// recreating derived locations on top of the correlated base one level at a
/// time.
pub fn correlated_location(
    design: &mut Design,
    correlation: &BTreeMap<Location, Location>,
    location: Location,
) -> Location {
    if let Some(&mapped) = correlation.get(&location) {
        return mapped;
    }
    let base = design.location_base(location);
    assert!(base != location, "correlation map does not contain a necessary base location");
    let new_base = correlated_location(design, correlation, base);
    design.duplicate_for_base(location, new_base)
}

/// The record of one memory duplication: the copy itself, plus maps from every
/// handle of the original to its counterpart.
#[derive(Debug)]
pub struct MemoryCopy {
    original: Memory,
    copy: Memory,
    locations: BTreeMap<Location, Location>,
    pointers: BTreeMap<Pointer, Pointer>,
    constants: BTreeMap<LocationConstant, LocationConstant>,
    lvalues: BTreeMap<LValue, LValue>,
    ports: BTreeMap<Port, Port>,
}

impl MemoryCopy {
    pub fn original(&self) -> Memory {
        self.original
    }

    pub fn copy(&self) -> Memory {
        self.copy
    }

    /// Root locations of the original mapped to root locations of the copy.
    pub fn location_map(&self) -> &BTreeMap<Location, Location> {
        &self.locations
    }

    pub fn pointer_map(&self) -> &BTreeMap<Pointer, Pointer> {
        &self.pointers
    }

    pub fn constant_map(&self) -> &BTreeMap<LocationConstant, LocationConstant> {
        &self.constants
    }

    pub fn lvalue_map(&self) -> &BTreeMap<LValue, LValue> {
        &self.lvalues
    }

    pub fn port_map(&self) -> &BTreeMap<Port, Port> {
        &self.ports
    }
}

/// Duplicates a memory wholesale: allocations, ports, accesses and the
/// location constants targeting it.
///
/// Pointers stored inside the copy that pointed back into the original are
/// retargeted to the matching place in the copy; pointers out of the original
/// keep their targets. Each access of the original gets a counterpart bound to
/// the copy, assigned to the matching port and fed by the matching address
/// sources.
pub fn copy_memory(design: &mut Design, original: Memory) -> MemoryCopy {
    assert!(!design.is_implemented(original), "cannot copy a physically implemented memory");
    let copy = design.add_memory(design.style(original));

    let mut locations = BTreeMap::new();
    let mut pointers = BTreeMap::new();
    for allocation in design.allocations_of(original).to_vec() {
        let value = design.value_of(allocation).clone();
        let (value, map) = copy_value(design, &value);
        let ident = design.ident_of(allocation).to_owned();
        let duplicate = design.add_allocation(copy, &ident, value);
        pointers.extend(map);
        locations.insert(design.root_location(allocation), design.root_location(duplicate));
    }

    for pointer in pointers.values().copied().collect::<Vec<_>>() {
        let target = design.pointer_target(pointer);
        let root = design.root_location(design.absolute_base(target));
        if locations.contains_key(&root) {
            let target = correlated_location(design, &locations, target);
            design.set_pointer_target(pointer, target);
        }
    }

    let mut constants = BTreeMap::new();
    for constant in design.constants_of(original) {
        let target = design.constant_target(constant);
        let target = correlated_location(design, &locations, target);
        constants.insert(constant, design.add_constant(target));
    }

    let mut ports = BTreeMap::new();
    for port in design.ports_of(original).to_vec() {
        ports.insert(port, design.add_port(copy, design.is_read_only(port)));
    }

    let mut lvalues = BTreeMap::new();
    for lvalue in design.lvalues_of(original).collect::<Vec<_>>() {
        let name = design.lvalue_name(lvalue).to_owned();
        let duplicate = design.add_lvalue(&name, design.access_kind(lvalue), copy);
        lvalues.insert(lvalue, duplicate);
        design.replace_access_locations(copy, duplicate, Default::default());
        for location in design.accesses_of(original, lvalue).clone() {
            let location = correlated_location(design, &locations, location);
            design.add_access(copy, duplicate, location);
        }
        for source in design.lvalue_sources(lvalue).clone() {
            let source = match source {
                AddressSource::Pointer(pointer) => {
                    AddressSource::Pointer(pointers.get(&pointer).copied().unwrap_or(pointer))
                }
                AddressSource::Constant(constant) => {
                    AddressSource::Constant(constants.get(&constant).copied().unwrap_or(constant))
                }
            };
            design.add_lvalue_source(duplicate, source);
        }
        if let Some(port) = design.port_of(original, lvalue) {
            design.attach_access(ports[&port], duplicate);
        }
    }

    MemoryCopy { original, copy, locations, pointers, constants, lvalues, ports }
}
