use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use crate::{AddressSource, Allocation, Design, Location, LogicalValue, Pointer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotIsomorphic {
    MemoryCount(usize, usize),
    MemoryStyle(usize),
    MemoryImplemented(usize),
    AllocationCount(usize),
    AllocationIdent(usize, String, String),
    ValueShape(String),
    PointerTarget(String),
    AccessCount(usize),
    AccessMissing(String),
    AccessDuplicate(String),
    AccessKind(String),
    AccessLocations(String),
    AccessSources(String),
    PortCount(usize),
    PortMode(usize, usize),
    PortAccesses(usize, usize),
    ConstantTargets(usize),
    TaskCount(usize, usize),
    TaskName(String, String),
    TaskAccesses(String),
}

impl Display for NotIsomorphic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NotIsomorphic::MemoryCount(lft, rgt) => {
                write!(f, "left design has {} memories, right design has {}", lft, rgt)
            }
            NotIsomorphic::MemoryStyle(index) => write!(f, "memory pair {} differs in style", index),
            NotIsomorphic::MemoryImplemented(index) => {
                write!(f, "memory pair {} differs in implementation state", index)
            }
            NotIsomorphic::AllocationCount(index) => write!(f, "memory pair {} differs in allocation count", index),
            NotIsomorphic::AllocationIdent(index, lft, rgt) => {
                write!(f, "memory pair {} allocates {:?} on the left, {:?} on the right", index, lft, rgt)
            }
            NotIsomorphic::ValueShape(ident) => write!(f, "allocation {:?} differs in value", ident),
            NotIsomorphic::PointerTarget(place) => write!(f, "pointer at {} differs in target", place),
            NotIsomorphic::AccessCount(index) => write!(f, "memory pair {} differs in access count", index),
            NotIsomorphic::AccessMissing(name) => write!(f, "access {:?} is missing on the right", name),
            NotIsomorphic::AccessDuplicate(name) => write!(f, "access name {:?} is ambiguous", name),
            NotIsomorphic::AccessKind(name) => write!(f, "access {:?} differs in kind", name),
            NotIsomorphic::AccessLocations(name) => write!(f, "access {:?} differs in locations", name),
            NotIsomorphic::AccessSources(name) => write!(f, "access {:?} differs in address sources", name),
            NotIsomorphic::PortCount(index) => write!(f, "memory pair {} differs in port count", index),
            NotIsomorphic::PortMode(index, port) => {
                write!(f, "port {} of memory pair {} differs in mode", port, index)
            }
            NotIsomorphic::PortAccesses(index, port) => {
                write!(f, "port {} of memory pair {} differs in accesses", port, index)
            }
            NotIsomorphic::ConstantTargets(index) => {
                write!(f, "memory pair {} differs in location constants", index)
            }
            NotIsomorphic::TaskCount(lft, rgt) => {
                write!(f, "left design has {} tasks, right design has {}", lft, rgt)
            }
            NotIsomorphic::TaskName(lft, rgt) => write!(f, "task names {:?} and {:?} differ", lft, rgt),
            NotIsomorphic::TaskAccesses(name) => write!(f, "task {:?} differs in accesses", name),
        }
    }
}

impl std::error::Error for NotIsomorphic {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum LocShape {
    Root,
    Fixed(u32, u32),
    Sliding(u32, u32),
}

fn loc_shape(design: &Design, location: Location) -> (Allocation, LocShape) {
    let base = design.absolute_base(location);
    let shape = if design.is_root(location) {
        LocShape::Root
    } else if design.has_fixed_offset(location) {
        LocShape::Fixed(design.absolute_min(location), design.location_size(location))
    } else {
        LocShape::Sliding(design.absolute_min(location), design.location_size(location))
    };
    (base, shape)
}

fn value_eq(
    ident: &str,
    offset: u32,
    lval: &LogicalValue,
    rval: &LogicalValue,
    pointers: &mut Vec<(Pointer, Pointer, String)>,
) -> Result<(), NotIsomorphic> {
    match (lval, rval) {
        (LogicalValue::Scalar(lft), LogicalValue::Scalar(rgt)) => {
            if lft != rgt {
                return Err(NotIsomorphic::ValueShape(ident.to_owned()));
            }
            Ok(())
        }
        (LogicalValue::Record(lft), LogicalValue::Record(rgt)) => {
            if lft.len() != rgt.len() {
                return Err(NotIsomorphic::ValueShape(ident.to_owned()));
            }
            let mut at = offset;
            for (lpart, rpart) in lft.iter().zip(rgt) {
                value_eq(ident, at, lpart, rpart, pointers)?;
                at += lpart.size();
            }
            Ok(())
        }
        (
            LogicalValue::Pointer { pointer: lft, size: lsize },
            LogicalValue::Pointer { pointer: rgt, size: rsize },
        ) => {
            if lsize != rsize {
                return Err(NotIsomorphic::ValueShape(ident.to_owned()));
            }
            pointers.push((*lft, *rgt, format!("{:?}+{}", ident, offset)));
            Ok(())
        }
        _ => Err(NotIsomorphic::ValueShape(ident.to_owned())),
    }
}

/// Checks whether two designs describe the same program up to a renaming of handles.
///
/// Memories correspond in declaration order, allocations in order within each
/// memory, ports in order within each memory, and accesses by name within each
/// memory. Pointers correspond by their position inside allocation values, and
/// location constants by their targets.
pub fn isomorphic(lft: &Design, rgt: &Design) -> Result<(), NotIsomorphic> {
    let lmems: Vec<_> = lft.iter_memories().collect();
    let rmems: Vec<_> = rgt.iter_memories().collect();
    if lmems.len() != rmems.len() {
        return Err(NotIsomorphic::MemoryCount(lmems.len(), rmems.len()));
    }

    let mut alloc_map = BTreeMap::new();
    let mut pointers = Vec::new();
    for (index, (&lmem, &rmem)) in lmems.iter().zip(&rmems).enumerate() {
        if lft.style(lmem) != rgt.style(rmem) {
            return Err(NotIsomorphic::MemoryStyle(index));
        }
        if lft.is_implemented(lmem) != rgt.is_implemented(rmem) {
            return Err(NotIsomorphic::MemoryImplemented(index));
        }
        let lallocs = lft.allocations_of(lmem);
        let rallocs = rgt.allocations_of(rmem);
        if lallocs.len() != rallocs.len() {
            return Err(NotIsomorphic::AllocationCount(index));
        }
        for (&lalloc, &ralloc) in lallocs.iter().zip(rallocs) {
            if lft.ident_of(lalloc) != rgt.ident_of(ralloc) {
                return Err(NotIsomorphic::AllocationIdent(
                    index,
                    lft.ident_of(lalloc).to_owned(),
                    rgt.ident_of(ralloc).to_owned(),
                ));
            }
            alloc_map.insert(lalloc, ralloc);
            value_eq(lft.ident_of(lalloc), 0, lft.value_of(lalloc), rgt.value_of(ralloc), &mut pointers)?;
        }
    }

    let mut ptr_map = BTreeMap::new();
    for (lptr, rptr, place) in &pointers {
        let (lbase, lshape) = loc_shape(lft, lft.pointer_target(*lptr));
        let (rbase, rshape) = loc_shape(rgt, rgt.pointer_target(*rptr));
        match alloc_map.get(&lbase) {
            Some(&mapped) if mapped == rbase && lshape == rshape => (),
            _ => return Err(NotIsomorphic::PointerTarget(place.clone())),
        }
        ptr_map.insert(*lptr, *rptr);
    }

    let mut lvalue_map = BTreeMap::new();
    for (index, (&lmem, &rmem)) in lmems.iter().zip(&rmems).enumerate() {
        let mut const_map = BTreeMap::new();
        let lconsts = lft.constants_of(lmem);
        let rconsts = rgt.constants_of(rmem);
        if lconsts.len() != rconsts.len() {
            return Err(NotIsomorphic::ConstantTargets(index));
        }
        let mut lkeyed: Vec<_> = lconsts
            .iter()
            .map(|&constant| {
                let (base, shape) = loc_shape(lft, lft.constant_target(constant));
                ((alloc_map.get(&base).copied(), shape), constant)
            })
            .collect();
        let mut rkeyed: Vec<_> = rconsts
            .iter()
            .map(|&constant| {
                let (base, shape) = loc_shape(rgt, rgt.constant_target(constant));
                ((Some(base), shape), constant)
            })
            .collect();
        lkeyed.sort();
        rkeyed.sort();
        for (&(lkey, lconst), &(rkey, rconst)) in lkeyed.iter().zip(&rkeyed) {
            if lkey != rkey {
                return Err(NotIsomorphic::ConstantTargets(index));
            }
            const_map.insert(lconst, rconst);
        }

        let llvalues: Vec<_> = lft.lvalues_of(lmem).collect();
        let rlvalues: Vec<_> = rgt.lvalues_of(rmem).collect();
        if llvalues.len() != rlvalues.len() {
            return Err(NotIsomorphic::AccessCount(index));
        }
        let mut rgt_by_name = BTreeMap::new();
        for &rlvalue in &rlvalues {
            if rgt_by_name.insert(rgt.lvalue_name(rlvalue).to_owned(), rlvalue).is_some() {
                return Err(NotIsomorphic::AccessDuplicate(rgt.lvalue_name(rlvalue).to_owned()));
            }
        }
        let mut seen = BTreeSet::new();
        for &llvalue in &llvalues {
            let name = lft.lvalue_name(llvalue);
            if !seen.insert(name.to_owned()) {
                return Err(NotIsomorphic::AccessDuplicate(name.to_owned()));
            }
            let rlvalue = match rgt_by_name.get(name) {
                Some(&rlvalue) => rlvalue,
                None => return Err(NotIsomorphic::AccessMissing(name.to_owned())),
            };
            if lft.access_kind(llvalue) != rgt.access_kind(rlvalue) {
                return Err(NotIsomorphic::AccessKind(name.to_owned()));
            }
            lvalue_map.insert(llvalue, rlvalue);

            let mut lshapes: Vec<_> = lft
                .accesses_of(lmem, llvalue)
                .iter()
                .map(|&location| {
                    let (base, shape) = loc_shape(lft, location);
                    (alloc_map.get(&base).copied(), shape)
                })
                .collect();
            let mut rshapes: Vec<_> = rgt
                .accesses_of(rmem, rlvalue)
                .iter()
                .map(|&location| {
                    let (base, shape) = loc_shape(rgt, location);
                    (Some(base), shape)
                })
                .collect();
            lshapes.sort();
            rshapes.sort();
            if lshapes != rshapes {
                return Err(NotIsomorphic::AccessLocations(name.to_owned()));
            }

            let mut mapped = BTreeSet::new();
            for &source in lft.lvalue_sources(llvalue) {
                let source = match source {
                    AddressSource::Pointer(pointer) => match ptr_map.get(&pointer) {
                        Some(&pointer) => AddressSource::Pointer(pointer),
                        None => return Err(NotIsomorphic::AccessSources(name.to_owned())),
                    },
                    AddressSource::Constant(constant) => match const_map.get(&constant) {
                        Some(&constant) => AddressSource::Constant(constant),
                        None => return Err(NotIsomorphic::AccessSources(name.to_owned())),
                    },
                };
                mapped.insert(source);
            }
            if &mapped != rgt.lvalue_sources(rlvalue) {
                return Err(NotIsomorphic::AccessSources(name.to_owned()));
            }
        }

        let lports = lft.ports_of(lmem);
        let rports = rgt.ports_of(rmem);
        if lports.len() != rports.len() {
            return Err(NotIsomorphic::PortCount(index));
        }
        for (port_index, (&lport, &rport)) in lports.iter().zip(rports).enumerate() {
            if lft.is_read_only(lport) != rgt.is_read_only(rport) {
                return Err(NotIsomorphic::PortMode(index, port_index));
            }
            let lmapped: Option<Vec<_>> =
                lft.port_accesses(lport).iter().map(|lvalue| lvalue_map.get(lvalue).copied()).collect();
            match lmapped {
                Some(lmapped) if lmapped == rgt.port_accesses(rport) => (),
                _ => return Err(NotIsomorphic::PortAccesses(index, port_index)),
            }
        }
    }

    let ltasks: Vec<_> = lft.iter_tasks().collect();
    let rtasks: Vec<_> = rgt.iter_tasks().collect();
    if ltasks.len() != rtasks.len() {
        return Err(NotIsomorphic::TaskCount(ltasks.len(), rtasks.len()));
    }
    for (&ltask, &rtask) in ltasks.iter().zip(&rtasks) {
        let name = lft.task_name(ltask);
        if name != rgt.task_name(rtask) {
            return Err(NotIsomorphic::TaskName(name.to_owned(), rgt.task_name(rtask).to_owned()));
        }
        let lmapped: Option<Vec<_>> =
            lft.task_accesses(ltask).iter().map(|lvalue| lvalue_map.get(lvalue).copied()).collect();
        match lmapped {
            Some(lmapped) if lmapped == rgt.task_accesses(rtask) => (),
            _ => return Err(NotIsomorphic::TaskAccesses(name.to_owned())),
        }
    }

    Ok(())
}

/// Asserts that two designs are isomorphic, printing both in full on failure.
#[macro_export]
macro_rules! assert_isomorphic {
    ($lft:expr, $rgt:expr) => {
        match $crate::isomorphic(&$lft, &$rgt) {
            Ok(()) => (),
            Err(error) => {
                panic!("designs are not isomorphic: {}\nleft design:\n{}right design:\n{}", error, $lft, $rgt)
            }
        }
    };
}
