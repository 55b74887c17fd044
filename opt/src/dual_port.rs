use std::collections::{BTreeMap, VecDeque};

use indexmap::{IndexMap, IndexSet};
use prjfabric_memory::{AccessKind, Design, LValue, Memory, MemoryStyle, Task};

/// Options steering dual port allocation.
#[derive(Debug, Clone, Copy)]
pub struct DualPortOptions {
    /// Give LUT memories a second port too.
    pub allow_lut: bool,
    /// Memories at most this large are expected to become LUTs.
    pub max_lut_bytes: u64,
    /// Leave every memory single ported.
    pub suppress: bool,
}

impl Default for DualPortOptions {
    fn default() -> DualPortOptions {
        DualPortOptions { allow_lut: false, max_lut_bytes: 64, suppress: false }
    }
}

/// Spreads the reads of each block RAM across two ports, so that reads issued
/// by the same task no longer serialize on a single port. Writes keep their
/// port assignment.
pub fn balance_reads(design: &mut Design, options: &DualPortOptions) {
    if options.suppress {
        log::debug!("dual port allocation suppressed");
        return;
    }
    let mut task_reads: IndexMap<Memory, IndexMap<Task, IndexSet<LValue>>> = IndexMap::new();
    for task in design.iter_tasks().collect::<Vec<_>>() {
        for &lvalue in design.task_accesses(task) {
            if design.access_kind(lvalue) != AccessKind::Read {
                continue;
            }
            let memory = design.lvalue_memory(lvalue);
            task_reads.entry(memory).or_default().entry(task).or_default().insert(lvalue);
        }
    }
    for (memory, by_task) in task_reads {
        if design.is_implemented(memory) {
            continue;
        }
        if !by_task.values().any(|reads| reads.len() >= 2) {
            continue;
        }
        if design.ports_of(memory).len() > 1 {
            continue;
        }
        if !options.allow_lut && design.size_in_bytes(memory) <= options.max_lut_bytes {
            // small memories become LUTs, which cannot take a second read port
            continue;
        }

        let original = match design.ports_of(memory).first() {
            Some(&port) => port,
            None => design.add_port(memory, false),
        };
        let second = design.add_port(memory, false);

        // reads in task order, each read counted once
        let mut reads: IndexSet<LValue> = IndexSet::new();
        for task_reads in by_task.values() {
            reads.extend(task_reads.iter().copied());
        }
        let mut ring = VecDeque::from([original, second]);
        for read in reads {
            design.detach_access(memory, read);
            let port = ring.pop_front().unwrap();
            design.attach_access(port, read);
            ring.push_back(port);
        }
        log::debug!("balanced reads of memory {} across two ports", memory.index());
    }
}

/// Alternates each task's accesses between two ports in dataflow order, so
/// that consecutive accesses from one task land on different ports. On LUT
/// memories one of the two ports stays read only, and writes falling on its
/// slot are pushed to the other port without consuming the slot.
pub fn balance_contexts(design: &mut Design, options: &DualPortOptions) {
    if options.suppress {
        log::debug!("dual port allocation suppressed");
        return;
    }
    let mut task_accesses: BTreeMap<Memory, BTreeMap<Task, IndexSet<LValue>>> = BTreeMap::new();
    for task in design.iter_tasks().collect::<Vec<_>>() {
        for &lvalue in design.task_accesses(task) {
            let memory = design.lvalue_memory(lvalue);
            task_accesses.entry(memory).or_default().entry(task).or_default().insert(lvalue);
        }
    }
    for (memory, by_task) in task_accesses {
        if design.is_implemented(memory) {
            continue;
        }
        let is_lut = design.style(memory) == MemoryStyle::Lut;
        if is_lut && !options.allow_lut {
            continue;
        }
        let read_only_port = options.allow_lut && is_lut;
        let valid = by_task.values().any(|accesses| {
            accesses.len() >= 2
                && (!read_only_port
                    || accesses.iter().any(|&lvalue| design.access_kind(lvalue) == AccessKind::Read))
        });
        if !valid {
            continue;
        }
        if design.ports_of(memory).is_empty() {
            design.add_port(memory, false);
        }
        if design.ports_of(memory).len() < 2 {
            design.add_port(memory, read_only_port);
        }

        for accesses in by_task.values() {
            for &lvalue in accesses {
                design.detach_access(memory, lvalue);
            }
            let first = design.ports_of(memory)[0];
            let second = design.ports_of(memory)[1];
            let (first, second) = if read_only_port && !design.is_read_only(first) {
                assert!(design.is_read_only(second), "LUT memories must have a read-only port");
                (second, first)
            } else {
                (first, second)
            };
            let mut even = true;
            for &lvalue in accesses {
                if even {
                    if read_only_port && design.is_write(lvalue) {
                        // the even slot belongs to the read-only port and
                        // stays open for the next read
                        design.attach_access(second, lvalue);
                    } else {
                        design.attach_access(first, lvalue);
                        even = false;
                    }
                } else {
                    design.attach_access(second, lvalue);
                    even = true;
                }
            }
        }
        log::debug!("balanced contexts of memory {} across two ports", memory.index());
    }
}
