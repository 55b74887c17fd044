use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;

use crate::{AddressSource, Location, LocationData, LogicalValue};

/// A handle for a logical memory: a bag of allocations reached through a set of ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Memory {
    index: u32,
}

impl Memory {
    pub(crate) fn from_index(index: usize) -> Memory {
        Memory { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A handle for one named, contiguous slab of bytes within a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Allocation {
    index: u32,
}

impl Allocation {
    pub(crate) fn from_index(index: usize) -> Allocation {
        Allocation { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A handle for a pointer value stored inside an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pointer {
    index: u32,
}

impl Pointer {
    pub(crate) fn from_index(index: usize) -> Pointer {
        Pointer { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A handle for a location constant: an address that feeds accesses without being
/// stored in any memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationConstant {
    index: u32,
}

impl LocationConstant {
    pub(crate) fn from_index(index: usize) -> LocationConstant {
        LocationConstant { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A handle for a single read or write site in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LValue {
    index: u32,
}

impl LValue {
    pub(crate) fn from_index(index: usize) -> LValue {
        LValue { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A handle for a memory port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    index: u32,
}

impl Port {
    pub(crate) fn from_index(index: usize) -> Port {
        Port { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// A handle for a task: a unit of sequential execution whose accesses are listed
/// in dataflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Task {
    index: u32,
}

impl Task {
    pub(crate) fn from_index(index: usize) -> Task {
        Task { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryStyle {
    Ram,
    Lut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryData {
    pub(crate) style: MemoryStyle,
    pub(crate) implemented: bool,
    pub(crate) dead: bool,
    pub(crate) allocations: Vec<Allocation>,
    pub(crate) accesses: BTreeMap<LValue, BTreeSet<Location>>,
    pub(crate) ports: Vec<Port>,
}

#[derive(Debug, Clone)]
pub(crate) struct AllocationData {
    pub(crate) memory: Memory,
    pub(crate) ident: usize,
    pub(crate) value: LogicalValue,
    pub(crate) root: Location,
    pub(crate) dead: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PointerData {
    pub(crate) target: Location,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LocationConstantData {
    pub(crate) target: Location,
}

#[derive(Debug, Clone)]
pub(crate) struct LValueData {
    pub(crate) name: String,
    pub(crate) kind: AccessKind,
    pub(crate) memory: Memory,
    pub(crate) sources: BTreeSet<AddressSource>,
}

#[derive(Debug, Clone)]
pub(crate) struct PortData {
    pub(crate) memory: Memory,
    pub(crate) read_only: bool,
    pub(crate) accesses: Vec<LValue>,
}

#[derive(Debug, Clone)]
pub(crate) struct TaskData {
    pub(crate) name: String,
    pub(crate) accesses: Vec<LValue>,
}

/// The arena holding every memory, allocation, location, pointer, access and task
/// of one program, addressed through stable integer handles.
///
/// Handles are never reused. Deleting an allocation tombstones it: the handle stays
/// valid for lookups, but the allocation no longer appears in its memory's list and
/// contributes nothing to sizes or statistics.
#[derive(Debug, Clone)]
pub struct Design {
    pub(crate) memories: Vec<MemoryData>,
    pub(crate) allocations: Vec<AllocationData>,
    pub(crate) locations: Vec<LocationData>,
    pub(crate) pointers: Vec<PointerData>,
    pub(crate) constants: Vec<LocationConstantData>,
    pub(crate) lvalues: Vec<LValueData>,
    pub(crate) ports: Vec<PortData>,
    pub(crate) tasks: Vec<TaskData>,
    pub(crate) idents: IndexSet<String>,
}

impl Design {
    pub fn new() -> Design {
        Design {
            memories: vec![],
            allocations: vec![],
            locations: vec![],
            pointers: vec![],
            constants: vec![],
            lvalues: vec![],
            ports: vec![],
            tasks: vec![],
            idents: IndexSet::new(),
        }
    }

    pub fn add_memory(&mut self, style: MemoryStyle) -> Memory {
        let memory = Memory::from_index(self.memories.len());
        self.memories.push(MemoryData {
            style,
            implemented: false,
            dead: false,
            allocations: vec![],
            accesses: BTreeMap::new(),
            ports: vec![],
        });
        memory
    }

    pub fn add_allocation(&mut self, memory: Memory, ident: &str, value: LogicalValue) -> Allocation {
        let allocation = Allocation::from_index(self.allocations.len());
        let root = self.add_location(LocationData::Root(allocation));
        let ident = self.idents.insert_full(ident.to_owned()).0;
        self.allocations.push(AllocationData { memory, ident, value, root, dead: false });
        self.memories[memory.index()].allocations.push(allocation);
        allocation
    }

    pub fn add_pointer(&mut self, target: Location) -> Pointer {
        let pointer = Pointer::from_index(self.pointers.len());
        self.pointers.push(PointerData { target });
        pointer
    }

    pub fn add_constant(&mut self, target: Location) -> LocationConstant {
        let constant = LocationConstant::from_index(self.constants.len());
        self.constants.push(LocationConstantData { target });
        constant
    }

    pub fn add_lvalue(&mut self, name: &str, kind: AccessKind, memory: Memory) -> LValue {
        let lvalue = LValue::from_index(self.lvalues.len());
        self.lvalues.push(LValueData { name: name.to_owned(), kind, memory, sources: BTreeSet::new() });
        lvalue
    }

    pub fn add_port(&mut self, memory: Memory, read_only: bool) -> Port {
        let port = Port::from_index(self.ports.len());
        self.ports.push(PortData { memory, read_only, accesses: vec![] });
        self.memories[memory.index()].ports.push(port);
        port
    }

    pub fn add_task(&mut self, name: &str) -> Task {
        let task = Task::from_index(self.tasks.len());
        self.tasks.push(TaskData { name: name.to_owned(), accesses: vec![] });
        task
    }

    pub fn push_task_access(&mut self, task: Task, lvalue: LValue) {
        self.tasks[task.index()].accesses.push(lvalue);
    }

    pub fn add_lvalue_source(&mut self, lvalue: LValue, source: AddressSource) {
        self.lvalues[lvalue.index()].sources.insert(source);
    }

    pub fn set_lvalue_sources(&mut self, lvalue: LValue, sources: BTreeSet<AddressSource>) {
        self.lvalues[lvalue.index()].sources = sources;
    }

    /// Records that `lvalue` touches `location` when it executes. The location must
    /// lie within the memory the access is bound to.
    pub fn add_access(&mut self, memory: Memory, lvalue: LValue, location: Location) {
        assert_eq!(self.lvalues[lvalue.index()].memory, memory, "access bound to a different memory");
        let base = self.absolute_base(location);
        assert_eq!(self.allocations[base.index()].memory, memory, "access location targets a foreign memory");
        self.memories[memory.index()].accesses.entry(lvalue).or_default().insert(location);
    }

    /// Forgets everything `lvalue` touches in `memory` and detaches it from its port.
    /// Returns the locations it used to touch.
    pub fn remove_access(&mut self, memory: Memory, lvalue: LValue) -> BTreeSet<Location> {
        let locations = self.memories[memory.index()].accesses.remove(&lvalue).unwrap_or_default();
        self.detach_access(memory, lvalue);
        locations
    }

    /// Replaces the location set of an access in place, leaving its port untouched.
    pub fn replace_access_locations(&mut self, memory: Memory, lvalue: LValue, locations: BTreeSet<Location>) {
        self.memories[memory.index()].accesses.insert(lvalue, locations);
    }

    pub fn attach_access(&mut self, port: Port, lvalue: LValue) {
        let memory = self.ports[port.index()].memory;
        assert_eq!(self.lvalues[lvalue.index()].memory, memory, "access bound to a different memory");
        assert!(
            !(self.ports[port.index()].read_only && self.lvalues[lvalue.index()].kind == AccessKind::Write),
            "write access assigned to a read-only port"
        );
        for &other in &self.memories[memory.index()].ports {
            assert!(!self.ports[other.index()].accesses.contains(&lvalue), "access already assigned to a port");
        }
        self.ports[port.index()].accesses.push(lvalue);
    }

    pub fn detach_access(&mut self, memory: Memory, lvalue: LValue) {
        for index in 0..self.memories[memory.index()].ports.len() {
            let port = self.memories[memory.index()].ports[index];
            self.ports[port.index()].accesses.retain(|&it| it != lvalue);
        }
    }

    /// Rebinds an access to another memory. Its locations and port assignment in the
    /// old memory must have been removed first.
    pub fn bind_lvalue(&mut self, lvalue: LValue, memory: Memory) {
        self.lvalues[lvalue.index()].memory = memory;
    }

    pub fn set_pointer_target(&mut self, pointer: Pointer, target: Location) {
        self.pointers[pointer.index()].target = target;
    }

    pub fn set_constant_target(&mut self, constant: LocationConstant, target: Location) {
        self.constants[constant.index()].target = target;
    }

    pub fn set_implemented(&mut self, memory: Memory) {
        self.memories[memory.index()].implemented = true;
    }

    pub fn delete_allocation(&mut self, allocation: Allocation) {
        let memory = self.allocations[allocation.index()].memory;
        self.allocations[allocation.index()].dead = true;
        self.memories[memory.index()].allocations.retain(|&it| it != allocation);
    }

    /// Tombstones a memory together with its allocations. Every access must have
    /// been moved elsewhere first.
    pub fn delete_memory(&mut self, memory: Memory) {
        assert!(self.memories[memory.index()].accesses.is_empty(), "deleted memory still has accesses");
        for allocation in std::mem::take(&mut self.memories[memory.index()].allocations) {
            self.allocations[allocation.index()].dead = true;
        }
        self.memories[memory.index()].dead = true;
    }

    pub fn iter_memories(&self) -> impl Iterator<Item = Memory> + '_ {
        (0..self.memories.len()).map(Memory::from_index).filter(|&it| !self.memories[it.index()].dead)
    }

    pub fn iter_tasks(&self) -> impl Iterator<Item = Task> {
        (0..self.tasks.len()).map(Task::from_index)
    }

    pub fn iter_constants(&self) -> impl Iterator<Item = LocationConstant> {
        (0..self.constants.len()).map(LocationConstant::from_index)
    }

    pub fn style(&self, memory: Memory) -> MemoryStyle {
        self.memories[memory.index()].style
    }

    pub fn is_implemented(&self, memory: Memory) -> bool {
        self.memories[memory.index()].implemented
    }

    pub fn allocations_of(&self, memory: Memory) -> &[Allocation] {
        &self.memories[memory.index()].allocations
    }

    pub fn size_in_bytes(&self, memory: Memory) -> u64 {
        self.memories[memory.index()]
            .allocations
            .iter()
            .map(|&allocation| self.value_of(allocation).size() as u64)
            .sum()
    }

    pub fn memory_of(&self, allocation: Allocation) -> Memory {
        self.allocations[allocation.index()].memory
    }

    pub fn value_of(&self, allocation: Allocation) -> &LogicalValue {
        &self.allocations[allocation.index()].value
    }

    pub fn ident_of(&self, allocation: Allocation) -> &str {
        &self.idents[self.allocations[allocation.index()].ident]
    }

    pub fn root_location(&self, allocation: Allocation) -> Location {
        self.allocations[allocation.index()].root
    }

    pub fn is_dead(&self, allocation: Allocation) -> bool {
        self.allocations[allocation.index()].dead
    }

    pub fn lvalues_of(&self, memory: Memory) -> impl Iterator<Item = LValue> + '_ {
        self.memories[memory.index()].accesses.keys().copied()
    }

    pub fn accesses_of(&self, memory: Memory, lvalue: LValue) -> &BTreeSet<Location> {
        &self.memories[memory.index()].accesses[&lvalue]
    }

    pub fn ports_of(&self, memory: Memory) -> &[Port] {
        &self.memories[memory.index()].ports
    }

    pub fn port_accesses(&self, port: Port) -> &[LValue] {
        &self.ports[port.index()].accesses
    }

    pub fn is_read_only(&self, port: Port) -> bool {
        self.ports[port.index()].read_only
    }

    /// The port `lvalue` is assigned to within `memory`, if it is assigned at all.
    pub fn port_of(&self, memory: Memory, lvalue: LValue) -> Option<Port> {
        self.memories[memory.index()]
            .ports
            .iter()
            .copied()
            .find(|&port| self.ports[port.index()].accesses.contains(&lvalue))
    }

    pub fn lvalue_name(&self, lvalue: LValue) -> &str {
        &self.lvalues[lvalue.index()].name
    }

    pub fn access_kind(&self, lvalue: LValue) -> AccessKind {
        self.lvalues[lvalue.index()].kind
    }

    pub fn is_write(&self, lvalue: LValue) -> bool {
        self.lvalues[lvalue.index()].kind == AccessKind::Write
    }

    pub fn lvalue_memory(&self, lvalue: LValue) -> Memory {
        self.lvalues[lvalue.index()].memory
    }

    pub fn lvalue_sources(&self, lvalue: LValue) -> &BTreeSet<AddressSource> {
        &self.lvalues[lvalue.index()].sources
    }

    pub fn task_name(&self, task: Task) -> &str {
        &self.tasks[task.index()].name
    }

    pub fn task_accesses(&self, task: Task) -> &[LValue] {
        &self.tasks[task.index()].accesses
    }

    pub fn pointer_target(&self, pointer: Pointer) -> Location {
        self.pointers[pointer.index()].target
    }

    pub fn constant_target(&self, constant: LocationConstant) -> Location {
        self.constants[constant.index()].target
    }

    /// Location constants whose target lies within `memory`, in handle order.
    pub fn constants_of(&self, memory: Memory) -> Vec<LocationConstant> {
        self.iter_constants()
            .filter(|&constant| {
                let target = self.constant_target(constant);
                target != Location::INVALID && self.memory_of(self.absolute_base(target)) == memory
            })
            .collect()
    }

    pub fn statistics(&self) -> BTreeMap<String, usize> {
        let mut statistics = BTreeMap::new();
        let mut count = |key: &str, amount: usize| *statistics.entry(key.to_owned()).or_default() += amount;
        for memory in self.iter_memories() {
            count("memories", 1);
            match self.style(memory) {
                MemoryStyle::Ram => count("ram memories", 1),
                MemoryStyle::Lut => count("lut memories", 1),
            }
            count("allocations", self.allocations_of(memory).len());
            count("bytes", self.size_in_bytes(memory) as usize);
            count("ports", self.ports_of(memory).len());
            for lvalue in self.lvalues_of(memory) {
                match self.access_kind(lvalue) {
                    AccessKind::Read => count("reads", 1),
                    AccessKind::Write => count("writes", 1),
                }
            }
        }
        count("tasks", self.tasks.len());
        statistics
    }
}

impl Default for Design {
    fn default() -> Design {
        Design::new()
    }
}
