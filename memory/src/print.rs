use std::collections::BTreeMap;
use std::fmt::{self, Display};

use crate::{
    AccessKind, AddressSource, Allocation, Design, LValue, Location, LocationConstant, LogicalValue, Memory,
    MemoryStyle, Pointer, Task,
};

// Handles are renumbered densely in print order, so that a design keeps the same
// text after passes leave tombstones behind in the arena.
struct Numbering {
    memories: BTreeMap<Memory, usize>,
    allocations: BTreeMap<Allocation, usize>,
    pointers: BTreeMap<Pointer, usize>,
    constants: BTreeMap<LocationConstant, usize>,
    lvalues: BTreeMap<LValue, usize>,
}

impl Design {
    fn number(&self) -> Numbering {
        let mut ids = Numbering {
            memories: BTreeMap::new(),
            allocations: BTreeMap::new(),
            pointers: BTreeMap::new(),
            constants: BTreeMap::new(),
            lvalues: BTreeMap::new(),
        };
        for memory in self.iter_memories() {
            let next = ids.memories.len();
            ids.memories.insert(memory, next);
            for &allocation in self.allocations_of(memory) {
                let next = ids.allocations.len();
                ids.allocations.insert(allocation, next);
                for (_, pointer) in self.value_of(allocation).pointers() {
                    let next = ids.pointers.len();
                    ids.pointers.entry(pointer).or_insert(next);
                }
            }
        }
        for memory in self.iter_memories() {
            for constant in self.constants_of(memory) {
                let next = ids.constants.len();
                ids.constants.entry(constant).or_insert(next);
            }
            for lvalue in self.lvalues_of(memory) {
                let next = ids.lvalues.len();
                ids.lvalues.entry(lvalue).or_insert(next);
            }
        }
        ids
    }

    fn write_string(&self, f: &mut fmt::Formatter, str: &str) -> fmt::Result {
        write!(f, "\"")?;
        for byte in str.bytes() {
            match byte {
                b'"' | b'\\' => write!(f, "\\{}", byte as char)?,
                b' '..=b'~' => write!(f, "{}", byte as char)?,
                _ => write!(f, "\\{:02x}", byte)?,
            }
        }
        write!(f, "\"")
    }

    fn write_location(&self, f: &mut fmt::Formatter, ids: &Numbering, location: Location) -> fmt::Result {
        let base = ids.allocations[&self.absolute_base(location)];
        if self.is_root(location) {
            write!(f, "&{}", base)
        } else if self.has_fixed_offset(location) {
            write!(f, "&{}+{}:{}", base, self.absolute_min(location), self.location_size(location))
        } else {
            write!(f, "&{}*:{}", base, self.location_size(location))
        }
    }

    fn write_value(&self, f: &mut fmt::Formatter, ids: &Numbering, value: &LogicalValue) -> fmt::Result {
        match value {
            LogicalValue::Scalar(bytes) => {
                write!(f, "bytes")?;
                for byte in bytes {
                    write!(f, " {:02x}", byte)?;
                }
                Ok(())
            }
            LogicalValue::Pointer { pointer, size } => {
                write!(f, "ptr ${}:{} -> ", ids.pointers[pointer], size)?;
                self.write_location(f, ids, self.pointer_target(*pointer))
            }
            LogicalValue::Record(parts) => {
                write!(f, "{{")?;
                for part in parts {
                    write!(f, " ")?;
                    self.write_value(f, ids, part)?;
                }
                write!(f, " }}")
            }
        }
    }

    fn write_access(&self, f: &mut fmt::Formatter, ids: &Numbering, memory: Memory, lvalue: LValue) -> fmt::Result {
        match self.access_kind(lvalue) {
            AccessKind::Read => write!(f, "  read")?,
            AccessKind::Write => write!(f, "  write")?,
        }
        write!(f, " #{} ", ids.lvalues[&lvalue])?;
        self.write_string(f, self.lvalue_name(lvalue))?;
        write!(f, " [")?;
        for &location in self.accesses_of(memory, lvalue) {
            write!(f, " ")?;
            self.write_location(f, ids, location)?;
        }
        write!(f, " ]")?;
        let sources = self.lvalue_sources(lvalue);
        if !sources.is_empty() {
            write!(f, " via [")?;
            for &source in sources {
                match source {
                    AddressSource::Pointer(pointer) => write!(f, " ${}", ids.pointers[&pointer])?,
                    AddressSource::Constant(constant) => write!(f, " !{}", ids.constants[&constant])?,
                }
            }
            write!(f, " ]")?;
        }
        writeln!(f)
    }

    fn write_memory(&self, f: &mut fmt::Formatter, ids: &Numbering, memory: Memory) -> fmt::Result {
        write!(f, "memory %{}", ids.memories[&memory])?;
        if self.style(memory) == MemoryStyle::Lut {
            write!(f, " lut")?;
        }
        if self.is_implemented(memory) {
            write!(f, " fixed")?;
        }
        writeln!(f, " {{")?;
        for &allocation in self.allocations_of(memory) {
            write!(f, "  alloc &{} ", ids.allocations[&allocation])?;
            self.write_string(f, self.ident_of(allocation))?;
            write!(f, " ")?;
            self.write_value(f, ids, self.value_of(allocation))?;
            writeln!(f)?;
        }
        for constant in self.constants_of(memory) {
            write!(f, "  const !{} -> ", ids.constants[&constant])?;
            self.write_location(f, ids, self.constant_target(constant))?;
            writeln!(f)?;
        }
        for lvalue in self.lvalues_of(memory) {
            self.write_access(f, ids, memory, lvalue)?;
        }
        for (index, &port) in self.ports_of(memory).iter().enumerate() {
            write!(f, "  port {}", index)?;
            if self.is_read_only(port) {
                write!(f, " ro")?;
            }
            let accesses = self.port_accesses(port);
            if accesses.is_empty() {
                writeln!(f, " {{}}")?;
            } else {
                write!(f, " {{")?;
                for &lvalue in accesses {
                    write!(f, " #{}", ids.lvalues[&lvalue])?;
                }
                writeln!(f, " }}")?;
            }
        }
        writeln!(f, "}}")
    }

    fn write_task(&self, f: &mut fmt::Formatter, ids: &Numbering, task: Task) -> fmt::Result {
        write!(f, "task ")?;
        self.write_string(f, self.task_name(task))?;
        let accesses = self.task_accesses(task);
        if accesses.is_empty() {
            writeln!(f, " {{}}")
        } else {
            write!(f, " {{")?;
            for &lvalue in accesses {
                write!(f, " #{}", ids.lvalues[&lvalue])?;
            }
            writeln!(f, " }}")
        }
    }
}

impl Display for Design {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ids = self.number();
        for memory in self.iter_memories() {
            self.write_memory(f, &ids, memory)?;
        }
        for task in self.iter_tasks() {
            self.write_task(f, &ids, task)?;
        }
        Ok(())
    }
}
