use crate::{Allocation, Design};

/// A handle for a place within the byte content of a memory.
///
/// Locations form a tree rooted at an allocation: the root covers the allocation's
/// entire value, an offset location covers `size` bytes at a fixed distance from the
/// start of its base, and an index location covers `size` bytes at a position within
/// its base that is only known at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    index: u32,
}

impl Location {
    pub(crate) const INVALID: Location = Location { index: u32::MAX };

    pub(crate) fn from_index(index: usize) -> Location {
        Location { index: index as u32 }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocationData {
    Root(Allocation),
    Offset { base: Location, delta: u32, size: u32 },
    Index { base: Location, size: u32 },
}

impl Design {
    pub fn add_offset(&mut self, base: Location, delta: u32, size: u32) -> Location {
        assert!(delta + size <= self.location_size(base), "offset range must lie within its base location");
        self.add_location(LocationData::Offset { base, delta, size })
    }

    pub fn add_index(&mut self, base: Location, size: u32) -> Location {
        assert!(size <= self.location_size(base), "indexed range must fit within its base location");
        self.add_location(LocationData::Index { base, size })
    }

    pub(crate) fn add_location(&mut self, data: LocationData) -> Location {
        let location = Location::from_index(self.locations.len());
        self.locations.push(data);
        location
    }

    pub fn location_size(&self, location: Location) -> u32 {
        match self.locations[location.index()] {
            LocationData::Root(allocation) => self.value_of(allocation).size(),
            LocationData::Offset { size, .. } => size,
            LocationData::Index { size, .. } => size,
        }
    }

    /// The location this one is derived from; a root location is its own base.
    pub fn location_base(&self, location: Location) -> Location {
        match self.locations[location.index()] {
            LocationData::Root(_) => location,
            LocationData::Offset { base, .. } => base,
            LocationData::Index { base, .. } => base,
        }
    }

    pub fn is_root(&self, location: Location) -> bool {
        matches!(self.locations[location.index()], LocationData::Root(_))
    }

    /// The allocation at the bottom of this location's base chain.
    pub fn absolute_base(&self, location: Location) -> Allocation {
        match self.locations[location.index()] {
            LocationData::Root(allocation) => allocation,
            LocationData::Offset { base, .. } => self.absolute_base(base),
            LocationData::Index { base, .. } => self.absolute_base(base),
        }
    }

    /// The smallest offset from the start of the allocation this location can denote.
    pub fn absolute_min(&self, location: Location) -> u32 {
        match self.locations[location.index()] {
            LocationData::Root(_) => 0,
            LocationData::Offset { base, delta, .. } => self.absolute_min(base) + delta,
            LocationData::Index { base, .. } => self.absolute_min(base),
        }
    }

    /// The largest offset from the start of the allocation this location can denote.
    pub fn absolute_max(&self, location: Location) -> u32 {
        match self.locations[location.index()] {
            LocationData::Root(_) => 0,
            LocationData::Offset { base, delta, .. } => self.absolute_max(base) + delta,
            LocationData::Index { base, size } => {
                self.absolute_max(base) + self.location_size(base) - size
            }
        }
    }

    /// One past the last byte this location can touch, relative to the allocation start.
    pub fn location_end(&self, location: Location) -> u32 {
        self.absolute_max(location) + self.location_size(location)
    }

    /// Two locations overlap when some placement of each can touch the same byte.
    /// Locations rooted at different allocations never overlap.
    pub fn overlaps(&self, lft: Location, rgt: Location) -> bool {
        if self.absolute_base(lft) != self.absolute_base(rgt) {
            return false;
        }
        self.absolute_min(lft) < self.location_end(rgt) && self.absolute_min(rgt) < self.location_end(lft)
    }

    /// Recreates a non-root location one level up from `new_base` instead of its own base.
    pub fn duplicate_for_base(&mut self, location: Location, new_base: Location) -> Location {
        match self.locations[location.index()] {
            LocationData::Root(_) => unreachable!("a root location cannot be rebased"),
            LocationData::Offset { delta, size, .. } => self.add_offset(new_base, delta, size),
            LocationData::Index { size, .. } => self.add_index(new_base, size),
        }
    }

    pub(crate) fn has_fixed_offset(&self, location: Location) -> bool {
        match self.locations[location.index()] {
            LocationData::Root(_) => true,
            LocationData::Offset { base, .. } => self.has_fixed_offset(base),
            LocationData::Index { .. } => false,
        }
    }

    /// Rebuilds a location on top of `new_root` after the first `delta` bytes of its
    /// old allocation were cut off. The base chain is flattened in the process: a
    /// fixed chain becomes a single offset, a chain with an index in it keeps only
    /// the run-time indexed size.
    pub fn chop_start(&mut self, location: Location, new_root: Location, delta: u32) -> Location {
        if self.is_root(location) {
            return new_root;
        }
        if self.has_fixed_offset(location) {
            let min = self.absolute_min(location);
            let size = self.location_size(location);
            assert!(min >= delta, "chopped location starts before the removed range");
            self.add_offset(new_root, min - delta, size)
        } else {
            self.add_index(new_root, self.location_size(location))
        }
    }
}
