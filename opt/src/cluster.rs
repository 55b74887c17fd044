use std::collections::{BTreeMap, BTreeSet};

use prjfabric_memory::{Allocation, Design, Location, LogicalValue, Memory, RangeNotRemovable};

/// A group of access locations within one allocation whose byte ranges are
/// transitively connected by overlap. Bytes inside a cluster can never be
/// removed, since some access distinguishes them.
#[derive(Debug, Clone)]
pub struct LocationCluster {
    locations: BTreeSet<Location>,
    min: u32,
    end: u32,
    max_size: u32,
}

impl LocationCluster {
    fn new(design: &Design, location: Location) -> LocationCluster {
        LocationCluster {
            locations: BTreeSet::from([location]),
            min: design.absolute_min(location),
            end: design.location_end(location),
            max_size: design.location_size(location),
        }
    }

    /// Checks whether `location` can alias any member of this cluster.
    pub fn overlaps(&self, design: &Design, location: Location) -> bool {
        self.locations.iter().any(|&ours| design.overlaps(ours, location))
    }

    fn add(&mut self, design: &Design, location: Location) {
        self.min = self.min.min(design.absolute_min(location));
        self.end = self.end.max(design.location_end(location));
        self.max_size = self.max_size.max(design.location_size(location));
        self.locations.insert(location);
    }

    fn absorb(&mut self, other: LocationCluster) {
        self.min = self.min.min(other.min);
        self.end = self.end.max(other.end);
        self.max_size = self.max_size.max(other.max_size);
        self.locations.extend(other.locations);
    }

    pub fn locations(&self) -> &BTreeSet<Location> {
        &self.locations
    }

    /// Lowest byte offset any member can reach.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// One past the highest byte offset any member can reach.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Size of the widest member.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }
}

/// All access locations rooted at one allocation, grouped into overlap
/// clusters. The final grouping does not depend on the order locations were
/// added in: a location overlapping several clusters fuses them.
#[derive(Debug, Clone)]
pub struct BaseLocationMap {
    base: Allocation,
    clusters: Vec<LocationCluster>,
}

impl BaseLocationMap {
    pub fn new(base: Allocation) -> BaseLocationMap {
        BaseLocationMap { base, clusters: Vec::new() }
    }

    pub fn add_location(&mut self, design: &Design, location: Location) {
        assert_eq!(
            design.absolute_base(location),
            self.base,
            "location targets a different allocation"
        );
        let mut hits = Vec::new();
        for (index, cluster) in self.clusters.iter().enumerate() {
            if cluster.overlaps(design, location) {
                hits.push(index);
            }
        }
        match hits.first() {
            None => self.clusters.push(LocationCluster::new(design, location)),
            Some(&first) => {
                for &index in hits.iter().skip(1).rev() {
                    let other = self.clusters.remove(index);
                    self.clusters[first].absorb(other);
                }
                self.clusters[first].add(design, location);
            }
        }
    }

    pub fn base(&self) -> Allocation {
        self.base
    }

    pub fn clusters(&self) -> &[LocationCluster] {
        &self.clusters
    }

    /// Size of the widest location across all clusters, or zero if the
    /// allocation is never accessed.
    pub fn max_size(&self) -> u32 {
        self.clusters.iter().map(LocationCluster::max_size).max().unwrap_or(0)
    }

    /// How many leading bytes can be cut off without disturbing any access,
    /// rounded down to a multiple of the widest access so that every location
    /// keeps its alignment.
    pub fn is_movable_by(&self) -> u32 {
        let max_size = self.max_size();
        if max_size == 0 {
            return 0;
        }
        let min_lead = self.clusters.iter().map(LocationCluster::min).min().unwrap_or(0);
        max_size * (min_lead / max_size)
    }

    /// How many trailing bytes lie beyond the last reachable one.
    pub fn trimmable_bytes(&self, design: &Design) -> u32 {
        let size = design.location_size(design.root_location(self.base));
        let keep_end = self.clusters.iter().map(LocationCluster::end).max().unwrap_or(0);
        size - keep_end
    }

    /// Produces the allocation's value with the trailing slack and the first
    /// `delta` bytes removed. Fails if a removed byte holds part of a pointer.
    pub fn move_by(&self, design: &Design, delta: u32) -> Result<LogicalValue, RangeNotRemovable> {
        let size = design.location_size(design.root_location(self.base));
        let keep_end = self.clusters.iter().map(LocationCluster::end).max().unwrap_or(0);
        let value = design.value_of(self.base).remove_range(keep_end, size - keep_end)?;
        if delta == 0 || self.clusters.is_empty() {
            return Ok(value);
        }
        assert_eq!(delta % self.max_size(), 0, "move distance must be a multiple of the access unit");
        assert!(delta <= self.is_movable_by(), "move distance exceeds the leading gap");
        value.remove_range(0, delta)
    }
}

/// Builds a location map for every live allocation of `memory`, including the
/// ones no access reaches.
pub fn build_location_maps(design: &Design, memory: Memory) -> BTreeMap<Allocation, BaseLocationMap> {
    let mut maps = BTreeMap::new();
    for &allocation in design.allocations_of(memory) {
        maps.insert(allocation, BaseLocationMap::new(allocation));
    }
    for lvalue in design.lvalues_of(memory) {
        for &location in design.accesses_of(memory, lvalue) {
            let base = design.absolute_base(location);
            match maps.get_mut(&base) {
                Some(map) => map.add_location(design, location),
                None => panic!("access location targets a foreign memory"),
            }
        }
    }
    maps
}
