use crate::simulation::id::Id;
use crate::simulation::network::Link;
use nohash_hasher::IntSet;
use tracing::warn;

const MAX_STORAGE_WARNINGS: usize = 10;

/// Rate limits warnings about links whose geometry does not fit their capacity. One instance
/// lives as long as a simulation run.
#[derive(Debug, Default)]
pub struct CapacityWarnings {
    storage_warned_links: IntSet<Id<Link>>,
    storage_warnings: usize,
    density_too_large: bool,
    density_too_small: bool,
}

impl CapacityWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link's storage capacity is too small to hold the vehicles which can enter it during its
    /// free flow travel time. Warns once per link and at most ten times in total.
    pub fn storage_enlarged(&mut self, link: &Id<Link>, from: f64, to: f64) {
        if !self.storage_warned_links.insert(link.clone()) {
            return;
        }
        if self.storage_warnings < MAX_STORAGE_WARNINGS {
            warn!(
                "Link {link} too small: enlarge storage capacity from: {from} Vehicles to: {to} Vehicles. This is not fatal, but modifies the traffic flow dynamics."
            );
        }
        self.storage_warnings += 1;
        if self.storage_warnings == MAX_STORAGE_WARNINGS {
            warn!("Additional warnings of this type are suppressed.");
        }
    }

    pub fn congested_density_too_large(&mut self, link: &Id<Link>, density: f64, max: f64) {
        if !self.density_too_large {
            self.density_too_large = true;
            warn!(
                "Congested density of link {link} is very large: {density} veh/m. Setting to {max} veh/m. This warning is only given once."
            );
        }
    }

    pub fn congested_density_too_small(&mut self, link: &Id<Link>, density: f64) {
        if !self.density_too_small {
            self.density_too_small = true;
            warn!(
                "Link {link} is not wide enough to process its flow capacity with holes. Congested density is {density} veh/m. Increasing storage capacity. This warning is only given once."
            );
        }
    }

    /// Number of links whose storage capacity was enlarged.
    pub fn storage_warnings(&self) -> usize {
        self.storage_warnings
    }

    pub fn density_warnings(&self) -> usize {
        self.density_too_large as usize + self.density_too_small as usize
    }
}
