use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::network::warnings::CapacityWarnings;

/// StorageCap tracks how many vehicles fit onto a link and how much of that space is occupied.
///
/// Vehicles consume storage when they enter the queue of a link and release it when they move into
/// the buffer or arrive. The buffer itself does not count towards the used storage.
#[derive(Debug, Clone)]
pub struct StorageCap {
    max: f64,
    used: f64,
}

/// Inputs of the storage capacity computation of one link.
#[derive(Debug, Clone, Copy)]
pub struct StorageGeometry {
    pub length: f64,
    pub lanes: f64,
    pub effective_cell_size: f64,
    pub storage_capacity_factor: f64,
    pub flow_cap_per_time_step: f64,
    pub free_flow_travel_time: f64,
}

impl StorageCap {
    pub fn new(max: f64) -> Self {
        StorageCap { max, used: 0.0 }
    }

    /// Computes the storage capacity from the link's geometry. The capacity needs to be at least
    /// large enough for the buffer and for all vehicles which can enter the link during the free
    /// flow travel time. Links below the latter are enlarged with a warning.
    pub fn calculate(
        link: &Id<Link>,
        geometry: &StorageGeometry,
        warnings: &mut CapacityWarnings,
    ) -> f64 {
        let buffer_storage_cap = geometry.flow_cap_per_time_step.ceil();
        let cap = geometry.length * geometry.lanes / geometry.effective_cell_size
            * geometry.storage_capacity_factor;
        let cap = f64::max(cap, buffer_storage_cap);

        let min_cap = geometry.free_flow_travel_time * geometry.flow_cap_per_time_step;
        if cap < min_cap {
            warnings.storage_enlarged(link, cap, min_cap);
            min_cap
        } else {
            cap
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }

    pub fn used(&self) -> f64 {
        self.used
    }

    /// Consumes storage capacity on a link
    ///
    /// This method should be called when a vehicle enters a link.
    pub fn consume(&mut self, value: f64) {
        self.used += value;
    }

    /// Releases storage capacity on a link
    ///
    /// This method should be called when a vehicle leaves the queue of a link
    pub fn release(&mut self, value: f64) {
        self.used -= value;
    }

    /// Tests whether there is storage capacity available on the link. A vehicle is admitted as
    /// long as any space is left, so that the capacity can be exceeded by one vehicle.
    pub fn is_available(&self) -> bool {
        self.used < self.max
    }
}
