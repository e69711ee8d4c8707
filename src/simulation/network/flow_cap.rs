/// Flow capacity of a link, i.e. how many vehicles may move from the queue into the buffer per
/// time step.
///
/// Capacities per time step are usually fractional. The integer part is granted every time step
/// (`remaining`), the fractional part is banked in `accumulated` until it allows one more vehicle.
/// This way the long run flow converges to the configured capacity.
#[derive(Debug, Clone)]
pub struct Flowcap {
    capacity_per_time_step: f64,
    fraction: f64,
    remaining: f64,
    accumulated: f64,
}

impl Flowcap {
    pub fn new(capacity_h: f64, time_step: u32, flow_capacity_factor: f64) -> Flowcap {
        let mut flow_cap = Flowcap {
            capacity_per_time_step: 0.,
            fraction: 0.,
            remaining: 0.,
            accumulated: 0.,
        };
        flow_cap.recalculate(capacity_h, time_step, flow_capacity_factor);
        flow_cap.accumulated = if flow_cap.fraction == 0. { 0. } else { 1. };
        flow_cap
    }

    /// Updates the capacity after link attributes have changed. Banked capacity is kept.
    pub fn recalculate(&mut self, capacity_h: f64, time_step: u32, flow_capacity_factor: f64) {
        let capacity_s = capacity_h / 3600.;
        self.capacity_per_time_step = capacity_s * time_step as f64 * flow_capacity_factor;
        self.fraction = self.capacity_per_time_step - self.capacity_per_time_step.trunc();
    }

    /// Grants the capacity of a new time step. The fractional part is only banked while the link
    /// shows green.
    pub fn refill(&mut self, is_green: bool) {
        self.remaining = self.capacity_per_time_step;
        if is_green && self.accumulated < 1. {
            self.accumulated += self.fraction;
        }
    }

    pub fn has_capacity_left(&self) -> bool {
        self.remaining >= 1. || self.accumulated >= 1.
    }

    /// Takes one unit of capacity. Capacity of the current time step is used before banked
    /// capacity. Returns false if neither has a unit left.
    #[must_use]
    pub fn consume(&mut self) -> bool {
        if self.remaining >= 1. {
            self.remaining -= 1.;
            true
        } else if self.accumulated >= 1. {
            self.accumulated -= 1.;
            true
        } else {
            false
        }
    }

    pub fn capacity_per_time_step(&self) -> f64 {
        self.capacity_per_time_step
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Maximum number of vehicles in the buffer.
    pub fn buffer_storage_capacity(&self) -> usize {
        self.capacity_per_time_step.ceil() as usize
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }
}
