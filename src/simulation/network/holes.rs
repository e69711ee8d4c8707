use crate::simulation::config;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::network::warnings::CapacityWarnings;
use crate::simulation::random::get_rnd;
use crate::simulation::time_queue::{EndTime, TimeQueue};
use rand::Rng;
use rand::rngs::SmallRng;
use tracing::debug;

/// Free space on a link, which travels backwards from the downstream end of the link after a vehicle
/// left. Vehicles may only enter a link if a hole has reached its upstream end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hole {
    pub earliest_exit_time: f64,
}

impl EndTime for Hole {
    fn end_time(&self) -> f64 {
        self.earliest_exit_time
    }
}

/// The holes of one link. Holes are only tracked when spillback with holes is enabled.
#[derive(Debug)]
pub struct Holes {
    q: TimeQueue<Hole>,
    max_holes: usize,
    // holes to drop when they are emitted, because the link shrank in the meantime
    surplus: usize,
    travel_time: f64,
    rnd: SmallRng,
}

impl Holes {
    pub fn new(link: &Id<Link>, length: f64, config: &config::Simulation) -> Self {
        Holes {
            q: TimeQueue::new(),
            max_holes: 0,
            surplus: 0,
            travel_time: config.holes.travel_time(length),
            rnd: get_rnd(config.random_seed, link.internal()),
        }
    }

    /// Computes the congested density of a link and adjusts the number of holes to it. Returns
    /// the storage capacity, which is enlarged if the link is too narrow for its flow capacity.
    ///
    /// `base_flow_cap_s` is the unscaled flow capacity of the link in veh/s.
    pub fn update_capacity(
        &mut self,
        link: &Id<Link>,
        length: f64,
        storage_cap: f64,
        base_flow_cap_s: f64,
        config: &config::Holes,
        warnings: &mut CapacityWarnings,
    ) -> f64 {
        // density of a jammed link: stored vehicles minus the ones which are currently leaving
        let leaving = base_flow_cap_s * 3600. / (config.hole_speed_kmh * 1000.);
        let mut storage_cap = storage_cap;
        let mut density = storage_cap / length - leaving;

        if density > config.max_congested_density {
            warnings.congested_density_too_large(link, density, config.max_congested_density);
            density = config.max_congested_density;
        }
        if density < config.min_congested_density {
            warnings.congested_density_too_small(link, density);
            storage_cap = (config.min_congested_density + leaving) * length;
            density = storage_cap / length - leaving;
        }

        let max_holes = (density * length).ceil() as usize;
        self.set_max_holes(max_holes);
        debug!(
            "Link {link}: holes: {max_holes}, storage cap: {storage_cap}, length: {length}, bottleneck flow cap: {base_flow_cap_s}, congested density: {density}"
        );
        storage_cap
    }

    fn set_max_holes(&mut self, max_holes: usize) {
        if max_holes >= self.max_holes {
            let mut missing = max_holes - self.max_holes;
            let cancelled = usize::min(missing, self.surplus);
            self.surplus -= cancelled;
            missing -= cancelled;
            for _ in 0..missing {
                self.q.add(Hole {
                    earliest_exit_time: 0.,
                });
            }
        } else {
            for _ in 0..self.max_holes - max_holes {
                if self.q.pop().is_none() {
                    self.surplus += 1;
                }
            }
        }
        self.max_holes = max_holes;
    }

    /// A vehicle entered the link and occupies a hole. Without a hole left, the next emitted hole
    /// is dropped instead.
    pub fn consume(&mut self) {
        if self.q.pop().is_none() {
            self.surplus += 1;
        }
    }

    /// A vehicle arrived on the link. Its space travels backwards with hole speed.
    pub fn emit(&mut self, now: u32) {
        self.add(now as f64 + self.travel_time);
    }

    /// A vehicle moved into the buffer. The travel time of its hole is randomized by +-10%.
    pub fn emit_with_jitter(&mut self, now: u32) {
        let jitter: f64 = self.rnd.random();
        self.add(now as f64 + 0.9 * self.travel_time + 0.2 * jitter * self.travel_time);
    }

    fn add(&mut self, earliest_exit_time: f64) {
        if self.surplus > 0 {
            self.surplus -= 1;
            return;
        }
        self.q.add(Hole { earliest_exit_time });
    }

    /// A hole has reached the upstream end of the link.
    pub fn is_available(&self, now: u32) -> bool {
        self.q
            .peek()
            .is_some_and(|h| h.earliest_exit_time <= now as f64)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn max_holes(&self) -> usize {
        self.max_holes
    }
}
