use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::simulation::config;
use crate::simulation::error::SimError;
use crate::simulation::events::{EventsPublisher, EventsQueue};
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::network::sim_network::{Arrival, SimNetwork};
use crate::simulation::scenario::Scenario;
use crate::simulation::time_queue::{EndTime, TimeQueue};
use crate::simulation::vehicles::Vehicle;

#[derive(Debug, Clone, PartialEq)]
struct Departure {
    time: u32,
    link: Id<Link>,
    vehicle: Id<Vehicle>,
}

impl EndTime for Departure {
    fn end_time(&self) -> f64 {
        self.time as f64
    }
}

/// Bookkeeping of the vehicles in the simulation. A vehicle is living from the start of the run
/// until it has no further leg, or until it is removed as stuck.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentCounter {
    pub living: usize,
    pub lost: usize,
    pub arrived: usize,
}

impl AgentCounter {
    fn add_living(&mut self) {
        self.living += 1;
    }

    fn arrived(&mut self, has_next_leg: bool) {
        self.arrived += 1;
        if !has_next_leg {
            self.living -= 1;
        }
    }

    fn lost(&mut self, count: usize) {
        self.lost += count;
        self.living -= count;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    /// The last simulated time step.
    pub end_time: u32,
    pub agents: AgentCounter,
    pub aborted: bool,
}

pub struct Simulation {
    config: config::Simulation,
    network: SimNetwork,
    departures: TimeQueue<Departure>,
    events: EventsPublisher,
    agent_counter: AgentCounter,
    abort: Arc<AtomicBool>,
}

impl Simulation {
    pub fn new(
        config: config::Simulation,
        scenario: Scenario,
        events: EventsPublisher,
    ) -> Result<Self, SimError> {
        let mut network = SimNetwork::from_network(&scenario.network, &config);
        network.add_change_events(scenario.change_events);

        let mut departures = TimeQueue::new();
        let mut agent_counter = AgentCounter::default();
        for v in scenario.vehicles {
            departures.add(Departure {
                time: v.departure,
                link: v.link.clone(),
                vehicle: v.vehicle.id.clone(),
            });
            network.park_vehicle(&v.link, v.vehicle)?;
            agent_counter.add_living();
        }

        Ok(Simulation {
            config,
            network,
            departures,
            events,
            agent_counter,
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the returned flag stops the simulation after the current time step. Vehicles still in
    /// traffic are removed as stuck.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn events(&mut self) -> &mut EventsPublisher {
        &mut self.events
    }

    pub fn run(&mut self) -> Result<SimulationResult, SimError> {
        let start_time = self.config.start_time;
        let end_time = self.config.end_time;
        let mut now = start_time;
        let mut aborted = false;
        let mut events = EventsQueue::new();
        info!(
            "Starting simulation. Start time {start_time}, End time {end_time}, {} agents",
            self.agent_counter.living
        );

        while now <= end_time {
            if self.abort.load(Ordering::Relaxed) {
                warn!("Simulation aborted at {now}.");
                aborted = true;
                break;
            }
            if now % 3600 == 0 {
                let hour = now / 3600;
                info!(
                    "Simulation at {hour}:00. Vehicles on network: {}, active links: {}, active nodes: {}",
                    self.network.veh_on_net(),
                    self.network.active_links(),
                    self.network.active_nodes()
                );
            }

            self.do_sim_step(now, &mut events)?;

            if self.is_finished() {
                break;
            }
            now += self.config.time_step;
        }

        let end_time = u32::min(now, end_time);
        self.teardown(end_time, &mut events);
        info!(
            "Simulation finished at {end_time}. Arrivals: {}, lost agents: {}, living agents: {}",
            self.agent_counter.arrived, self.agent_counter.lost, self.agent_counter.living
        );

        Ok(SimulationResult {
            end_time,
            agents: self.agent_counter,
            aborted,
        })
    }

    /// Links are moved before nodes, so that nodes see the buffers of this time step.
    fn do_sim_step(&mut self, now: u32, events: &mut EventsQueue) -> Result<(), SimError> {
        self.network.apply_change_events(now, &self.config)?;
        self.depart(now)?;

        let arrivals = self.network.move_links(now, events);
        self.handle_arrivals(&arrivals, now)?;

        let stuck = self.network.move_nodes(&self.config, now, events)?;
        self.agent_counter.lost(stuck.len());

        events.drain_into(&mut self.events);
        Ok(())
    }

    fn depart(&mut self, now: u32) -> Result<(), SimError> {
        for departure in self.departures.pop_all_due(now as f64) {
            self.network.depart(&departure.link, &departure.vehicle)?;
        }
        Ok(())
    }

    fn handle_arrivals(&mut self, arrivals: &[Arrival], now: u32) -> Result<(), SimError> {
        for arrival in arrivals {
            let next_departure = self.network.end_leg(arrival, now)?;
            self.agent_counter.arrived(next_departure.is_some());
            if let Some(time) = next_departure {
                self.departures.add(Departure {
                    time,
                    link: arrival.link.clone(),
                    vehicle: arrival.vehicle.clone(),
                });
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.network.veh_on_net() == 0
            && self.departures.is_empty()
            && !self.network.is_active()
    }

    fn teardown(&mut self, now: u32, events: &mut EventsQueue) {
        let cleared = self.network.clear_vehicles(now, events);
        if !cleared.is_empty() {
            warn!(
                "Removed {} vehicles which were still in traffic at {now}.",
                cleared.len()
            );
        }
        self.agent_counter.lost(cleared.len());
        events.drain_into(&mut self.events);
        self.events.finish();
    }
}
