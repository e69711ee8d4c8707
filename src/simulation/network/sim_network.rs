use crate::simulation::config;
use crate::simulation::error::SimError;
use crate::simulation::events::EventsQueue;
use crate::simulation::id::Id;
use crate::simulation::network::link::SimLink;
use crate::simulation::network::node::SimNode;
use crate::simulation::network::warnings::CapacityWarnings;
use crate::simulation::network::{Link, Network, NetworkChangeEvent, Node};
use crate::simulation::time_queue::TimeQueue;
use crate::simulation::vehicles::Vehicle;
use nohash_hasher::{IntMap, IntSet};
use tracing::{debug, instrument};

/// Ids of the links or nodes which need to be simulated in the next time step.
#[derive(Debug)]
pub struct ActiveCache<C: 'static> {
    active: IntSet<Id<C>>,
}

impl<C: 'static> Default for ActiveCache<C> {
    fn default() -> Self {
        ActiveCache {
            active: IntSet::default(),
        }
    }
}

impl<C: 'static> ActiveCache<C> {
    pub fn activate(&mut self, id: Id<C>) -> bool {
        self.active.insert(id)
    }

    pub fn deactivate(&mut self, id: &Id<C>) -> bool {
        self.active.remove(id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, id: &Id<C>) -> bool {
        self.active.contains(id)
    }

    fn clear(&mut self) {
        self.active.clear();
    }
}

impl<'a, C: 'static> IntoIterator for &'a ActiveCache<C> {
    type Item = &'a Id<C>;
    type IntoIter = <&'a IntSet<Id<C>> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.active.iter()
    }
}

/// A vehicle which arrived on its destination link and is parked there.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub link: Id<Link>,
    pub vehicle: Id<Vehicle>,
}

#[derive(Debug)]
pub struct SimNetwork {
    pub nodes: IntMap<Id<Node>, SimNode>,
    // use int map as hash map variant with stable order
    pub links: IntMap<Id<Link>, SimLink>,
    active_nodes: ActiveCache<Node>,
    active_links: ActiveCache<Link>,
    change_events: TimeQueue<NetworkChangeEvent>,
    warnings: CapacityWarnings,
    veh_counter: usize,
}

impl SimNetwork {
    pub fn from_network(network: &Network, config: &config::Simulation) -> Self {
        let mut warnings = CapacityWarnings::new();
        let links: IntMap<_, _> = network
            .links
            .iter()
            .map(|link| {
                (
                    link.id.clone(),
                    SimLink::from_link(link, network.effective_cell_size, config, &mut warnings),
                )
            })
            .collect();
        let nodes: IntMap<_, _> = network
            .nodes
            .iter()
            .map(|node| (node.id.clone(), SimNode::from_node(node)))
            .collect();

        debug!(
            "Created sim network with {} nodes and {} links.",
            nodes.len(),
            links.len()
        );

        SimNetwork {
            nodes,
            links,
            active_nodes: ActiveCache::default(),
            active_links: ActiveCache::default(),
            change_events: TimeQueue::new(),
            warnings,
            veh_counter: 0,
        }
    }

    pub fn active_nodes(&self) -> usize {
        self.active_nodes.len()
    }

    pub fn active_links(&self) -> usize {
        self.active_links.len()
    }

    pub fn is_active(&self) -> bool {
        !self.active_links.is_empty() || !self.active_nodes.is_empty()
    }

    /// Number of vehicles in traffic. Parked vehicles are not counted.
    pub fn veh_on_net(&self) -> usize {
        self.veh_counter
    }

    pub fn warnings(&self) -> &CapacityWarnings {
        &self.warnings
    }

    pub fn get_link(&self, id: &Id<Link>) -> Result<&SimLink, SimError> {
        self.links
            .get(id)
            .ok_or_else(|| SimError::UnknownLink(id.external().to_string()))
    }

    pub fn get_link_mut(&mut self, id: &Id<Link>) -> Result<&mut SimLink, SimError> {
        self.links
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownLink(id.external().to_string()))
    }

    pub fn add_change_events(&mut self, events: Vec<NetworkChangeEvent>) {
        for event in events {
            self.change_events.add(event);
        }
    }

    pub fn has_pending_change_events(&self) -> bool {
        !self.change_events.is_empty()
    }

    /// Applies all change events due at `now` and recomputes the capacities of the affected links.
    pub fn apply_change_events(
        &mut self,
        now: u32,
        config: &config::Simulation,
    ) -> Result<(), SimError> {
        for event in self.change_events.pop_all_due(now as f64) {
            for id in &event.links {
                let link = self
                    .links
                    .get_mut(id)
                    .ok_or_else(|| SimError::UnknownLink(id.external().to_string()))?;
                link.apply_change_event(&event)?;
                link.recalc_capacities(now, config, &mut self.warnings);
                // the link may need to accumulate flow capacity again
                self.active_links.activate(id.clone());
            }
        }
        Ok(())
    }

    pub fn park_vehicle(&mut self, link: &Id<Link>, vehicle: Vehicle) -> Result<(), SimError> {
        self.get_link_mut(link)?.add_parked_vehicle(vehicle);
        Ok(())
    }

    /// Takes a parked vehicle and puts it into the waiting list of its link.
    pub fn depart(&mut self, link_id: &Id<Link>, vehicle: &Id<Vehicle>) -> Result<(), SimError> {
        let link = self.get_link_mut(link_id)?;
        let vehicle = link.remove_parked_vehicle(vehicle)?;
        link.add_departing(vehicle);
        self.active_links.activate(link_id.clone());
        self.veh_counter += 1;
        Ok(())
    }

    /// Tells the driver of an arrived vehicle that its leg ended. Returns the time of the vehicle's
    /// next departure, if any.
    pub fn end_leg(&mut self, arrival: &Arrival, now: u32) -> Result<Option<u32>, SimError> {
        let link = self.get_link_mut(&arrival.link)?;
        let vehicle = link.parked_vehicle_mut(&arrival.vehicle).ok_or_else(|| {
            SimError::VehicleNotParked {
                vehicle: arrival.vehicle.external().to_string(),
                link: arrival.link.external().to_string(),
            }
        })?;
        Ok(vehicle.driver_mut().end_leg(now))
    }

    #[instrument(level = "trace", skip(self, events))]
    pub fn move_links(&mut self, now: u32, events: &mut EventsQueue) -> Vec<Arrival> {
        let mut arrivals = Vec::new();
        let mut deactivate: IntSet<Id<Link>> = IntSet::default();

        for id in &self.active_links {
            let Some(link) = self.links.get_mut(id) else {
                continue;
            };
            let arrived = link.do_sim_step(now, events);
            arrivals.extend(arrived.into_iter().map(|vehicle| Arrival {
                link: id.clone(),
                vehicle,
            }));

            if link.offers_veh().is_some() {
                self.active_nodes.activate(link.to.clone());
            }
            if !link.is_active() {
                deactivate.insert(id.clone());
            }
        }

        // bookkeeping. Links with nothing left to do are no longer active.
        for id in deactivate {
            self.active_links.deactivate(&id);
        }
        self.veh_counter -= arrivals.len();
        arrivals
    }

    /// Moves vehicles across all active nodes. Returns the vehicles which were removed, because they
    /// were stuck.
    #[instrument(level = "trace", skip(self, config, events))]
    pub fn move_nodes(
        &mut self,
        config: &config::Simulation,
        now: u32,
        events: &mut EventsQueue,
    ) -> Result<Vec<Vehicle>, SimError> {
        let mut stuck = Vec::new();
        let mut deactivate = Vec::new();

        for id in &self.active_nodes {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| SimError::UnknownNode(id.external().to_string()))?;
            let mut result =
                node.move_node(&mut self.links, &mut self.active_links, config, events, now)?;
            if !result.is_active {
                deactivate.push(id.clone());
            }
            stuck.append(&mut result.stuck);
        }

        for id in deactivate {
            self.active_nodes.deactivate(&id);
        }
        self.veh_counter -= stuck.len();
        Ok(stuck)
    }

    /// Removes all vehicles in traffic from the network. Each of them is reported as stuck.
    pub fn clear_vehicles(&mut self, now: u32, events: &mut EventsQueue) -> Vec<Vehicle> {
        let mut cleared = Vec::new();
        for link in self.links.values_mut() {
            cleared.append(&mut link.clear_vehicles(now, events));
        }
        self.active_links.clear();
        self.active_nodes.clear();
        self.veh_counter = 0;
        cleared
    }
}
