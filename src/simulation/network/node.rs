use crate::simulation::config;
use crate::simulation::error::SimError;
use crate::simulation::events::{EventsQueue, PersonStuckEvent};
use crate::simulation::id::Id;
use crate::simulation::network::link::SimLink;
use crate::simulation::network::sim_network::ActiveCache;
use crate::simulation::network::{Link, Node};
use crate::simulation::vehicles::Vehicle;
use nohash_hasher::IntMap;
use tracing::{error, warn};

#[derive(Debug)]
pub struct SimNode {
    pub id: Id<Node>,
    in_links: Vec<Id<Link>>,
    out_links: Vec<Id<Link>>,
}

#[derive(Debug, Default)]
pub struct MoveNodeResult {
    /// Vehicles removed from the network, because they were stuck or had nowhere to go.
    pub stuck: Vec<Vehicle>,
    /// Any in link still offers a vehicle.
    pub is_active: bool,
}

impl SimNode {
    pub fn from_node(node: &Node) -> Self {
        SimNode {
            id: node.id.clone(),
            in_links: node.in_links.clone(),
            out_links: node.out_links.clone(),
        }
    }

    pub fn in_links(&self) -> &[Id<Link>] {
        &self.in_links
    }

    pub fn out_links(&self) -> &[Id<Link>] {
        &self.out_links
    }

    /// Moves vehicles from the buffers of the in links onto their next links. The buffer which
    /// waits longest is served first. Vehicles which can not move block their buffer for the rest of
    /// this time step.
    pub fn move_node(
        &self,
        links: &mut IntMap<Id<Link>, SimLink>,
        active_links: &mut ActiveCache<Link>,
        config: &config::Simulation,
        events: &mut EventsQueue,
        now: u32,
    ) -> Result<MoveNodeResult, SimError> {
        let mut offering = Vec::new();
        for id in &self.in_links {
            let link = get_link(links, id)?;
            if link.offers_veh().is_some() {
                offering.push((link.buffer_last_moved(), id));
            }
        }
        // stable sort, so that links which wait equally long keep their order
        offering.sort_by_key(|(last_moved, _)| *last_moved);

        let mut result = MoveNodeResult::default();
        for (_, in_id) in offering {
            self.move_link(in_id, links, active_links, config, events, now, &mut result)?;
        }

        for id in &self.in_links {
            if get_link(links, id)?.offers_veh().is_some() {
                result.is_active = true;
                break;
            }
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn move_link(
        &self,
        in_id: &Id<Link>,
        links: &mut IntMap<Id<Link>, SimLink>,
        active_links: &mut ActiveCache<Link>,
        config: &config::Simulation,
        events: &mut EventsQueue,
        now: u32,
        result: &mut MoveNodeResult,
    ) -> Result<(), SimError> {
        loop {
            let in_link = get_link(links, in_id)?;
            let Some(vehicle) = in_link.offers_veh() else {
                return Ok(());
            };

            let Some(next_id) = vehicle.driver().choose_next_link_id() else {
                error!(
                    "Vehicle {} on link {in_id} has no next link, but did not arrive. Removing it as stuck.",
                    vehicle.id
                );
                Self::remove_stuck(in_id, links, events, now, result)?;
                continue;
            };

            if !self.out_links.contains(&next_id) {
                return Err(SimError::NonAdjacentLink {
                    vehicle: vehicle.id.external().to_string(),
                    from_link: in_id.external().to_string(),
                    to_link: next_id.external().to_string(),
                    node: self.id.external().to_string(),
                });
            }

            if !in_link.has_green_for_to_link(&next_id) {
                return Ok(());
            }

            if get_link(links, &next_id)?.has_space(now) {
                Self::move_vehicle_over_node(in_id, &next_id, links, active_links, events, now)?;
                continue;
            }

            if in_link.is_veh_stuck(now) {
                if config.remove_stuck_vehicles {
                    Self::remove_stuck(in_id, links, events, now, result)?;
                } else {
                    warn!(
                        "Vehicle {} is stuck on link {in_id}. Moving it onto full link {next_id}.",
                        vehicle.id
                    );
                    Self::move_vehicle_over_node(
                        in_id,
                        &next_id,
                        links,
                        active_links,
                        events,
                        now,
                    )?;
                }
                continue;
            }

            return Ok(());
        }
    }

    fn move_vehicle_over_node(
        in_id: &Id<Link>,
        out_id: &Id<Link>,
        links: &mut IntMap<Id<Link>, SimLink>,
        active_links: &mut ActiveCache<Link>,
        events: &mut EventsQueue,
        now: u32,
    ) -> Result<(), SimError> {
        let Some(mut vehicle) = get_link_mut(links, in_id)?.pop_veh(now, events) else {
            return Ok(());
        };
        vehicle.driver_mut().notify_move_over_node(out_id);
        get_link_mut(links, out_id)?.add_from_upstream(vehicle, now, events);
        active_links.activate(out_id.clone());
        Ok(())
    }

    fn remove_stuck(
        in_id: &Id<Link>,
        links: &mut IntMap<Id<Link>, SimLink>,
        events: &mut EventsQueue,
        now: u32,
        result: &mut MoveNodeResult,
    ) -> Result<(), SimError> {
        let Some(vehicle) = get_link_mut(links, in_id)?.pop_veh(now, events) else {
            return Ok(());
        };
        events.push(PersonStuckEvent {
            time: now,
            person: vehicle.driver().id().clone(),
            link: in_id.clone(),
            vehicle: vehicle.id.clone(),
            mode: vehicle.driver().mode().clone(),
        });
        result.stuck.push(vehicle);
        Ok(())
    }
}

fn get_link<'a>(
    links: &'a IntMap<Id<Link>, SimLink>,
    id: &Id<Link>,
) -> Result<&'a SimLink, SimError> {
    links
        .get(id)
        .ok_or_else(|| SimError::UnknownLink(id.external().to_string()))
}

fn get_link_mut<'a>(
    links: &'a mut IntMap<Id<Link>, SimLink>,
    id: &Id<Link>,
) -> Result<&'a mut SimLink, SimError> {
    links
        .get_mut(id)
        .ok_or_else(|| SimError::UnknownLink(id.external().to_string()))
}
