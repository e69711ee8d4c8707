use crate::simulation::agents::{DriverAgent, Person};
use crate::simulation::id::Id;
use crate::simulation::network::Link;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkLeg {
    pub departure: u32,
    /// Link ids from the departure link to the destination link, both included.
    pub route: Vec<Id<Link>>,
}

/// Drives a vehicle along a fixed sequence of network routes. Each leg starts on the link where
/// the previous one ended.
#[derive(Debug)]
pub struct NetworkRouteDriver {
    id: Id<Person>,
    mode: Id<String>,
    legs: Vec<NetworkLeg>,
    curr_leg: usize,
    route_index: usize,
}

impl NetworkRouteDriver {
    pub fn new(id: Id<Person>, mode: Id<String>, legs: Vec<NetworkLeg>) -> Self {
        assert!(!legs.is_empty(), "Driver {id} has no legs.");
        for leg in &legs {
            assert!(!leg.route.is_empty(), "Driver {id} has a leg without route.");
        }
        NetworkRouteDriver {
            id,
            mode,
            legs,
            curr_leg: 0,
            route_index: 0,
        }
    }

    pub fn curr_leg(&self) -> Option<&NetworkLeg> {
        self.legs.get(self.curr_leg)
    }

    pub fn curr_link_id(&self) -> Option<&Id<Link>> {
        self.curr_leg()?.route.get(self.route_index)
    }

    pub fn departure_link_id(&self) -> Option<&Id<Link>> {
        self.curr_leg()?.route.first()
    }
}

impl DriverAgent for NetworkRouteDriver {
    fn id(&self) -> &Id<Person> {
        &self.id
    }

    fn mode(&self) -> &Id<String> {
        &self.mode
    }

    fn choose_next_link_id(&self) -> Option<Id<Link>> {
        self.curr_leg()?.route.get(self.route_index + 1).cloned()
    }

    fn destination_link_id(&self) -> Option<Id<Link>> {
        self.curr_leg()?.route.last().cloned()
    }

    fn notify_move_over_node(&mut self, new_link: &Id<Link>) {
        self.route_index += 1;
        debug_assert_eq!(Some(new_link), self.curr_link_id());
    }

    fn end_leg(&mut self, now: u32) -> Option<u32> {
        self.curr_leg += 1;
        self.route_index = 0;
        self.curr_leg().map(|leg| u32::max(leg.departure, now))
    }
}
