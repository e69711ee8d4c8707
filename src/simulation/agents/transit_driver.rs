use crate::simulation::agents::{DriverAgent, Person, TransitDriverAgent, TransitStopFacility};
use crate::simulation::id::Id;
use crate::simulation::network::Link;

#[derive(Debug, Clone, PartialEq)]
pub struct TransitStop {
    pub facility: TransitStopFacility,
    /// Seconds the vehicle dwells at the stop.
    pub dwell_time: u32,
}

/// Drives a transit vehicle along its route and dwells a fixed time at each stop.
#[derive(Debug)]
pub struct TransitDriver {
    id: Id<Person>,
    mode: Id<String>,
    route: Vec<Id<Link>>,
    stops: Vec<TransitStop>,
    route_index: usize,
    next_stop: usize,
    dwelling: bool,
}

impl TransitDriver {
    pub fn new(
        id: Id<Person>,
        mode: Id<String>,
        route: Vec<Id<Link>>,
        stops: Vec<TransitStop>,
    ) -> Self {
        assert!(!route.is_empty(), "Transit driver {id} has no route.");
        TransitDriver {
            id,
            mode,
            route,
            stops,
            route_index: 0,
            next_stop: 0,
            dwelling: false,
        }
    }

    pub fn served_stops(&self) -> usize {
        self.next_stop
    }
}

impl DriverAgent for TransitDriver {
    fn id(&self) -> &Id<Person> {
        &self.id
    }

    fn mode(&self) -> &Id<String> {
        &self.mode
    }

    fn choose_next_link_id(&self) -> Option<Id<Link>> {
        self.route.get(self.route_index + 1).cloned()
    }

    fn destination_link_id(&self) -> Option<Id<Link>> {
        self.route.last().cloned()
    }

    fn notify_move_over_node(&mut self, _new_link: &Id<Link>) {
        self.route_index += 1;
    }

    fn end_leg(&mut self, _now: u32) -> Option<u32> {
        self.route_index = self.route.len();
        None
    }

    fn as_transit_driver(&self) -> Option<&dyn TransitDriverAgent> {
        Some(self)
    }

    fn as_transit_driver_mut(&mut self) -> Option<&mut dyn TransitDriverAgent> {
        Some(self)
    }
}

impl TransitDriverAgent for TransitDriver {
    fn next_transit_stop(&self) -> Option<&TransitStopFacility> {
        self.stops.get(self.next_stop).map(|s| &s.facility)
    }

    fn handle_transit_stop(&mut self, stop: &TransitStopFacility, _now: u32) -> f64 {
        let Some(next) = self.stops.get(self.next_stop) else {
            return 0.;
        };
        if next.facility.id != stop.id {
            return 0.;
        }

        // the first call starts dwelling, the second one finishes the stop
        if !self.dwelling && next.dwell_time > 0 {
            self.dwelling = true;
            return next.dwell_time as f64;
        }
        self.dwelling = false;
        self.next_stop += 1;
        0.
    }
}
