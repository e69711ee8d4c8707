pub mod network_route_driver;
pub mod transit_driver;

use crate::simulation::id::Id;
use crate::simulation::network::Link;
use std::fmt::Debug;

/// Marker type for ids of persons, which drive vehicles through the network.
#[derive(Debug)]
pub struct Person;

/// The interface through which links and nodes query the controller of a vehicle. The network
/// never inspects agent internals beyond these methods.
pub trait DriverAgent: Debug {
    fn id(&self) -> &Id<Person>;

    fn mode(&self) -> &Id<String>;

    /// The link the vehicle wants to enter after the current one. `None` if the current link is the
    /// last one of the route.
    fn choose_next_link_id(&self) -> Option<Id<Link>>;

    fn destination_link_id(&self) -> Option<Id<Link>>;

    /// Called when the vehicle crosses a node and enters `new_link`.
    fn notify_move_over_node(&mut self, new_link: &Id<Link>);

    /// Called when the vehicle arrived and was parked. Returns the time of the next departure from
    /// the current link, if the agent has another leg.
    fn end_leg(&mut self, now: u32) -> Option<u32>;

    fn as_transit_driver(&self) -> Option<&dyn TransitDriverAgent> {
        None
    }

    fn as_transit_driver_mut(&mut self) -> Option<&mut dyn TransitDriverAgent> {
        None
    }
}

/// Drivers of public transit vehicles, which serve stops along their route.
pub trait TransitDriverAgent {
    fn next_transit_stop(&self) -> Option<&TransitStopFacility>;

    /// Called when the vehicle reaches `stop`. Returns the delay in seconds the vehicle has to wait
    /// at the stop. A delay of 0 means the stop is served and the vehicle may continue.
    fn handle_transit_stop(&mut self, stop: &TransitStopFacility, now: u32) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitStopFacility {
    pub id: Id<TransitStopFacility>,
    pub link: Id<Link>,
    /// Dwelling vehicles block all following vehicles on the link.
    pub is_blocking_lane: bool,
}
