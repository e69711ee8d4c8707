use crate::simulation::agents::network_route_driver::{NetworkLeg, NetworkRouteDriver};
use crate::simulation::agents::transit_driver::{TransitDriver, TransitStop};
use crate::simulation::agents::TransitStopFacility;
use crate::simulation::config;
use crate::simulation::id::Id;
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::vehicles::Vehicle;

pub fn config() -> config::Simulation {
    config::Simulation::default()
}

/// Creates a car with pce 1, whose driver follows `route` departing at 0. The driver's id equals
/// the vehicle's id.
pub fn create_vehicle(id: &str, route: &[&str]) -> Vehicle {
    let driver = NetworkRouteDriver::new(
        Id::create(id),
        Id::create("car"),
        vec![NetworkLeg {
            departure: 0,
            route: route.iter().map(|l| Id::create(l)).collect(),
        }],
    );
    Vehicle::new(Id::create(id), 1., Box::new(driver))
}

pub fn create_transit_vehicle(id: &str, route: &[&str], stops: Vec<TransitStop>) -> Vehicle {
    let driver = TransitDriver::new(
        Id::create(id),
        Id::create("pt"),
        route.iter().map(|l| Id::create(l)).collect(),
        stops,
    );
    Vehicle::new(Id::create(id), 1., Box::new(driver))
}

pub fn transit_stop(id: &str, link: &str, is_blocking_lane: bool) -> TransitStopFacility {
    TransitStopFacility {
        id: Id::create(id),
        link: Id::create(link),
        is_blocking_lane,
    }
}

fn add_link(
    network: &mut Network,
    id: &str,
    from: &str,
    to: &str,
    length: f64,
    freespeed: f64,
    capacity: f64,
) {
    network
        .add_link(Link {
            id: Id::create(id),
            from: Id::get_from_ext(from),
            to: Id::get_from_ext(to),
            length,
            capacity,
            freespeed,
            permlanes: 1.,
        })
        .unwrap();
}

/// n1 --link1--> n2 --link2--> n3 --link3--> n4. Each link is 100m long, with 10m/s free speed and
/// 1 veh/s flow capacity.
pub fn line_network() -> Network {
    let mut network = Network::new();
    for id in ["n1", "n2", "n3", "n4"] {
        network.add_node(Node::new(Id::create(id)));
    }
    add_link(&mut network, "link1", "n1", "n2", 100., 10., 3600.);
    add_link(&mut network, "link2", "n2", "n3", 100., 10., 3600.);
    add_link(&mut network, "link3", "n3", "n4", 100., 10., 3600.);
    network
}

/// Links "in-1" and "in-2" merge at node "n", which has the out links "out" and "other". "out"
/// stores a single vehicle.
pub fn merge_network(effective_cell_size: f64) -> Network {
    let mut network = Network::new();
    network.effective_cell_size = effective_cell_size;
    for id in ["a1", "a2", "n", "b", "c"] {
        network.add_node(Node::new(Id::create(id)));
    }
    add_link(&mut network, "in-1", "a1", "n", 100., 10., 3600.);
    add_link(&mut network, "in-2", "a2", "n", 100., 10., 3600.);
    add_link(&mut network, "out", "n", "b", effective_cell_size, effective_cell_size, 3600.);
    add_link(&mut network, "other", "n", "c", 100., 10., 3600.);
    network
}
