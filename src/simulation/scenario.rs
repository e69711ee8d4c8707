use crate::simulation::agents::TransitStopFacility;
use crate::simulation::agents::network_route_driver::{NetworkLeg, NetworkRouteDriver};
use crate::simulation::agents::transit_driver::{TransitDriver, TransitStop};
use crate::simulation::error::SimError;
use crate::simulation::id::Id;
use crate::simulation::network::{ChangeValue, Link, Network, NetworkChangeEvent, Node};
use crate::simulation::vehicles::Vehicle;
use itertools::Itertools;
use nohash_hasher::IntMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOScenario {
    #[serde(default = "default_cell_size")]
    pub effective_cell_size: f64,
    pub nodes: Vec<String>,
    pub links: Vec<IOLink>,
    #[serde(default)]
    pub vehicles: Vec<IOVehicle>,
    #[serde(default)]
    pub transit_stops: Vec<IOTransitStop>,
    #[serde(default)]
    pub transit_vehicles: Vec<IOTransitVehicle>,
    #[serde(default)]
    pub change_events: Vec<IOChangeEvent>,
}

fn default_cell_size() -> f64 {
    7.5
}

fn default_pce() -> f64 {
    1.
}

fn default_lanes() -> f64 {
    1.
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOLink {
    pub id: String,
    pub from: String,
    pub to: String,
    pub length: f64,
    pub capacity: f64,
    pub freespeed: f64,
    #[serde(default = "default_lanes")]
    pub permlanes: f64,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOVehicle {
    pub id: String,
    /// Defaults to the vehicle's id.
    pub driver: Option<String>,
    #[serde(default = "default_car")]
    pub mode: String,
    #[serde(default = "default_pce")]
    pub pce: f64,
    pub legs: Vec<IOLeg>,
}

fn default_car() -> String {
    String::from("car")
}

fn default_pt() -> String {
    String::from("pt")
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOLeg {
    pub departure: u32,
    pub route: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOTransitStop {
    pub id: String,
    pub link: String,
    #[serde(default)]
    pub is_blocking_lane: bool,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOTransitVehicle {
    pub id: String,
    pub driver: Option<String>,
    #[serde(default = "default_pt")]
    pub mode: String,
    #[serde(default = "default_pce")]
    pub pce: f64,
    pub departure: u32,
    pub route: Vec<String>,
    #[serde(default)]
    pub stops: Vec<IOStopVisit>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOStopVisit {
    pub stop: String,
    #[serde(default)]
    pub dwell_time: u32,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IOChangeValue {
    Absolute(f64),
    Factor(f64),
}

impl From<IOChangeValue> for ChangeValue {
    fn from(value: IOChangeValue) -> Self {
        match value {
            IOChangeValue::Absolute(v) => ChangeValue::Absolute(v),
            IOChangeValue::Factor(v) => ChangeValue::Factor(v),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct IOChangeEvent {
    pub time: u32,
    pub links: Vec<String>,
    pub freespeed: Option<IOChangeValue>,
    pub lanes: Option<IOChangeValue>,
    pub flow_capacity: Option<IOChangeValue>,
}

impl IOScenario {
    pub fn from_file(path: &Path) -> Result<IOScenario, SimError> {
        let file = File::open(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| SimError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A vehicle parked on the first link of its route, which departs at `departure`.
#[derive(Debug)]
pub struct ScenarioVehicle {
    pub departure: u32,
    pub link: Id<Link>,
    pub vehicle: Vehicle,
}

#[derive(Debug)]
pub struct Scenario {
    pub network: Network,
    pub vehicles: Vec<ScenarioVehicle>,
    pub change_events: Vec<NetworkChangeEvent>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Scenario, SimError> {
        info!("Start loading scenario from {path:?}");
        let io = IOScenario::from_file(path)?;
        let scenario = Self::from_io(io)?;
        info!(
            "Finished loading scenario. It has {} nodes, {} links and {} vehicles",
            scenario.network.nodes.len(),
            scenario.network.links.len(),
            scenario.vehicles.len()
        );
        Ok(scenario)
    }

    pub fn from_io(io: IOScenario) -> Result<Scenario, SimError> {
        let network = Self::create_network(&io)?;

        let stops: IntMap<Id<TransitStopFacility>, TransitStopFacility> = io
            .transit_stops
            .iter()
            .map(|s| {
                let link = Self::link_id(&network, &s.link)?;
                let facility = TransitStopFacility {
                    id: Id::create(&s.id),
                    link,
                    is_blocking_lane: s.is_blocking_lane,
                };
                Ok((facility.id.clone(), facility))
            })
            .collect::<Result<_, SimError>>()?;

        let mut vehicles = Vec::new();
        for io_veh in &io.vehicles {
            vehicles.push(Self::create_vehicle(&network, io_veh)?);
        }
        for io_veh in &io.transit_vehicles {
            vehicles.push(Self::create_transit_vehicle(&network, &stops, io_veh)?);
        }
        Self::ensure_unique("vehicle", vehicles.iter().map(|v| v.vehicle.id.external()))?;

        let change_events = io
            .change_events
            .iter()
            .map(|e| {
                let links = e
                    .links
                    .iter()
                    .map(|l| Self::link_id(&network, l))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NetworkChangeEvent {
                    time: e.time,
                    links,
                    freespeed: e.freespeed.map(ChangeValue::from),
                    lanes: e.lanes.map(ChangeValue::from),
                    flow_capacity: e.flow_capacity.map(ChangeValue::from),
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        Ok(Scenario {
            network,
            vehicles,
            change_events,
        })
    }

    fn create_network(io: &IOScenario) -> Result<Network, SimError> {
        Self::ensure_unique("node", io.nodes.iter().map(String::as_str))?;
        Self::ensure_unique("link", io.links.iter().map(|l| l.id.as_str()))?;

        let mut network = Network::new();
        network.effective_cell_size = io.effective_cell_size;
        for id in &io.nodes {
            if Id::<Node>::try_get_from_ext(id).is_some() {
                return Err(SimError::InvalidScenario(format!(
                    "Node {id} was created before the network was loaded."
                )));
            }
            network.add_node(Node::new(Id::create(id)));
        }
        for l in &io.links {
            if Id::<Link>::try_get_from_ext(&l.id).is_some() {
                return Err(SimError::InvalidScenario(format!(
                    "Link {} was created before the network was loaded.",
                    l.id
                )));
            }
            let from = Id::try_get_from_ext(&l.from)
                .ok_or_else(|| SimError::UnknownNode(l.from.clone()))?;
            let to =
                Id::try_get_from_ext(&l.to).ok_or_else(|| SimError::UnknownNode(l.to.clone()))?;
            network.add_link(Link {
                id: Id::create(&l.id),
                from,
                to,
                length: l.length,
                capacity: l.capacity,
                freespeed: l.freespeed,
                permlanes: l.permlanes,
            })?;
        }
        Ok(network)
    }

    fn create_vehicle(network: &Network, io: &IOVehicle) -> Result<ScenarioVehicle, SimError> {
        let legs = io
            .legs
            .iter()
            .map(|leg| {
                Ok(NetworkLeg {
                    departure: leg.departure,
                    route: Self::route(network, &io.id, &leg.route)?,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;
        let Some(first) = legs.first() else {
            return Err(SimError::InvalidScenario(format!(
                "Vehicle {} has no legs.",
                io.id
            )));
        };
        let departure = first.departure;
        let link = first.route[0].clone();

        let driver_id = io.driver.as_deref().unwrap_or(&io.id);
        let driver = NetworkRouteDriver::new(Id::create(driver_id), Id::create(&io.mode), legs);
        Ok(ScenarioVehicle {
            departure,
            link,
            vehicle: Vehicle::new(Id::create(&io.id), io.pce, Box::new(driver)),
        })
    }

    fn create_transit_vehicle(
        network: &Network,
        stops: &IntMap<Id<TransitStopFacility>, TransitStopFacility>,
        io: &IOTransitVehicle,
    ) -> Result<ScenarioVehicle, SimError> {
        let route = Self::route(network, &io.id, &io.route)?;
        let stops = io
            .stops
            .iter()
            .map(|visit| {
                let facility = Id::try_get_from_ext(&visit.stop)
                    .and_then(|id| stops.get(&id))
                    .ok_or_else(|| {
                        SimError::InvalidScenario(format!(
                            "Transit vehicle {} serves unknown stop {}.",
                            io.id, visit.stop
                        ))
                    })?;
                Ok(TransitStop {
                    facility: facility.clone(),
                    dwell_time: visit.dwell_time,
                })
            })
            .collect::<Result<Vec<_>, SimError>>()?;

        let link = route[0].clone();
        let driver_id = io.driver.as_deref().unwrap_or(&io.id);
        let driver = TransitDriver::new(Id::create(driver_id), Id::create(&io.mode), route, stops);
        Ok(ScenarioVehicle {
            departure: io.departure,
            link,
            vehicle: Vehicle::new(Id::create(&io.id), io.pce, Box::new(driver)),
        })
    }

    fn route(network: &Network, vehicle: &str, route: &[String]) -> Result<Vec<Id<Link>>, SimError> {
        if route.is_empty() {
            return Err(SimError::InvalidScenario(format!(
                "Vehicle {vehicle} has an empty route."
            )));
        }
        route.iter().map(|l| Self::link_id(network, l)).collect()
    }

    fn link_id(network: &Network, id: &str) -> Result<Id<Link>, SimError> {
        let id = Id::try_get_from_ext(id).ok_or_else(|| SimError::UnknownLink(id.to_string()))?;
        network.try_get_link(&id)?;
        Ok(id)
    }

    fn ensure_unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<(), SimError> {
        let duplicates: Vec<_> = ids.duplicates().collect();
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(SimError::InvalidScenario(format!(
                "Duplicate {kind} ids: {}",
                duplicates.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::error::SimError;
    use crate::simulation::id;
    use crate::simulation::id::Id;
    use crate::simulation::network::ChangeValue;
    use crate::simulation::scenario::{IOChangeValue, IOScenario, Scenario};
    use macros::integration_test;

    const YAML: &str = r#"
nodes: [n1, n2, n3]
links:
  - { id: l1, from: n1, to: n2, length: 100, capacity: 3600, freespeed: 10 }
  - { id: l2, from: n2, to: n3, length: 200, capacity: 1800, freespeed: 20, permlanes: 2 }
vehicles:
  - id: car
    legs:
      - { departure: 10, route: [l1, l2] }
      - { departure: 100, route: [l2] }
transit_stops:
  - { id: s1, link: l2, is_blocking_lane: true }
transit_vehicles:
  - id: bus
    pce: 3
    departure: 5
    route: [l1, l2]
    stops:
      - { stop: s1, dwell_time: 30 }
change_events:
  - time: 3600
    links: [l2]
    flow_capacity: { type: factor, value: 0.5 }
"#;

    #[integration_test]
    fn from_yaml() {
        let io: IOScenario = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(7.5, io.effective_cell_size);
        assert_eq!(Some(IOChangeValue::Factor(0.5)), io.change_events[0].flow_capacity);

        let scenario = Scenario::from_io(io).unwrap();

        assert_eq!(3, scenario.network.nodes.len());
        assert_eq!(2, scenario.network.links.len());
        let l2 = scenario.network.get_link(&Id::get_from_ext("l2"));
        assert_eq!(2., l2.permlanes);
        assert_eq!(1., scenario.network.get_link(&Id::get_from_ext("l1")).permlanes);

        assert_eq!(2, scenario.vehicles.len());
        let car = &scenario.vehicles[0];
        assert_eq!(10, car.departure);
        assert_eq!("l1", car.link.external());
        assert!(!car.vehicle.is_transit());
        assert_eq!("car", car.vehicle.driver().mode().external());

        let bus = &scenario.vehicles[1];
        assert_eq!(5, bus.departure);
        assert_eq!(3., bus.vehicle.pce);
        assert!(bus.vehicle.is_transit());
        let stop = bus
            .vehicle
            .driver()
            .as_transit_driver()
            .unwrap()
            .next_transit_stop()
            .unwrap();
        assert!(stop.is_blocking_lane);
        assert_eq!("l2", stop.link.external());

        assert_eq!(1, scenario.change_events.len());
        assert_eq!(
            Some(ChangeValue::Factor(0.5)),
            scenario.change_events[0].flow_capacity
        );
    }

    #[integration_test]
    fn unknown_route_link() {
        let yaml = r#"
nodes: [n1, n2]
links:
  - { id: l1, from: n1, to: n2, length: 100, capacity: 3600, freespeed: 10 }
vehicles:
  - id: car
    legs:
      - { departure: 0, route: [l1, l7] }
"#;
        let io: IOScenario = serde_yaml::from_str(yaml).unwrap();
        let result = Scenario::from_io(io);
        assert!(matches!(result, Err(SimError::UnknownLink(id)) if id == "l7"));
    }

    #[integration_test]
    fn duplicate_links() {
        let yaml = r#"
nodes: [n1, n2]
links:
  - { id: l1, from: n1, to: n2, length: 100, capacity: 3600, freespeed: 10 }
  - { id: l1, from: n2, to: n1, length: 100, capacity: 3600, freespeed: 10 }
"#;
        let io: IOScenario = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            Scenario::from_io(io),
            Err(SimError::InvalidScenario(_))
        ));
    }

    #[integration_test]
    fn invalid_link_attributes() {
        for (attributes, invalid) in [
            ("length: 0, capacity: 3600, freespeed: 10", "length"),
            ("length: 100, capacity: 3600, freespeed: 0", "freespeed"),
            ("length: 100, capacity: -1, freespeed: 10", "capacity"),
            ("length: 100, capacity: 3600, freespeed: 10, permlanes: 0", "permlanes"),
        ] {
            id::reset_store();
            let yaml = format!(
                "nodes: [n1, n2]\nlinks:\n  - {{ id: l1, from: n1, to: n2, {attributes} }}\n"
            );
            let io: IOScenario = serde_yaml::from_str(&yaml).unwrap();
            match Scenario::from_io(io) {
                Err(SimError::InvalidScenario(msg)) => assert!(msg.contains(invalid), "{msg}"),
                other => panic!("{attributes} should be rejected, got {other:?}"),
            }
        }
    }

    #[integration_test]
    fn unknown_stop() {
        let yaml = r#"
nodes: [n1, n2]
links:
  - { id: l1, from: n1, to: n2, length: 100, capacity: 3600, freespeed: 10 }
transit_vehicles:
  - { id: bus, departure: 0, route: [l1], stops: [{ stop: nowhere }] }
"#;
        let io: IOScenario = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            Scenario::from_io(io),
            Err(SimError::InvalidScenario(_))
        ));
    }

    #[integration_test]
    fn missing_file() {
        let result = Scenario::from_file(std::path::Path::new("./does/not/exist.yml"));
        assert!(matches!(result, Err(SimError::Io { .. })));
    }
}
