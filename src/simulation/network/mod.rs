use crate::simulation::error::SimError;
use crate::simulation::id::Id;
use crate::simulation::time_queue::EndTime;

pub mod flow_cap;
pub mod holes;
pub mod link;
pub mod node;
pub mod signals;
pub mod sim_network;
pub mod storage_cap;
pub mod stuck_timer;
pub mod warnings;

/// The static road network as loaded from a scenario. The simulation builds its [sim_network::SimNetwork]
/// from it.
#[derive(Debug)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    /// Space one vehicle occupies on a lane in meters.
    pub effective_cell_size: f64,
}

#[derive(Debug)]
pub struct Node {
    pub id: Id<Node>,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    pub length: f64,
    /// Flow capacity in vehicles per hour.
    pub capacity: f64,
    /// Free speed in m/s
    pub freespeed: f64,
    pub permlanes: f64,
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Network {
            nodes: Vec::new(),
            links: Vec::new(),
            effective_cell_size: 7.5,
        }
    }

    pub fn add_node(&mut self, node: Node) {
        assert_eq!(
            node.id.internal() as usize,
            self.nodes.len(),
            "internal id {} and slot in node vec {} were not the same. Probably, node id {} already exists.",
            node.id.internal(),
            self.nodes.len(),
            node.id.external()
        );
        self.nodes.push(node);
    }

    /// Adds a link and wires it up with its from and to node.
    pub fn add_link(&mut self, link: Link) -> Result<(), SimError> {
        assert_eq!(
            link.id.internal() as usize,
            self.links.len(),
            "internal id {} and slot in link vec {} were not the same. Probably, this link id {} already exists",
            link.id.internal(),
            self.links.len(),
            link.id.external()
        );

        Link::validate_attributes(
            &link.id,
            link.length,
            link.freespeed,
            link.capacity,
            link.permlanes,
        )?;
        for node_id in [&link.from, &link.to] {
            if self.nodes.get(node_id.internal() as usize).is_none() {
                return Err(SimError::UnknownNode(node_id.external().to_string()));
            }
        }
        self.nodes[link.from.internal() as usize]
            .out_links
            .push(link.id.clone());
        self.nodes[link.to.internal() as usize]
            .in_links
            .push(link.id.clone());
        self.links.push(link);
        Ok(())
    }

    pub fn get_node(&self, id: &Id<Node>) -> &Node {
        &self.nodes[id.internal() as usize]
    }

    pub fn get_link(&self, id: &Id<Link>) -> &Link {
        &self.links[id.internal() as usize]
    }

    pub fn try_get_link(&self, id: &Id<Link>) -> Result<&Link, SimError> {
        self.links
            .get(id.internal() as usize)
            .ok_or_else(|| SimError::UnknownLink(id.external().to_string()))
    }
}

impl Node {
    pub fn new(id: Id<Node>) -> Self {
        Node {
            id,
            in_links: Vec::new(),
            out_links: Vec::new(),
        }
    }
}

impl Link {
    pub fn new_with_default(id: &str, from: &Node, to: &Node) -> Self {
        Link {
            id: Id::create(id),
            from: from.id.clone(),
            to: to.id.clone(),
            length: 1.0,
            capacity: 1.0,
            freespeed: 1.0,
            permlanes: 1.0,
        }
    }

    /// Fails for attributes which do not describe a passable road, e.g. a length of 0, which
    /// would make densities infinite.
    pub fn validate_attributes(
        id: &Id<Link>,
        length: f64,
        freespeed: f64,
        capacity: f64,
        lanes: f64,
    ) -> Result<(), SimError> {
        let invalid = |name: &str, value: f64| {
            Err(SimError::InvalidScenario(format!(
                "Link {id} has invalid {name}: {value}"
            )))
        };
        if length.is_nan() || length <= 0. {
            return invalid("length", length);
        }
        if freespeed.is_nan() || freespeed <= 0. {
            return invalid("freespeed", freespeed);
        }
        if capacity.is_nan() || capacity < 0. {
            return invalid("capacity", capacity);
        }
        if lanes.is_nan() || lanes <= 0. {
            return invalid("permlanes", lanes);
        }
        Ok(())
    }
}

/// How a [NetworkChangeEvent] modifies a link attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeValue {
    Absolute(f64),
    /// Multiplies the attribute's value from the network file.
    Factor(f64),
}

impl ChangeValue {
    pub fn apply(&self, base: f64) -> f64 {
        match self {
            ChangeValue::Absolute(value) => *value,
            ChangeValue::Factor(factor) => base * factor,
        }
    }
}

/// Changes attributes of links during the simulation, e.g. a lane closure due to an accident.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkChangeEvent {
    pub time: u32,
    pub links: Vec<Id<Link>>,
    pub freespeed: Option<ChangeValue>,
    pub lanes: Option<ChangeValue>,
    pub flow_capacity: Option<ChangeValue>,
}

impl EndTime for NetworkChangeEvent {
    fn end_time(&self) -> f64 {
        self.time as f64
    }
}
