use std::path::PathBuf;
use thiserror::Error;

/// Errors which abort a simulation run. They indicate broken input, e.g. a corrupt route or an
/// invalid config file. Violated internal invariants are not reported through this type, they
/// panic.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(
        "Vehicle {vehicle} on link {from_link} wants to move to link {to_link}, which is not an out link of node {node}"
    )]
    NonAdjacentLink {
        vehicle: String,
        from_link: String,
        to_link: String,
        node: String,
    },
    #[error("Link {0} is not part of the network")]
    UnknownLink(String),
    #[error("Node {0} is not part of the network")]
    UnknownNode(String),
    #[error("Vehicle {vehicle} is not parked on link {link}")]
    VehicleNotParked { vehicle: String, link: String },
    #[error("Link {to_link} is not reachable from link {from_link}")]
    UnreachableTurningMove { from_link: String, to_link: String },
    #[error("Link {0} is not signalized")]
    NotSignalized(String),
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("Invalid config value for {key}: {message}")]
    InvalidConfig { key: String, message: String },
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
