#![allow(dead_code)]

use rust_qnet::simulation::config::{CommandLineArgs, Config};
use rust_qnet::simulation::events::{EventsCollector, EventsPublisher};
use rust_qnet::simulation::scenario::{IOScenario, Scenario};
use rust_qnet::simulation::simulation::{Simulation, SimulationResult};
use serde_json::Value;
use std::path::Path;

/// Loads config and scenario like the `local_qsim` binary does and runs the simulation with an
/// [EventsCollector] attached.
pub fn run_from_files(config: &str, scenario: &str) -> (Simulation, SimulationResult) {
    let args = CommandLineArgs::new_with_path(config, scenario);
    let config = Config::from_args(&args).unwrap();
    let scenario = Scenario::from_file(Path::new(&args.scenario)).unwrap();
    run(config, scenario)
}

pub fn run_yaml(config: Config, scenario: &str) -> (Simulation, SimulationResult) {
    let io: IOScenario = serde_yaml::from_str(scenario).unwrap();
    run(config, Scenario::from_io(io).unwrap())
}

pub fn run(config: Config, scenario: Scenario) -> (Simulation, SimulationResult) {
    let mut events = EventsPublisher::new();
    events.add_subscriber(Box::new(EventsCollector::default()));
    let mut simulation = Simulation::new(config.simulation, scenario, events).unwrap();
    let result = simulation.run().unwrap();
    (simulation, result)
}

/// `(time, vehicle)` of all events of `type_` on `link` in emission order.
pub fn times_on_link(sim: &mut Simulation, type_: &str, link: &str) -> Vec<(u64, String)> {
    let collector = sim.events().get_subscriber::<EventsCollector>().unwrap();
    collector
        .of_type(type_)
        .into_iter()
        .filter(|e| e["link"] == link)
        .map(|e: &Value| {
            (
                e["time"].as_u64().unwrap(),
                e["vehicle"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}
