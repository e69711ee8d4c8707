use clap::Parser;
use rust_qnet::simulation::config::{CommandLineArgs, Config, WriteEvents};
use rust_qnet::simulation::error::SimError;
use rust_qnet::simulation::events::writer::JsonEventsWriter;
use rust_qnet::simulation::events::{EventsLogger, EventsPublisher};
use rust_qnet::simulation::logging::init_logging;
use rust_qnet::simulation::scenario::Scenario;
use rust_qnet::simulation::simulation::Simulation;
use std::path::Path;
use tracing::info;

fn main() -> Result<(), SimError> {
    let args = CommandLineArgs::parse();
    let config = Config::from_args(&args)?;

    let output_dir = config.resolve_path(&config.output.output_dir);
    std::fs::create_dir_all(&output_dir).map_err(|source| SimError::Io {
        path: output_dir.clone(),
        source,
    })?;
    let _guards = init_logging(&config);
    info!("Started with args: {:?}", args);

    let mut events = EventsPublisher::new();
    match config.output.write_events {
        WriteEvents::None => events.add_subscriber(Box::new(EventsLogger {})),
        WriteEvents::Json => events.add_subscriber(Box::new(JsonEventsWriter::new(
            &output_dir.join("events.json"),
        )?)),
    }

    let scenario = Scenario::from_file(Path::new(&args.scenario))?;
    let mut simulation = Simulation::new(config.simulation.clone(), scenario, events)?;
    let result = simulation.run()?;

    info!(
        "Simulation result: {}",
        serde_json::to_string(&result).unwrap_or_default()
    );
    Ok(())
}
