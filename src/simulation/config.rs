use crate::simulation::error::SimError;
use clap::Parser;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config: String,
    #[arg(long, short)]
    pub scenario: String,
    #[arg(long = "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

impl CommandLineArgs {
    pub fn new_with_path(config: impl ToString, scenario: impl ToString) -> Self {
        CommandLineArgs {
            config: config.to_string(),
            scenario: scenario.to_string(),
            overrides: Vec::new(),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.find('=') {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("invalid KEY=VALUE: no `=` found in `{s}`")),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub simulation: Simulation,
    #[serde(default)]
    pub output: Output,
    #[serde(skip)]
    context: Option<PathBuf>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let file = File::open(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_yaml::from_reader(BufReader::new(file)).map_err(|source| SimError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        config.context = Some(path.to_path_buf());
        info!("Loaded config from {path:?}");
        Ok(config)
    }

    pub fn from_args(args: &CommandLineArgs) -> Result<Self, SimError> {
        let mut config = Self::from_file(Path::new(&args.config))?;
        config.apply_overrides(&args.overrides)?;
        Ok(config)
    }

    /// The file this config was loaded from. Relative paths in the config are resolved against it.
    pub fn context(&self) -> Option<&Path> {
        self.context.as_deref()
    }

    /// Resolves `path` relative to the directory of the config file.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match self.context.as_ref().and_then(|c| c.parent()) {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), SimError> {
        for (key, value) in overrides {
            info!("Overriding config value {key} with {value}");
            let sim = &mut self.simulation;
            match key.as_str() {
                "simulation.start_time" => sim.start_time = parse(key, value)?,
                "simulation.end_time" => sim.end_time = parse(key, value)?,
                "simulation.time_step" => sim.time_step = parse(key, value)?,
                "simulation.flow_capacity_factor" => sim.flow_capacity_factor = parse(key, value)?,
                "simulation.storage_capacity_factor" => {
                    sim.storage_capacity_factor = parse(key, value)?
                }
                "simulation.stuck_threshold" => sim.stuck_threshold = parse(key, value)?,
                "simulation.remove_stuck_vehicles" => {
                    sim.remove_stuck_vehicles = parse(key, value)?
                }
                "simulation.random_seed" => sim.random_seed = parse(key, value)?,
                "simulation.holes.enabled" => sim.holes.enabled = parse(key, value)?,
                "output.output_dir" => self.output.output_dir = PathBuf::from(value),
                _ => {
                    return Err(SimError::InvalidConfig {
                        key: key.clone(),
                        message: String::from("unknown config key"),
                    });
                }
            }
        }
        self.simulation.validate()
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, SimError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| SimError::InvalidConfig {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parameters of the traffic flow simulation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Simulation {
    pub start_time: u32,
    pub end_time: u32,
    /// Length of one simulation step in seconds.
    pub time_step: u32,
    /// Scales the flow capacity of all links, e.g. 0.1 for a 10% sample.
    pub flow_capacity_factor: f64,
    /// Scales the storage capacity of all links.
    pub storage_capacity_factor: f64,
    /// Seconds a vehicle may wait at the head of a buffer before it counts as stuck.
    pub stuck_threshold: u32,
    /// Stuck vehicles are removed from the network instead of being pushed onto the next link.
    pub remove_stuck_vehicles: bool,
    pub random_seed: u64,
    pub holes: Holes,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: 86400,
            time_step: 1,
            flow_capacity_factor: 1.0,
            storage_capacity_factor: 1.0,
            stuck_threshold: u32::MAX,
            remove_stuck_vehicles: false,
            random_seed: 4711,
            holes: Holes::default(),
        }
    }
}

impl Simulation {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.time_step == 0 {
            return Err(SimError::InvalidConfig {
                key: String::from("simulation.time_step"),
                message: String::from("must be at least 1 second"),
            });
        }
        if self.end_time < self.start_time {
            return Err(SimError::InvalidConfig {
                key: String::from("simulation.end_time"),
                message: format!("{} is before start time {}", self.end_time, self.start_time),
            });
        }
        if self.flow_capacity_factor <= 0. || self.storage_capacity_factor <= 0. {
            return Err(SimError::InvalidConfig {
                key: String::from("simulation.*_capacity_factor"),
                message: String::from("capacity factors must be positive"),
            });
        }
        self.holes.validate()
    }
}

/// Spillback modelled by holes, i.e. free space travelling backwards from the downstream end of a
/// link with `hole_speed_kmh`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Holes {
    pub enabled: bool,
    pub hole_speed_kmh: f64,
    /// Lower bound for the congested density in veh/m. Links below are widened.
    pub min_congested_density: f64,
    /// Upper bound for the congested density in veh/m.
    pub max_congested_density: f64,
}

impl Default for Holes {
    fn default() -> Self {
        Self {
            enabled: false,
            hole_speed_kmh: 15.,
            min_congested_density: 1. / 50.,
            max_congested_density: 10.,
        }
    }
}

impl Holes {
    /// Time in seconds a hole needs to travel backwards over `length` meters.
    pub fn travel_time(&self, length: f64) -> f64 {
        length * 3600. / (self.hole_speed_kmh * 1000.)
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.hole_speed_kmh <= 0. {
            return Err(SimError::InvalidConfig {
                key: String::from("simulation.holes.hole_speed_kmh"),
                message: String::from("must be positive"),
            });
        }
        if self.min_congested_density <= 0. || self.max_congested_density < self.min_congested_density {
            return Err(SimError::InvalidConfig {
                key: String::from("simulation.holes.min_congested_density"),
                message: String::from("must be positive and not above max_congested_density"),
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Output {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub write_events: WriteEvents,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            logging: Logging::default(),
            write_events: WriteEvents::default(),
        }
    }
}

/// Have this extra layer of log level enum, as tracing subscriber has no
/// off/none option by default. At least it can't be parsed
#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub enum WriteEvents {
    #[default]
    None,
    Json,
}
