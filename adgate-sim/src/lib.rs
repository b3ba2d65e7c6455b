pub mod simulation;

pub use simulation::{run_rounds, SimulationReport};
