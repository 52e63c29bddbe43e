pub mod config;
pub mod controller;
pub mod infra;
pub mod race;
pub mod rl;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ExplorationProfile, GameConfig};
pub use controller::{Actor, AgentController, DriveMode, TickContext};
pub use infra::{ACTION_COUNT, AStar, Direction, Position};
pub use race::{Race, RaceOutcome};
pub use rl::{DqnAgent, DqnConfig, ObservationEncoder, ReplayBuffer};
pub use state::{GridMaze, MazeConfig};
