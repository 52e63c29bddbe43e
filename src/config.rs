//! Run configuration. One explicit struct handed to constructors; there is
//! no process-wide mutable state.

use std::path::PathBuf;
use std::time::Duration;

/// How cautiously the learned policy trades exploration for exploitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationProfile {
    Cautious,
    Balanced,
    Aggressive,
}

impl ExplorationProfile {
    /// Multiplicative epsilon decay applied after each successful training
    /// step.
    pub fn epsilon_decay(self) -> f64 {
        match self {
            ExplorationProfile::Cautious => 0.999,
            ExplorationProfile::Balanced => 0.995,
            ExplorationProfile::Aggressive => 0.99,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cautious" => Some(ExplorationProfile::Cautious),
            "balanced" => Some(ExplorationProfile::Balanced),
            "aggressive" => Some(ExplorationProfile::Aggressive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub maze_width: i32,
    pub maze_height: i32,
    /// Fixed maze seed for reproducible races; `None` seeds from the OS.
    pub maze_seed: Option<u64>,
    /// Wall time between maze shifts.
    pub shift_interval: Duration,
    /// Mutation intensity in [0, 1] passed to `shift_maze`.
    pub shift_intensity: f32,
    pub bot_count: usize,
    /// Time between controller decisions.
    pub decision_interval: Duration,
    pub learning_rate: f64,
    pub discount_factor: f32,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub exploration_profile: ExplorationProfile,
    pub replay_capacity: usize,
    pub batch_size: usize,
    /// When enabled, stunned actors cannot move until released.
    pub collision_enabled: bool,
    /// Directory the per-bot models are persisted under.
    pub model_dir: PathBuf,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            maze_width: 40,
            maze_height: 30,
            maze_seed: None,
            shift_interval: Duration::from_secs(10),
            shift_intensity: 0.5,
            bot_count: 2,
            decision_interval: Duration::from_millis(150),
            learning_rate: 0.1,
            discount_factor: 0.95,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            exploration_profile: ExplorationProfile::Balanced,
            replay_capacity: 10_000,
            batch_size: 32,
            collision_enabled: false,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl GameConfig {
    pub fn epsilon_decay(&self) -> f64 {
        self.exploration_profile.epsilon_decay()
    }
}
