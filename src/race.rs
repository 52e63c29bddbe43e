//! Headless race driver: owns the maze and the bot controllers, schedules
//! maze shifts, and reports the first finisher.

use std::time::Duration;

use burn::tensor::backend::AutodiffBackend;

use crate::config::GameConfig;
use crate::controller::{AgentController, TickContext};
use crate::infra::{ACTION_COUNT, Position};
use crate::rl::{DqnAgent, DqnConfig, EncoderConfig, ObservationEncoder, QNetworkConfig};
use crate::state::{GridMaze, MazeConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    /// Index of the first bot to finish, if any did within the tick budget.
    pub winner: Option<usize>,
    pub ticks: u64,
    pub completion_time: Option<Duration>,
}

pub struct Race<B: AutodiffBackend> {
    maze: GridMaze,
    controllers: Vec<AgentController<B>>,
    config: GameConfig,
    shift_timer: Duration,
    winner: Option<usize>,
    ticks: u64,
}

impl<B: AutodiffBackend> Race<B> {
    pub fn new(config: GameConfig, device: B::Device) -> Self {
        let maze = GridMaze::generate(&MazeConfig {
            width: config.maze_width,
            height: config.maze_height,
            seed: config.maze_seed,
        });

        let encoder_config = EncoderConfig::default();
        let spawns = spawn_positions(&maze, config.bot_count);

        let controllers = (0..config.bot_count)
            .map(|index| {
                let encoder = ObservationEncoder::new(encoder_config.clone());
                let agent_config = DqnConfig {
                    network: QNetworkConfig::new(encoder.obs_size(), ACTION_COUNT),
                    learning_rate: config.learning_rate,
                    discount: config.discount_factor,
                    epsilon_start: config.epsilon_start,
                    epsilon_end: config.epsilon_end,
                    epsilon_decay: config.epsilon_decay(),
                    replay_capacity: config.replay_capacity,
                    batch_size: config.batch_size,
                    seed: config.maze_seed.map(|seed| seed.wrapping_add(index as u64)),
                    ..DqnConfig::default()
                };
                let mut agent =
                    DqnAgent::new(device.clone(), format!("bot-{index}"), agent_config);
                agent.load_model(&config.model_dir);

                AgentController::new(
                    &maze,
                    spawns[index],
                    agent,
                    encoder,
                    config.decision_interval,
                    config.collision_enabled,
                )
            })
            .collect();

        Self {
            maze,
            controllers,
            config,
            shift_timer: Duration::ZERO,
            winner: None,
            ticks: 0,
        }
    }

    /// Advance the race by one tick. Positions are snapshotted first so
    /// every observation sees where the rivals stood at the start of the
    /// tick, not where earlier-updated bots already moved to.
    pub fn tick(&mut self, delta: Duration) {
        if self.winner.is_some() {
            return;
        }
        self.ticks += 1;

        let positions: Vec<Position> =
            self.controllers.iter().map(|c| c.position()).collect();

        for (index, controller) in self.controllers.iter_mut().enumerate() {
            let rivals: Vec<Position> = positions
                .iter()
                .enumerate()
                .filter(|(rival, _)| *rival != index)
                .map(|(_, pos)| *pos)
                .collect();
            let ctx = TickContext {
                maze: &self.maze,
                rivals: &rivals,
            };
            controller.update(delta, &ctx);
        }

        for (index, controller) in self.controllers.iter().enumerate() {
            if controller.completion_time().is_some() {
                tracing::info!(bot = index, ticks = self.ticks, "bot reached the goal");
                self.winner = Some(index);
                break;
            }
        }

        self.shift_timer += delta;
        if self.shift_timer >= self.config.shift_interval {
            self.shift_timer = Duration::ZERO;
            self.shift();
        }
    }

    /// Mutate the maze, repair reachability if anything slipped past the
    /// guard, free trapped actors, then notify every controller.
    fn shift(&mut self) {
        self.maze.shift_maze(self.config.shift_intensity);
        self.maze.ensure_reachable();

        for controller in self.controllers.iter_mut() {
            let pos = controller.position();
            if !self.maze.is_walkable(pos.x, pos.y) {
                if let Some(freed) = self.maze.nearest_walkable(pos) {
                    tracing::debug!(?pos, ?freed, "relocating walled-in bot");
                    controller.set_position(freed);
                }
            }
        }
        for controller in self.controllers.iter_mut() {
            controller.on_maze_shift(&self.maze);
        }
    }

    /// Run fixed-delta ticks until a bot finishes or the budget runs out.
    pub fn run(&mut self, max_ticks: u64, delta: Duration) -> RaceOutcome {
        for _ in 0..max_ticks {
            self.tick(delta);
            if self.winner.is_some() {
                break;
            }
        }

        let completion_time = self
            .winner
            .and_then(|index| self.controllers[index].completion_time());
        RaceOutcome {
            winner: self.winner,
            ticks: self.ticks,
            completion_time,
        }
    }

    /// Persist every bot's model. Failures are logged and skipped; a failed
    /// save never takes the race down.
    pub fn save_models(&self) {
        for controller in &self.controllers {
            if let Err(err) = controller.save_model(&self.config.model_dir) {
                tracing::warn!(model = controller.agent().model_id(), %err, "model save failed");
            }
        }
    }

    pub fn maze(&self) -> &GridMaze {
        &self.maze
    }

    pub fn controllers(&self) -> &[AgentController<B>] {
        &self.controllers
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner
    }
}

/// First `count` walkable cells in expanding rings around the start; the
/// start itself is always the first slot.
fn spawn_positions(maze: &GridMaze, count: usize) -> Vec<Position> {
    let start = maze.start_position();
    let mut positions = vec![start];
    let max_radius = maze.width().max(maze.height());

    'search: for radius in 1..=max_radius {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx.abs() != radius && dy.abs() != radius {
                    continue;
                }
                if positions.len() >= count {
                    break 'search;
                }
                let candidate = Position::new(start.x + dx, start.y + dy);
                if maze.is_walkable(candidate.x, candidate.y) {
                    positions.push(candidate);
                }
            }
        }
    }

    // Degenerate mazes may not offer enough distinct cells; double up on the
    // start rather than failing.
    while positions.len() < count {
        positions.push(start);
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type TestBackend = Autodiff<NdArray>;

    fn test_config() -> GameConfig {
        GameConfig {
            maze_width: 9,
            maze_height: 9,
            maze_seed: Some(13),
            bot_count: 2,
            decision_interval: Duration::ZERO,
            // Effectively disable shifting unless a test wants it.
            shift_interval: Duration::from_secs(3600),
            model_dir: std::env::temp_dir().join("shiftmaze-race-tests"),
            ..GameConfig::default()
        }
    }

    #[test]
    fn planned_bots_win_a_static_race() {
        let mut race = Race::<TestBackend>::new(test_config(), NdArrayDevice::Cpu);
        let outcome = race.run(500, Duration::from_millis(50));

        assert!(outcome.winner.is_some());
        assert!(outcome.completion_time.is_some());
        assert!(outcome.ticks <= 500);
    }

    #[test]
    fn race_declares_at_most_one_winner() {
        let mut race = Race::<TestBackend>::new(test_config(), NdArrayDevice::Cpu);
        race.run(500, Duration::from_millis(50));
        let winner = race.winner();

        // Further ticks change nothing once the race is decided.
        race.tick(Duration::from_millis(50));
        assert_eq!(race.winner(), winner);
    }

    #[test]
    fn shifts_keep_every_bot_on_walkable_cells() {
        let mut config = test_config();
        config.maze_width = 15;
        config.maze_height = 11;
        config.shift_interval = Duration::from_millis(200);
        config.shift_intensity = 1.0;

        let mut race = Race::<TestBackend>::new(config, NdArrayDevice::Cpu);
        for _ in 0..40 {
            race.tick(Duration::from_millis(50));
            let maze = race.maze();
            assert!(maze.has_path(maze.start_position(), maze.goal_position()));
            for controller in race.controllers() {
                let pos = controller.position();
                assert!(maze.is_walkable(pos.x, pos.y));
            }
            if race.winner().is_some() {
                break;
            }
        }
    }

    #[test]
    fn spawns_are_walkable_and_lead_with_start() {
        let maze = GridMaze::generate(&MazeConfig {
            width: 15,
            height: 11,
            seed: Some(3),
        });
        let spawns = spawn_positions(&maze, 4);
        assert_eq!(spawns.len(), 4);
        assert_eq!(spawns[0], maze.start_position());
        for spawn in &spawns {
            assert!(maze.is_walkable(spawn.x, spawn.y));
        }
    }
}
