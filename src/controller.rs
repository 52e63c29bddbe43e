//! Per-actor orchestration: follow a planned path while one exists, fall
//! back to the learned policy when it runs out, replan on maze shifts.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use burn::tensor::backend::AutodiffBackend;

use crate::infra::{AStar, Direction, Position};
use crate::rl::{DqnAgent, ObservationEncoder};
use crate::state::GridMaze;

/// Reward shaping constants. Bot behavior parity depends on these exact
/// values.
const DISTANCE_REWARD_SCALE: f32 = 10.0;
const GOAL_REWARD: f32 = 100.0;
const STUN_PENALTY: f32 = 20.0;
const STEP_PENALTY: f32 = 0.1;

/// Single actor record; specialization happens through the drive mode, not
/// through a type hierarchy.
#[derive(Debug, Clone)]
pub struct Actor {
    pub position: Position,
    /// Collision stun, set by the external collision layer; read here only
    /// for movement gating and the reward penalty.
    pub stunned: bool,
    pub distance_to_goal: f32,
    /// First goal arrival wins; set exactly once.
    pub completion_time: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    /// A planned direction queue is being consumed.
    Planned,
    /// No plan available; decisions come from the learned policy.
    Learned,
}

/// Per-tick inputs provided by the driver.
pub struct TickContext<'a> {
    pub maze: &'a GridMaze,
    /// Positions of the other tracked actors this tick.
    pub rivals: &'a [Position],
}

pub struct AgentController<B: AutodiffBackend> {
    actor: Actor,
    plan: VecDeque<Direction>,
    agent: DqnAgent<B>,
    encoder: ObservationEncoder,
    decision_interval: Duration,
    decision_timer: Duration,
    elapsed: Duration,
    episode_reward: f32,
    last_state: Option<Vec<f32>>,
    last_action: usize,
    collision_enabled: bool,
}

impl<B: AutodiffBackend> AgentController<B> {
    pub fn new(
        maze: &GridMaze,
        spawn: Position,
        agent: DqnAgent<B>,
        encoder: ObservationEncoder,
        decision_interval: Duration,
        collision_enabled: bool,
    ) -> Self {
        let mut controller = Self {
            actor: Actor {
                position: spawn,
                stunned: false,
                distance_to_goal: spawn.euclidean(&maze.goal_position()),
                completion_time: None,
            },
            plan: VecDeque::new(),
            agent,
            encoder,
            decision_interval,
            decision_timer: Duration::ZERO,
            elapsed: Duration::ZERO,
            episode_reward: 0.0,
            last_state: None,
            last_action: 0,
            collision_enabled,
        };
        controller.replan(maze);
        controller
    }

    /// Recompute the planned path from the current position. An unreachable
    /// goal simply leaves the queue empty and the controller in learned
    /// mode; planning failure is not an error.
    pub fn replan(&mut self, maze: &GridMaze) {
        self.plan.clear();
        if let Some(cells) = AStar::find_path(maze, self.actor.position, maze.goal_position()) {
            self.plan = AStar::to_directions(&cells).into();
        }
    }

    /// Maze mutation notification: learned-state bookkeeping is discarded so
    /// no Q-value is bootstrapped across the invalidated topology, then a
    /// fresh plan is computed.
    pub fn on_maze_shift(&mut self, maze: &GridMaze) {
        self.last_state = None;
        self.replan(maze);
    }

    /// Advance the decision timer; decides and moves once per configured
    /// interval. Finished actors stay put.
    pub fn update(&mut self, delta: Duration, ctx: &TickContext<'_>) {
        if self.actor.completion_time.is_some() {
            return;
        }
        self.elapsed += delta;
        self.decision_timer += delta;
        if self.decision_timer < self.decision_interval {
            return;
        }
        self.decision_timer = Duration::ZERO;
        self.decide(ctx);
    }

    fn decide(&mut self, ctx: &TickContext<'_>) {
        // Plan-following ticks never touch the learned policy.
        if let Some(direction) = self.plan.pop_front() {
            self.execute_move(direction, ctx.maze);
            return;
        }

        let state = self.encoder.encode(ctx.maze, self.actor.position, ctx.rivals);
        let action = self.agent.act(&state, true);

        if let Some(previous) = self.last_state.take() {
            let reward = self.step_reward(ctx.maze);
            self.episode_reward += reward;
            let terminal = self.at_goal(ctx.maze);
            self.agent
                .remember(previous, self.last_action, reward, state.clone(), terminal);
            self.agent.replay();
            if terminal {
                self.agent.end_episode(self.episode_reward);
                self.episode_reward = 0.0;
            }
        }

        self.last_state = Some(state);
        self.last_action = action;
        if let Some(direction) = Direction::from_index(action) {
            self.execute_move(direction, ctx.maze);
        }
    }

    fn execute_move(&mut self, direction: Direction, maze: &GridMaze) {
        // Stunned actors hold position while collisions are on; the move is
        // still acknowledged so the decision cadence continues.
        if !(self.actor.stunned && self.collision_enabled) {
            let target = self.actor.position.step(direction);
            if maze.is_walkable(target.x, target.y) {
                self.actor.position = target;
            }
        }

        self.actor.distance_to_goal = self.actor.position.euclidean(&maze.goal_position());
        if self.actor.distance_to_goal <= 1.0 && self.actor.completion_time.is_none() {
            self.actor.completion_time = Some(self.elapsed);
        }
    }

    /// `10·(closer by) + 100·goal − 20·stunned − 0.1` per decision.
    fn step_reward(&mut self, maze: &GridMaze) -> f32 {
        let previous = self.actor.distance_to_goal;
        let current = self.actor.position.euclidean(&maze.goal_position());
        self.actor.distance_to_goal = current;

        let mut reward = DISTANCE_REWARD_SCALE * (previous - current);
        if self.at_goal(maze) {
            reward += GOAL_REWARD;
        }
        if self.actor.stunned {
            reward -= STUN_PENALTY;
        }
        reward - STEP_PENALTY
    }

    fn at_goal(&self, maze: &GridMaze) -> bool {
        self.actor.position == maze.goal_position()
    }

    pub fn mode(&self) -> DriveMode {
        if self.plan.is_empty() {
            DriveMode::Learned
        } else {
            DriveMode::Planned
        }
    }

    pub fn position(&self) -> Position {
        self.actor.position
    }

    /// Relocation hook for the driver when a shift walls an actor in.
    pub fn set_position(&mut self, position: Position) {
        self.actor.position = position;
    }

    pub fn set_stunned(&mut self, stunned: bool) {
        self.actor.stunned = stunned;
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn completion_time(&self) -> Option<Duration> {
        self.actor.completion_time
    }

    pub fn distance_to_goal(&self) -> f32 {
        self.actor.distance_to_goal
    }

    pub fn plan_len(&self) -> usize {
        self.plan.len()
    }

    pub fn confidence(&self) -> f64 {
        self.agent.confidence()
    }

    pub fn agent(&self) -> &DqnAgent<B> {
        &self.agent
    }

    pub fn save_model(&self, dir: &Path) -> anyhow::Result<()> {
        self.agent.save_model(dir)
    }

    pub fn load_model(&mut self, dir: &Path) -> bool {
        self.agent.load_model(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{DqnConfig, EncoderConfig, QNetworkConfig};
    use burn::backend::Autodiff;
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type TestBackend = Autodiff<NdArray>;

    const TICK: Duration = Duration::from_millis(100);

    fn test_controller(maze: &GridMaze, spawn: Position) -> AgentController<TestBackend> {
        let encoder = ObservationEncoder::new(EncoderConfig::default());
        let config = DqnConfig {
            network: QNetworkConfig {
                obs_size: encoder.obs_size(),
                action_count: 4,
                hidden_sizes: vec![16, 16],
            },
            batch_size: 4,
            seed: Some(9),
            ..DqnConfig::default()
        };
        let agent = DqnAgent::new(NdArrayDevice::Cpu, "test-bot", config);
        AgentController::new(maze, spawn, agent, encoder, TICK, false)
    }

    #[test]
    fn plan_is_followed_without_learning() {
        let maze = GridMaze::from_ascii(&[
            "#######",
            "#S...G#",
            "#######",
        ]);
        let mut controller = test_controller(&maze, maze.start_position());
        assert_eq!(controller.mode(), DriveMode::Planned);
        assert_eq!(controller.plan_len(), 4);

        let ctx = TickContext {
            maze: &maze,
            rivals: &[],
        };
        for _ in 0..3 {
            controller.update(TICK, &ctx);
        }
        // Three steps along the corridor; arrival within one cell of the
        // goal already counts as finishing.
        assert_eq!(controller.position(), Position::new(4, 1));
        assert!(controller.completion_time().is_some());
        assert_eq!(controller.agent().replay_len(), 0);
    }

    #[test]
    fn unreachable_goal_falls_back_to_learned_mode() {
        let maze = GridMaze::from_ascii(&[
            "#######",
            "#S#..G#",
            "#.#...#",
            "#.#...#",
            "#######",
        ]);
        let mut controller = test_controller(&maze, maze.start_position());
        assert_eq!(controller.mode(), DriveMode::Learned);

        let ctx = TickContext {
            maze: &maze,
            rivals: &[],
        };
        controller.update(TICK, &ctx);
        assert!(controller.last_state.is_some());
        controller.update(TICK, &ctx);
        // Second learned decision records the first transition.
        assert_eq!(controller.agent().replay_len(), 1);
    }

    #[test]
    fn maze_shift_discards_bookkeeping_and_replans() {
        let walled = GridMaze::from_ascii(&[
            "#######",
            "#S#..G#",
            "#.#...#",
            "#.#...#",
            "#######",
        ]);
        let mut controller = test_controller(&walled, walled.start_position());
        let ctx = TickContext {
            maze: &walled,
            rivals: &[],
        };
        controller.update(TICK, &ctx);
        assert!(controller.last_state.is_some());

        let opened = GridMaze::from_ascii(&[
            "#######",
            "#S...G#",
            "#.....#",
            "#.....#",
            "#######",
        ]);
        controller.set_position(opened.start_position());
        controller.on_maze_shift(&opened);
        assert!(controller.last_state.is_none());
        assert_eq!(controller.mode(), DriveMode::Planned);
    }

    #[test]
    fn completion_time_is_set_exactly_once() {
        let maze = GridMaze::from_ascii(&[
            "#######",
            "#S....#",
            "#.....#",
            "#....G#",
            "#######",
        ]);
        let mut controller = test_controller(&maze, maze.start_position());
        // Force learned mode right next to the goal.
        controller.plan.clear();
        controller.actor.position = maze.goal_position();
        controller.actor.distance_to_goal = 0.0;

        let ctx = TickContext {
            maze: &maze,
            rivals: &[],
        };
        controller.update(TICK, &ctx);
        let first = controller.completion_time();
        assert!(first.is_some());

        for _ in 0..5 {
            controller.update(TICK, &ctx);
        }
        assert_eq!(controller.completion_time(), first);
    }

    #[test]
    fn reward_shaping_matches_formula() {
        let maze = GridMaze::from_ascii(&[
            "#######",
            "#S....#",
            "#.....#",
            "#....G#",
            "#######",
        ]);
        let mut controller = test_controller(&maze, maze.start_position());
        let goal = maze.goal_position();

        // Plain step: 10 × distance delta minus the step penalty.
        controller.actor.position = Position::new(2, 1);
        let current = Position::new(2, 1).euclidean(&goal);
        controller.actor.distance_to_goal = current + 1.0;
        let reward = controller.step_reward(&maze);
        assert!((reward - (10.0 - 0.1)).abs() < 1e-4);

        // Stun penalty stacks on top.
        controller.actor.stunned = true;
        controller.actor.distance_to_goal = current + 1.0;
        controller.actor.position = Position::new(2, 1);
        let reward = controller.step_reward(&maze);
        assert!((reward - (10.0 - 20.0 - 0.1)).abs() < 1e-4);
        controller.actor.stunned = false;

        // Goal arrival: +100 on top of the distance term.
        controller.actor.position = goal;
        controller.actor.distance_to_goal = 1.0;
        let reward = controller.step_reward(&maze);
        assert!((reward - (10.0 + 100.0 - 0.1)).abs() < 1e-4);
    }
}
