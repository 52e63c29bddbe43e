//! Observation encoder - converts the actor's surroundings to a flat
//! feature vector for the Q-network.

use crate::infra::Position;
use crate::state::GridMaze;

/// Configuration for the observation encoder. The observation length is
/// fully determined by these values, so every network built against a given
/// config sees a fixed input size.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Radius of the local walkability window (radius 2 → 5x5 cells).
    pub window_radius: i32,
    /// Number of rival actor slots; missing rivals are zero-padded.
    pub tracked_rivals: usize,
    /// Divisor normalizing relative cell offsets.
    pub delta_scale: f32,
    /// Divisor normalizing the goal distance.
    pub distance_scale: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            window_radius: 2,
            tracked_rivals: 2,
            delta_scale: 20.0,
            distance_scale: 50.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    config: EncoderConfig,
}

impl ObservationEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Fixed observation length: walkability window + goal displacement and
    /// distance + two coordinates per rival slot.
    pub fn obs_size(&self) -> usize {
        let side = (2 * self.config.window_radius + 1) as usize;
        side * side + 3 + 2 * self.config.tracked_rivals
    }

    pub fn encode(&self, maze: &GridMaze, position: Position, rivals: &[Position]) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.obs_size());
        let radius = self.config.window_radius;

        // Local walkability window, row by row.
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let walkable = maze.is_walkable(position.x + dx, position.y + dy);
                obs.push(if walkable { 1.0 } else { 0.0 });
            }
        }

        // Goal-relative displacement and distance, normalized.
        let goal = maze.goal_position();
        let goal_dx = (goal.x - position.x) as f32;
        let goal_dy = (goal.y - position.y) as f32;
        obs.push(goal_dx / self.config.delta_scale);
        obs.push(goal_dy / self.config.delta_scale);
        obs.push(position.euclidean(&goal) / self.config.distance_scale);

        // Rival positions relative to the actor, zero-padded.
        for slot in 0..self.config.tracked_rivals {
            match rivals.get(slot) {
                Some(rival) => {
                    obs.push((rival.x - position.x) as f32 / self.config.delta_scale);
                    obs.push((rival.y - position.y) as f32 / self.config.delta_scale);
                }
                None => {
                    obs.push(0.0);
                    obs.push(0.0);
                }
            }
        }

        obs
    }
}
