mod pathfinding;
mod types;

pub use pathfinding::AStar;
pub use types::{ACTION_COUNT, Direction, Position};
