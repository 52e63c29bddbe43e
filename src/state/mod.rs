mod grid;
mod maze;

pub use grid::{Cell, Grid, WallSet};
pub use maze::{GridMaze, MazeConfig};
