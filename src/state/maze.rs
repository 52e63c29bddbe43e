use std::collections::VecDeque;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::infra::Position;
use crate::state::grid::{Cell, Grid, WallSet};

/// Share of the wall population eligible for mutation at full intensity.
const SHIFT_BUDGET_RATIO: f32 = 0.1;
/// Attempt budget per requested wall addition before the pass gives up.
const SHIFT_ATTEMPT_FACTOR: usize = 3;

#[derive(Debug, Clone)]
pub struct MazeConfig {
    pub width: i32,
    pub height: i32,
    /// Fixed seed for reproducible layouts; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            width: 40,
            height: 30,
            seed: None,
        }
    }
}

/// Grid maze with bounded online mutation.
///
/// Invariant: the start and goal cells are always paths, and a 4-connected
/// path between them exists after generation and after every `shift_maze`
/// call. Mutation that would break this is reverted locally; anything that
/// slips past the guard is repaired by carving a direct corridor.
pub struct GridMaze {
    grid: Grid,
    walls: WallSet,
    start: Position,
    goal: Position,
    rng: SmallRng,
}

impl GridMaze {
    /// Carve a fresh maze: randomized depth-first passages on the step-2
    /// lattice from the start cell, goal forced open, reachability verified.
    /// Runs in time proportional to the maze area.
    pub fn generate(config: &MazeConfig) -> Self {
        let width = config.width.max(5);
        let height = config.height.max(5);
        if width != config.width || height != config.height {
            tracing::warn!(
                requested_width = config.width,
                requested_height = config.height,
                "maze dimensions below 5x5, clamping"
            );
        }

        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        let start = Position::new(1, 1);
        let goal = Position::new(width - 2, height - 2);
        let mut maze = Self {
            grid: Grid::filled(width, height),
            walls: WallSet::new(),
            start,
            goal,
            rng,
        };

        maze.carve_passages();

        // Force the goal open along with its approach notch on the border.
        maze.grid.set(maze.goal, Cell::Path);
        maze.grid
            .set(Position::new(maze.goal.x + 1, maze.goal.y), Cell::Path);

        // The carving reaches every room by construction, but the forced
        // opening is checked anyway; a disconnected goal gets a corridor.
        if !maze.has_path(maze.start, maze.goal) {
            maze.carve_corridor(maze.start, maze.goal);
        }

        // Full scan is acceptable here, at generation time only; every
        // later mutation maintains the set incrementally.
        for pos in maze.grid.positions() {
            if maze.grid.get(pos) == Some(Cell::Wall) {
                maze.walls.insert(pos);
            }
        }

        tracing::debug!(width, height, walls = maze.walls.len(), "maze generated");
        maze
    }

    /// Randomized depth-first carving over rooms at odd offsets; every room
    /// is connected to the start by construction.
    fn carve_passages(&mut self) {
        let mut visited = vec![false; (self.grid.width() * self.grid.height()) as usize];
        let mut stack = vec![self.start];
        self.grid.set(self.start, Cell::Path);
        visited[self.cell_index(self.start)] = true;

        while let Some(&current) = stack.last() {
            let mut directions = [(0, 2), (2, 0), (0, -2), (-2, 0)];
            directions.shuffle(&mut self.rng);

            let next = directions.iter().find_map(|&(dx, dy)| {
                let room = Position::new(current.x + dx, current.y + dy);
                (self.grid.is_interior(room) && !visited[self.cell_index(room)])
                    .then_some((room, Position::new(current.x + dx / 2, current.y + dy / 2)))
            });

            match next {
                Some((room, between)) => {
                    self.grid.set(between, Cell::Path);
                    self.grid.set(room, Cell::Path);
                    visited[self.cell_index(room)] = true;
                    stack.push(room);
                }
                None => {
                    stack.pop();
                }
            }
        }
    }

    /// Mutate the maze in place: open up to `intensity × walls × 0.1` walls,
    /// then close a roughly equal number of path cells. Every tentative wall
    /// is kept only if start→goal reachability survives, so the goal is
    /// reachable after every call, whatever the intensity. Running out of
    /// eligible placements is not an error.
    pub fn shift_maze(&mut self, intensity: f32) {
        let intensity = intensity.clamp(0.0, 1.0);
        let changes = (self.walls.len() as f32 * SHIFT_BUDGET_RATIO * intensity) as usize;
        if changes == 0 {
            return;
        }

        let mut removed = 0usize;
        for _ in 0..changes {
            let Some(wall) = self.walls.sample(&mut self.rng) else {
                break;
            };
            if self.grid.is_interior(wall) {
                self.set_path(wall);
                removed += 1;
            }
        }

        let mut added = 0usize;
        let mut attempts = 0usize;
        while added < changes && attempts < changes * SHIFT_ATTEMPT_FACTOR {
            attempts += 1;
            let candidate = Position::new(
                self.rng.random_range(1..self.grid.width() - 1),
                self.rng.random_range(1..self.grid.height() - 1),
            );
            if candidate == self.start
                || candidate == self.goal
                || self.grid.get(candidate) != Some(Cell::Path)
                || !self.can_add_wall(candidate)
            {
                continue;
            }

            self.set_wall(candidate);
            if self.has_path(self.start, self.goal) {
                added += 1;
            } else {
                // Reachability guard tripped: revert locally.
                self.set_path(candidate);
            }
        }

        tracing::debug!(removed, added, walls = self.walls.len(), "maze shifted");
    }

    /// Breadth-first reachability over interior path cells; out-of-bounds
    /// and wall cells are equally non-traversable.
    pub fn has_path(&self, start: Position, end: Position) -> bool {
        let mut visited = vec![false; (self.grid.width() * self.grid.height()) as usize];
        let mut queue = VecDeque::from([start]);
        if !self.grid.in_bounds(start) {
            return false;
        }
        visited[self.cell_index(start)] = true;

        while let Some(current) = queue.pop_front() {
            if current == end {
                return true;
            }
            for neighbor in current.neighbors() {
                if self.grid.is_interior(neighbor)
                    && self.grid.get(neighbor) == Some(Cell::Path)
                    && !visited[self.cell_index(neighbor)]
                {
                    visited[self.cell_index(neighbor)] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        false
    }

    /// Bounds-checked walkability; the only grid query exposed to the rest
    /// of the system.
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.grid.is_walkable(x, y)
    }

    /// Carve a horizontal-then-vertical corridor between two cells. Repair
    /// tool: used when reachability is lost through means the shift guard
    /// cannot see.
    pub fn create_direct_path(&mut self, start: Position, end: Position) {
        self.carve_corridor(start, end);
    }

    /// Verify the start→goal invariant and repair it if broken. Returns
    /// whether a repair was needed. Never fails: an unreachable goal is a
    /// recoverable anomaly, not an error.
    pub fn ensure_reachable(&mut self) -> bool {
        if self.has_path(self.start, self.goal) {
            return false;
        }
        tracing::warn!("goal unreachable, carving direct corridor");
        self.carve_corridor(self.start, self.goal);
        true
    }

    /// Closest walkable cell by expanding square rings; used to free actors
    /// trapped by a shift.
    pub fn nearest_walkable(&self, pos: Position) -> Option<Position> {
        let max_radius = self.grid.width().max(self.grid.height());
        for radius in 0..=max_radius {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let candidate = Position::new(pos.x + dx, pos.y + dy);
                    if self.grid.is_walkable(candidate.x, candidate.y) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    pub fn start_position(&self) -> Position {
        self.start
    }

    pub fn goal_position(&self) -> Position {
        self.goal
    }

    pub fn width(&self) -> i32 {
        self.grid.width()
    }

    pub fn height(&self) -> i32 {
        self.grid.height()
    }

    pub fn wall_count(&self) -> usize {
        self.walls.len()
    }

    fn carve_corridor(&mut self, start: Position, end: Position) {
        let mut current = start;
        while current.x != end.x {
            self.set_path(current);
            current.x += if current.x < end.x { 1 } else { -1 };
        }
        while current.y != end.y {
            self.set_path(current);
            current.y += if current.y < end.y { 1 } else { -1 };
        }
        self.set_path(end);
    }

    /// A path cell may become a wall only if at least two adjacent interior
    /// paths remain, so corridors are pinched rather than plugged.
    fn can_add_wall(&self, pos: Position) -> bool {
        pos.neighbors()
            .iter()
            .filter(|n| self.grid.is_interior(**n) && self.grid.get(**n) == Some(Cell::Path))
            .count()
            >= 2
    }

    fn set_path(&mut self, pos: Position) {
        self.grid.set(pos, Cell::Path);
        self.walls.remove(pos);
    }

    fn set_wall(&mut self, pos: Position) {
        self.grid.set(pos, Cell::Wall);
        self.walls.insert(pos);
    }

    fn cell_index(&self, pos: Position) -> usize {
        (pos.y * self.grid.width() + pos.x) as usize
    }
}

#[cfg(test)]
impl GridMaze {
    /// Build a maze from rows of `#` (wall), `.` (path), `S` (start) and
    /// `G` (goal). Without markers the start defaults to (1,1) and the goal
    /// to (width-2, height-2).
    pub(crate) fn from_ascii(rows: &[&str]) -> Self {
        let height = rows.len() as i32;
        let width = rows[0].len() as i32;
        let mut grid = Grid::filled(width, height);
        let mut start = Position::new(1, 1);
        let mut goal = Position::new(width - 2, height - 2);

        for (y, row) in rows.iter().enumerate() {
            assert_eq!(row.len() as i32, width, "ragged ascii maze");
            for (x, ch) in row.chars().enumerate() {
                let pos = Position::new(x as i32, y as i32);
                match ch {
                    '#' => {}
                    '.' => grid.set(pos, Cell::Path),
                    'S' => {
                        grid.set(pos, Cell::Path);
                        start = pos;
                    }
                    'G' => {
                        grid.set(pos, Cell::Path);
                        goal = pos;
                    }
                    other => panic!("unexpected maze char {other:?}"),
                }
            }
        }

        let mut walls = WallSet::new();
        for pos in grid.positions() {
            if grid.get(pos) == Some(Cell::Wall) {
                walls.insert(pos);
            }
        }

        Self {
            grid,
            walls,
            start,
            goal,
            rng: SmallRng::seed_from_u64(0),
        }
    }

    pub(crate) fn wall_set(&self) -> &WallSet {
        &self.walls
    }
}
