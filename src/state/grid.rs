use std::collections::HashMap;

use rand::Rng;

use crate::infra::Position;

/// State of a single maze cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Wall,
    Path,
}

/// Fixed-size wall/path grid with bounds-checked access.
///
/// Consumers never see the backing storage; `is_walkable` is the only query
/// other components are allowed to build on.
#[derive(Clone, Debug)]
pub struct Grid {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create a grid with every cell set to `Wall`.
    pub fn filled(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::Wall; (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Interior cells exclude the outer border ring, which generation and
    /// mutation never touch.
    pub fn is_interior(&self, pos: Position) -> bool {
        pos.x > 0 && pos.x < self.width - 1 && pos.y > 0 && pos.y < self.height - 1
    }

    pub fn get(&self, pos: Position) -> Option<Cell> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(self.cells[(pos.y * self.width + pos.x) as usize])
    }

    pub fn set(&mut self, pos: Position, cell: Cell) {
        if self.in_bounds(pos) {
            self.cells[(pos.y * self.width + pos.x) as usize] = cell;
        }
    }

    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.get(Position::new(x, y)) == Some(Cell::Path)
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Position::new(x, y)))
    }
}

/// Set of current wall coordinates, kept incrementally in sync with the grid
/// so mutation sampling is O(walls) instead of an O(area) rescan.
///
/// Backed by a slot vector plus a position→slot map; removal swap-pops, so
/// insert, remove and uniform sampling are all O(1).
#[derive(Clone, Debug, Default)]
pub struct WallSet {
    slots: Vec<Position>,
    index: HashMap<Position, usize>,
}

impl WallSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pos: Position) -> bool {
        if self.index.contains_key(&pos) {
            return false;
        }
        self.index.insert(pos, self.slots.len());
        self.slots.push(pos);
        true
    }

    pub fn remove(&mut self, pos: Position) -> bool {
        let Some(slot) = self.index.remove(&pos) else {
            return false;
        };
        self.slots.swap_remove(slot);
        if let Some(&moved) = self.slots.get(slot) {
            self.index.insert(moved, slot);
        }
        true
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.index.contains_key(&pos)
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<Position> {
        if self.slots.is_empty() {
            return None;
        }
        Some(self.slots[rng.random_range(0..self.slots.len())])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.slots.iter()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn grid_bounds_and_cells() {
        let mut grid = Grid::filled(5, 4);
        assert!(!grid.is_walkable(2, 2));
        grid.set(Position::new(2, 2), Cell::Path);
        assert!(grid.is_walkable(2, 2));

        assert!(!grid.is_walkable(-1, 0));
        assert!(!grid.is_walkable(5, 0));
        assert!(!grid.is_walkable(0, 4));
        assert_eq!(grid.get(Position::new(9, 9)), None);

        assert!(grid.is_interior(Position::new(1, 1)));
        assert!(!grid.is_interior(Position::new(0, 1)));
        assert!(!grid.is_interior(Position::new(4, 1)));
    }

    #[test]
    fn wall_set_insert_remove() {
        let mut walls = WallSet::new();
        assert!(walls.insert(Position::new(1, 1)));
        assert!(walls.insert(Position::new(2, 1)));
        assert!(walls.insert(Position::new(3, 1)));
        assert!(!walls.insert(Position::new(2, 1)));
        assert_eq!(walls.len(), 3);

        assert!(walls.remove(Position::new(1, 1)));
        assert!(!walls.remove(Position::new(1, 1)));
        assert_eq!(walls.len(), 2);
        assert!(!walls.contains(Position::new(1, 1)));
        assert!(walls.contains(Position::new(2, 1)));
        assert!(walls.contains(Position::new(3, 1)));
    }

    #[test]
    fn wall_set_index_survives_swap_remove() {
        let mut walls = WallSet::new();
        for x in 0..20 {
            walls.insert(Position::new(x, 0));
        }
        // Remove from the middle so the tail slot gets swapped in.
        for x in (0..20).step_by(2) {
            assert!(walls.remove(Position::new(x, 0)));
        }
        assert_eq!(walls.len(), 10);
        for x in 0..20 {
            assert_eq!(walls.contains(Position::new(x, 0)), x % 2 == 1);
        }
        for x in (1..20).step_by(2) {
            assert!(walls.remove(Position::new(x, 0)));
        }
        assert!(walls.is_empty());
    }

    #[test]
    fn sampling_stays_within_set() {
        let mut walls = WallSet::new();
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(walls.sample(&mut rng), None);

        for x in 0..5 {
            walls.insert(Position::new(x, 7));
        }
        for _ in 0..50 {
            let pos = walls.sample(&mut rng).unwrap();
            assert!(walls.contains(pos));
        }
    }
}
