use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::infra::{Direction, Position};
use crate::state::GridMaze;

#[derive(Clone, Eq, PartialEq)]
struct Node {
    pos: Position,
    f_score: i32,
    seq: u32, // Insertion order; equal-cost ties resolve to the earliest node
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct AStar;

impl AStar {
    /// A* over 4-connected walkable cells with unit edge cost.
    ///
    /// The heuristic is squared Euclidean distance, which is not admissible
    /// for unit-cost grids; paths can occasionally be slightly longer than
    /// optimal in exchange for a much smaller frontier. Bot movement depends
    /// on this exact behavior, so it stays.
    ///
    /// Returns `None` when no path exists; callers treat that as "no plan
    /// available", not as an error.
    #[tracing::instrument(level = "trace", skip(maze), fields(start_x = start.x, start_y = start.y, goal_x = goal.x, goal_y = goal.y))]
    pub fn find_path(maze: &GridMaze, start: Position, goal: Position) -> Option<Vec<Position>> {
        if !maze.is_walkable(start.x, start.y) || !maze.is_walkable(goal.x, goal.y) {
            return None;
        }

        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut g_score: HashMap<Position, i32> = HashMap::new();
        let mut closed_set: HashSet<Position> = HashSet::new();
        let mut seq = 0u32;

        g_score.insert(start, 0);
        open_set.push(Node {
            pos: start,
            f_score: heuristic(start, goal),
            seq,
        });

        let mut expansions = 0usize;

        while let Some(Node { pos: current, .. }) = open_set.pop() {
            if current == goal {
                tracing::trace!(expansions, "Path found");
                return Some(reconstruct_path(&came_from, current));
            }

            // Closed-list discipline: an expanded node is never reopened,
            // even if a cheaper route to it turns up later.
            if !closed_set.insert(current) {
                continue;
            }
            expansions += 1;

            for neighbor in current.neighbors() {
                if closed_set.contains(&neighbor) {
                    continue;
                }

                if !maze.is_walkable(neighbor.x, neighbor.y) {
                    continue;
                }

                let tentative_g = g_score.get(&current).unwrap_or(&i32::MAX) + 1;

                if tentative_g < *g_score.get(&neighbor).unwrap_or(&i32::MAX) {
                    came_from.insert(neighbor, current);
                    g_score.insert(neighbor, tentative_g);
                    seq += 1;
                    open_set.push(Node {
                        pos: neighbor,
                        f_score: tentative_g + heuristic(neighbor, goal),
                        seq,
                    });
                }
            }
        }

        tracing::trace!(expansions, "No path found");
        None
    }

    /// Convert consecutive cell deltas into direction tokens.
    /// A path of one cell or fewer yields an empty sequence.
    pub fn to_directions(path: &[Position]) -> Vec<Direction> {
        let mut directions = Vec::with_capacity(path.len().saturating_sub(1));
        for pair in path.windows(2) {
            let dx = pair[1].x - pair[0].x;
            let dy = pair[1].y - pair[0].y;
            match (dx, dy) {
                (1, 0) => directions.push(Direction::Right),
                (-1, 0) => directions.push(Direction::Left),
                (0, 1) => directions.push(Direction::Down),
                (0, -1) => directions.push(Direction::Up),
                _ => {}
            }
        }
        directions
    }
}

fn heuristic(a: Position, b: Position) -> i32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

fn reconstruct_path(
    came_from: &HashMap<Position, Position>,
    mut current: Position,
) -> Vec<Position> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
