use std::collections::VecDeque;

use crate::bits::CellSet;
use crate::board::{ALL_DIRECTIONS, Board, Direction, MAX_SIZE, Position};
use crate::boxconf::BoxConfiguration;

/// Player reachability for one box configuration: the set of squares the
/// player can walk to without pushing anything, the canonical
/// representative used in state keys, and per-square move distances.
///
/// The struct owns its scratch grids and is recomputed in place; a
/// generation marker makes old distance entries invisible without
/// clearing the whole grid between searches.
pub struct PlayerReach {
    cells: CellSet,
    canonical: Position,
    dists: Box<[[u16; MAX_SIZE]; MAX_SIZE]>,
    markers: Box<[[u32; MAX_SIZE]; MAX_SIZE]>,
    marker: u32,
    queue: VecDeque<Position>,
}

impl PlayerReach {
    pub fn new() -> Self {
        PlayerReach {
            cells: CellSet::new(),
            canonical: Position(0, 0),
            dists: Box::new([[0; MAX_SIZE]; MAX_SIZE]),
            markers: Box::new([[0; MAX_SIZE]; MAX_SIZE]),
            marker: 0,
            queue: VecDeque::new(),
        }
    }

    /// Flood-fill from `from`, treating boxes in `conf` as blocked.
    pub fn compute(&mut self, board: &Board, conf: &BoxConfiguration, from: Position) {
        debug_assert!(!board.is_wall(from));

        self.marker += 1;
        self.cells.clear();
        self.queue.clear();

        self.cells.set(from);
        self.markers[from.1 as usize][from.0 as usize] = self.marker;
        self.dists[from.1 as usize][from.0 as usize] = 0;
        self.queue.push_back(from);

        while let Some(pos) = self.queue.pop_front() {
            let dist = self.dists[pos.1 as usize][pos.0 as usize];
            for dir in ALL_DIRECTIONS {
                let Some(next) = board.move_position(pos, dir) else {
                    continue;
                };
                if board.is_wall(next)
                    || self.markers[next.1 as usize][next.0 as usize] == self.marker
                {
                    continue;
                }
                if board
                    .box_cell_index(next)
                    .is_some_and(|idx| conf.contains(idx))
                {
                    continue;
                }
                self.markers[next.1 as usize][next.0 as usize] = self.marker;
                self.dists[next.1 as usize][next.0 as usize] = dist + 1;
                self.cells.set(next);
                self.queue.push_back(next);
            }
        }

        // The scan-order minimum doubles as the smallest reachable player
        // cell index, making it a stable state-key representative.
        self.canonical = self.cells.top_left().expect("reach cannot be empty");
    }

    pub fn cells(&self) -> &CellSet {
        &self.cells
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.cells.get(pos)
    }

    /// The canonical representative of this reach zone.
    pub fn canonical(&self) -> Position {
        self.canonical
    }

    /// Walking distance from the flood-fill source, if reachable.
    pub fn moves_to(&self, pos: Position) -> Option<u16> {
        if self.markers[pos.1 as usize][pos.0 as usize] == self.marker && self.cells.get(pos) {
            Some(self.dists[pos.1 as usize][pos.0 as usize])
        } else {
            None
        }
    }
}

impl Default for PlayerReach {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortest player walk from `from` to `to` with boxes in `conf` blocking,
/// as a direction sequence. Used when pushes are expanded back into moves.
pub fn walk_path(
    board: &Board,
    conf: &BoxConfiguration,
    from: Position,
    to: Position,
) -> Option<Vec<Direction>> {
    if from == to {
        return Some(Vec::new());
    }

    let mut prev: Box<[[Option<(Position, Direction)>; MAX_SIZE]; MAX_SIZE]> =
        Box::new([[None; MAX_SIZE]; MAX_SIZE]);
    let mut visited = CellSet::new();
    let mut queue = VecDeque::new();

    visited.set(from);
    queue.push_back(from);

    while let Some(pos) = queue.pop_front() {
        for dir in ALL_DIRECTIONS {
            let Some(next) = board.move_position(pos, dir) else {
                continue;
            };
            if board.is_wall(next) || visited.get(next) {
                continue;
            }
            if board
                .box_cell_index(next)
                .is_some_and(|idx| conf.contains(idx))
            {
                continue;
            }
            visited.set(next);
            prev[next.1 as usize][next.0 as usize] = Some((pos, dir));
            if next == to {
                let mut path = Vec::new();
                let mut cur = to;
                while cur != from {
                    let (parent, dir) = prev[cur.1 as usize][cur.0 as usize].unwrap();
                    path.push(dir);
                    cur = parent;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }

    None
}
