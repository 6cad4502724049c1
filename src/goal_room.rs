use std::collections::VecDeque;

use fxhash::FxHashMap;
use log::debug;

use crate::bits::CellSet;
use crate::board::{ALL_DIRECTIONS, Board, Direction, Position};
use crate::boxconf::BoxConfiguration;
use crate::reach::PlayerReach;

/// Rooms above this size are not worth the planning cost.
const MAX_ROOM_GOALS: usize = 10;
const MAX_ROOM_CELLS: usize = 36;

/// A goal room: a region holding every goal, connected to the rest of the
/// board through a single entrance square. Boxes can only enter one at a
/// time, so the order in which the goals are filled and the pushes that
/// fill them can be planned up front and replayed during the search
/// whenever a box sits on the entrance.
pub struct GoalRoom {
    room: CellSet,
    entrance: Position,
    outside: Position,
    /// Goals in feed order; `sequences[i]` pushes the i-th fed box from
    /// the entrance onto `order[i]`.
    order: Vec<Position>,
    sequences: Vec<Vec<Direction>>,
}

impl GoalRoom {
    /// Look for a goal room with a plannable feed order. Returns None when
    /// the board has no single-entrance goal region, when boxes start
    /// inside it, or when no feed order empties it.
    pub fn detect(board: &Board) -> Option<GoalRoom> {
        if board.goals().len() > MAX_ROOM_GOALS {
            return None;
        }

        let mut candidates: Vec<(Position, CellSet)> = Vec::new();
        for y in 0..board.height() as u8 {
            for x in 0..board.width() as u8 {
                let entrance = Position(x, y);
                if board.is_wall(entrance) || board.is_goal(entrance) {
                    continue;
                }
                if let Some(room) = try_split(board, entrance) {
                    candidates.push((entrance, room));
                }
            }
        }
        // Prefer the tightest split; a corridor produces one candidate per
        // corridor square, and only the innermost one excludes it.
        candidates.sort_by_key(|(_, room)| room.len());

        for (entrance, room) in candidates {
            if let Some(goal_room) = Self::build(board, entrance, room) {
                return Some(goal_room);
            }
        }
        None
    }

    fn build(board: &Board, entrance: Position, room: CellSet) -> Option<GoalRoom> {
        if room.len() > MAX_ROOM_CELLS {
            return None;
        }
        if board
            .box_starts()
            .iter()
            .any(|&pos| room.get(pos) || pos == entrance)
        {
            return None;
        }

        // The entrance must touch the room through exactly one square, so
        // the entering push direction is forced.
        let mut room_neighbors = Vec::new();
        let mut has_outside_neighbor = false;
        for dir in ALL_DIRECTIONS {
            let Some(next) = board.move_position(entrance, dir) else {
                continue;
            };
            if board.is_wall(next) {
                continue;
            }
            if room.get(next) {
                room_neighbors.push(dir);
            } else {
                has_outside_neighbor = true;
            }
        }
        if room_neighbors.len() != 1 || !has_outside_neighbor {
            return None;
        }
        let enter_dir = room_neighbors[0];
        let outside = board.move_position(entrance, enter_dir.reverse())?;
        if board.is_wall(outside) {
            return None;
        }

        let (order, sequences) = plan_feed(board, &room, entrance, outside)?;
        debug!(
            "goal room at {} with {} goals, feed order {:?}",
            entrance,
            order.len(),
            order
        );

        Some(GoalRoom {
            room,
            entrance,
            outside,
            order,
            sequences,
        })
    }

    pub fn entrance(&self) -> Position {
        self.entrance
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.room.get(pos)
    }

    /// If a box sits on the entrance, the room holds exactly the already
    /// planned goals, and the player can reach the pushing side, return
    /// the precomputed push directions for the next feed.
    pub fn fast_forward(
        &self,
        board: &Board,
        conf: &BoxConfiguration,
        reach: &PlayerReach,
    ) -> Option<&[Direction]> {
        let entrance_cell = board.box_cell_index(self.entrance)?;
        if !conf.contains(entrance_cell) {
            return None;
        }
        if !reach.contains(self.outside) {
            return None;
        }

        // Boxes inside the room must be exactly the planned prefix.
        let mut inside: Vec<Position> = conf
            .iter()
            .map(|cell| board.box_cell_pos(cell))
            .filter(|&pos| self.room.get(pos))
            .collect();
        let fed = inside.len();
        if fed >= self.sequences.len() {
            return None;
        }
        let mut expected = self.order[..fed].to_vec();
        inside.sort();
        expected.sort();
        if inside != expected {
            return None;
        }

        Some(&self.sequences[fed])
    }
}

/// Check whether walling off `entrance` separates a component that holds
/// every goal from the component holding the player start. Returns the
/// goal-side component.
fn try_split(board: &Board, entrance: Position) -> Option<CellSet> {
    let flood = |start: Position| -> CellSet {
        let mut seen = CellSet::new();
        let mut stack = vec![start];
        seen.set(start);
        while let Some(pos) = stack.pop() {
            for dir in ALL_DIRECTIONS {
                if let Some(next) = board.move_position(pos, dir) {
                    if !board.is_wall(next) && next != entrance && !seen.get(next) {
                        seen.set(next);
                        stack.push(next);
                    }
                }
            }
        }
        seen
    };

    if board.player_start() == entrance {
        return None;
    }
    let outside = flood(board.player_start());
    if board.goals().iter().any(|&g| outside.get(g)) {
        return None;
    }
    let room = flood(board.goals()[0]);
    if board.goals().iter().any(|&g| !room.get(g)) {
        return None;
    }
    debug_assert!(!room.intersects(&outside));
    Some(room)
}

/// Find the cheapest order in which to fill the room's goals, assuming
/// boxes arrive one at a time on the entrance. Dynamic program over the
/// set of already filled goals; each feed is an optimal push path computed
/// by a small search inside the room.
fn plan_feed(
    board: &Board,
    room: &CellSet,
    entrance: Position,
    outside: Position,
) -> Option<(Vec<Position>, Vec<Vec<Direction>>)> {
    let goals: Vec<Position> = board.goals().to_vec();
    let n = goals.len();

    // memo[mask] = (cost, next goal index, pushes for that feed)
    let mut memo: Vec<Option<(u32, usize, Vec<Direction>)>> = vec![None; 1 << n];
    let full = (1u32 << n) - 1;

    // Evaluate masks densest-first so every successor is already solved.
    let mut masks: Vec<u32> = (0..=full).collect();
    masks.sort_by_key(|m| std::cmp::Reverse(m.count_ones()));

    let mut costs: Vec<Option<u32>> = vec![None; 1 << n];
    costs[full as usize] = Some(0);

    for mask in masks {
        if mask == full {
            continue;
        }
        let mut best: Option<(u32, usize, Vec<Direction>)> = None;
        for (idx, &goal) in goals.iter().enumerate() {
            if mask & (1 << idx) != 0 {
                continue;
            }
            let next_mask = mask | (1 << idx);
            let Some(rest) = costs[next_mask as usize] else {
                continue;
            };
            let last = next_mask == full;
            let Some(pushes) = feed_path(board, room, entrance, outside, &goals, mask, goal, last)
            else {
                continue;
            };
            let total = rest + pushes.len() as u32;
            if best.as_ref().is_none_or(|(c, _, _)| total < *c) {
                best = Some((total, idx, pushes));
            }
        }
        costs[mask as usize] = best.as_ref().map(|(c, _, _)| *c);
        memo[mask as usize] = best;
    }

    costs[0]?;

    // Walk the choices from the empty room to recover order and pushes.
    let mut order = Vec::with_capacity(n);
    let mut sequences = Vec::with_capacity(n);
    let mut mask = 0u32;
    while mask != full {
        let (_, idx, pushes) = memo[mask as usize].take()?;
        order.push(goals[idx]);
        sequences.push(pushes);
        mask |= 1 << idx;
    }

    Some((order, sequences))
}

/// Optimal push path for one feed: the box stands on the entrance, the
/// player outside; push the box onto `target` without touching the goals
/// filled so far. Unless this is the last feed, the player must afterwards
/// be able to walk back out.
#[allow(clippy::too_many_arguments)]
fn feed_path(
    board: &Board,
    room: &CellSet,
    entrance: Position,
    outside: Position,
    goals: &[Position],
    filled_mask: u32,
    target: Position,
    last: bool,
) -> Option<Vec<Direction>> {
    let settled: Vec<Position> = goals
        .iter()
        .enumerate()
        .filter(|(idx, _)| filled_mask & (1 << idx) != 0)
        .map(|(_, &g)| g)
        .collect();

    let open = |pos: Position| -> bool {
        (room.get(pos) || pos == entrance || pos == outside) && !settled.contains(&pos)
    };
    // The box itself may stand on the entrance but never leaves the room
    // once pushed in, and never crosses back out.
    let box_open = |pos: Position| -> bool {
        room.get(pos) && !settled.contains(&pos) && !board.is_simple_deadlock(pos)
    };

    let player_zone = |box_pos: Position, from: Position| -> Option<(CellSet, Position)> {
        if !open(from) || from == box_pos {
            return None;
        }
        let mut zone = CellSet::new();
        let mut stack = vec![from];
        zone.set(from);
        while let Some(pos) = stack.pop() {
            for dir in ALL_DIRECTIONS {
                if let Some(next) = board.move_position(pos, dir) {
                    if open(next) && next != box_pos && !zone.get(next) {
                        zone.set(next);
                        stack.push(next);
                    }
                }
            }
        }
        let canonical = zone.top_left().unwrap();
        Some((zone, canonical))
    };

    type State = (Position, Position);
    let (_, start_rep) = player_zone(entrance, outside)?;
    let start: State = (entrance, start_rep);

    let mut parents: FxHashMap<State, (State, Direction)> = FxHashMap::default();
    parents.insert(start, (start, Direction::Up));
    let mut queue = VecDeque::new();
    queue.push_back(start);

    while let Some((box_pos, player_rep)) = queue.pop_front() {
        let Some((zone, _)) = player_zone(box_pos, player_rep) else {
            continue;
        };

        if box_pos == target {
            let exit_ok = last || zone.get(outside);
            if exit_ok {
                // Recover the push directions.
                let mut dirs = Vec::new();
                let mut state = (box_pos, player_rep);
                while state != start {
                    let (parent, dir) = parents[&state];
                    dirs.push(dir);
                    state = parent;
                }
                dirs.reverse();
                return Some(dirs);
            }
            continue;
        }

        for dir in ALL_DIRECTIONS {
            let Some(dest) = board.move_position(box_pos, dir) else {
                continue;
            };
            let Some(pside) = board.move_position(box_pos, dir.reverse()) else {
                continue;
            };
            if !box_open(dest) || !zone.get(pside) {
                continue;
            }
            let Some((_, new_rep)) = player_zone(dest, box_pos) else {
                continue;
            };
            let state = (dest, new_rep);
            if let std::collections::hash_map::Entry::Vacant(e) = parents.entry(state) {
                e.insert(((box_pos, player_rep), dir));
                queue.push_back(state);
            }
        }
    }

    None
}
