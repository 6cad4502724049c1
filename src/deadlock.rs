use crate::bits::CellSet;
use crate::board::{ALL_DIRECTIONS, Board, Direction, MAX_SIZE, Position, Tile};
use crate::boxconf::BoxConfiguration;

/// Compute the cells from which a box can never reach any goal, from
/// geometry alone. Works on raw tiles because it runs during board
/// construction, before the dense numberings exist.
///
/// A box placed on a goal can trivially reach one, so we pull a box
/// backward from every goal over all player positions; any non-wall cell
/// the pulls never touch is a simple deadlock.
pub(crate) fn compute_simple_deadlocks(
    tiles: &[[Tile; MAX_SIZE]; MAX_SIZE],
    width: u8,
    height: u8,
    goals: &[Position],
) -> CellSet {
    let move_pos = |pos: Position, dir: Direction| -> Option<Position> {
        let (dx, dy) = dir.delta();
        let nx = pos.0 as i32 + dx as i32;
        let ny = pos.1 as i32 + dy as i32;
        if nx >= 0 && ny >= 0 && nx < width as i32 && ny < height as i32 {
            Some(Position(nx as u8, ny as u8))
        } else {
            None
        }
    };
    let is_wall = |pos: Position| tiles[pos.1 as usize][pos.0 as usize] == Tile::Wall;

    let mut reachable = CellSet::new();
    let mut stack: Vec<Position> = Vec::new();

    for &goal in goals {
        if reachable.get(goal) {
            continue;
        }
        reachable.set(goal);
        stack.push(goal);

        while let Some(box_pos) = stack.pop() {
            // Pull the box from box_pos to next; the player pulls from one
            // square further out, so both squares must be open.
            for dir in ALL_DIRECTIONS {
                let Some(next) = move_pos(box_pos, dir) else {
                    continue;
                };
                let Some(player_pos) = move_pos(next, dir) else {
                    continue;
                };
                if !is_wall(next) && !is_wall(player_pos) && !reachable.get(next) {
                    reachable.set(next);
                    stack.push(next);
                }
            }
        }
    }

    let mut deadlocks = CellSet::new();
    for y in 0..height {
        for x in 0..width {
            let pos = Position(x, y);
            if !is_wall(pos) && !reachable.get(pos) {
                deadlocks.set(pos);
            }
        }
    }
    deadlocks
}

/// Compute the boxes of `conf` that can never move again, regardless of
/// what the player does.
///
/// Starts from the assumption that every box is frozen and relaxes: a box
/// becomes unfrozen when it is movable along some axis, i.e. both squares
/// on that axis are open (no wall, no still-frozen box) and they are not
/// both simple deadlocks. Unfreezing a box wakes its neighbors for
/// re-checking until the set is stable.
pub fn frozen_boxes(board: &Board, conf: &BoxConfiguration) -> BoxConfiguration {
    let mut frozen = conf.clone();
    let mut to_check: Vec<u16> = conf.iter().collect();

    while let Some(cell) = to_check.pop() {
        if !frozen.contains(cell) {
            continue;
        }
        let pos = board.box_cell_pos(cell);
        if axis_movable(board, &frozen, pos, Direction::Left, Direction::Right)
            || axis_movable(board, &frozen, pos, Direction::Up, Direction::Down)
        {
            frozen.remove(cell);

            // Wake up adjacent frozen boxes; losing a blocker may unfreeze
            // them as well.
            for dir in ALL_DIRECTIONS {
                if let Some(next) = board.move_position(pos, dir) {
                    if let Some(next_cell) = board.box_cell_index(next) {
                        if frozen.contains(next_cell) {
                            to_check.push(next_cell);
                        }
                    }
                }
            }
        }
    }

    frozen
}

fn axis_movable(
    board: &Board,
    frozen: &BoxConfiguration,
    pos: Position,
    side_a: Direction,
    side_b: Direction,
) -> bool {
    side_open(board, frozen, pos, side_a)
        && side_open(board, frozen, pos, side_b)
        && !(side_dead(board, pos, side_a) && side_dead(board, pos, side_b))
}

fn side_open(board: &Board, frozen: &BoxConfiguration, pos: Position, dir: Direction) -> bool {
    match board.move_position(pos, dir) {
        Some(next) => {
            if board.is_wall(next) {
                return false;
            }
            match board.box_cell_index(next) {
                Some(cell) => !frozen.contains(cell),
                // A box outside the box numbering cannot exist there, so
                // the square only counts as open floor.
                None => true,
            }
        }
        None => false,
    }
}

fn side_dead(board: &Board, pos: Position, dir: Direction) -> bool {
    match board.move_position(pos, dir) {
        Some(next) => board.is_simple_deadlock(next),
        None => true,
    }
}

/// True iff `conf` contains a frozen box resting off goal, which makes the
/// position unsolvable no matter where the player stands.
pub fn has_freeze_deadlock(board: &Board, conf: &BoxConfiguration) -> bool {
    !frozen_boxes(board, conf).is_subset_of(board.goal_conf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Board {
        Board::from_text(text.trim_matches('\n')).unwrap()
    }

    #[test]
    fn test_simple_deadlocks_corners() {
        let board = parse(
            r#"
#####
#@  #
#  .#
#####
"#,
        );
        // All three non-goal corners are dead; the goal corner is not.
        assert!(board.is_simple_deadlock(Position(1, 1)));
        assert!(board.is_simple_deadlock(Position(3, 1)));
        assert!(board.is_simple_deadlock(Position(1, 2)));
        assert!(!board.is_simple_deadlock(Position(3, 2)));
    }

    #[test]
    fn test_simple_deadlocks_wall_run() {
        let board = parse(
            r#"
#######
#@    #
#     #
#....##
#######
"#,
        );
        // The top wall run can never be left: pushing down is impossible
        // from row 0 of the interior.
        for x in 1..=5 {
            assert!(board.is_simple_deadlock(Position(x, 1)), "({}, 1)", x);
        }
        // The goal row and the middle row are live.
        for x in 1..=4 {
            assert!(!board.is_simple_deadlock(Position(x, 3)), "({}, 3)", x);
            assert!(!board.is_simple_deadlock(Position(x, 2)), "({}, 2)", x);
        }
    }

    #[test]
    fn test_freeze_two_boxes_in_corner() {
        let board = parse(
            r#"
#####
#$  #
#$ .#
#  .#
#####
"#,
        );
        let conf = board.start_conf();
        let frozen = frozen_boxes(&board, &conf);
        assert_eq!(frozen.len(), 2);
        assert!(has_freeze_deadlock(&board, &conf));
    }

    #[test]
    fn test_frozen_on_goals_is_not_a_deadlock() {
        let board = parse(
            r#"
#####
#*  #
#* @#
#   #
#####
"#,
        );
        let conf = board.start_conf();
        let frozen = frozen_boxes(&board, &conf);
        assert_eq!(frozen.len(), 2);
        assert!(!has_freeze_deadlock(&board, &conf));
    }

    #[test]
    fn test_movable_box_is_not_frozen() {
        let board = parse(
            r#"
######
#    #
# $. #
# @  #
######
"#,
        );
        let conf = board.start_conf();
        assert!(frozen_boxes(&board, &conf).is_empty());
        assert!(!has_freeze_deadlock(&board, &conf));
    }

    #[test]
    fn test_unfreezing_cascade() {
        // Two boxes side by side block each other only while both are
        // assumed frozen; relaxation must free both.
        let board = parse(
            r#"
#######
#     #
# $$..#
# @   #
#     #
#######
"#,
        );
        let conf = board.start_conf();
        assert!(frozen_boxes(&board, &conf).is_empty());
    }

    #[test]
    fn test_mutual_freeze_between_dead_rows() {
        // Same pair of boxes, but the rows above and below are simple
        // deadlocks, so neither box can ever move on either axis.
        let board = parse(
            r#"
#######
#     #
# $$..#
# @   #
#######
"#,
        );
        let conf = board.start_conf();
        assert_eq!(frozen_boxes(&board, &conf).len(), 2);
        assert!(has_freeze_deadlock(&board, &conf));
    }
}
