use arrayvec::ArrayVec;

use crate::bits::CellSet;
use crate::board::{ALL_DIRECTIONS, Board, MAX_BOXES, MAX_SIZE, Position, PushMove};
use crate::boxconf::BoxConfiguration;
use crate::reach::PlayerReach;

/// Look for an I-corral: a region the player cannot reach, fenced off by
/// boxes, where every legal push of a fence box leads into the region and
/// starts from a player-reachable square.
///
/// When such a corral exists and still needs pushes to be solved, only its
/// fence pushes are relevant; pushes of unrelated boxes commute with them
/// and are postponed without losing optimality. Returns the restricted
/// push list (possibly empty, which deadlocks the node) or None when no
/// corral restricts this position. Among several corrals the one with the
/// fewest fence pushes wins.
pub fn find_i_corral(
    board: &Board,
    conf: &BoxConfiguration,
    reach: &PlayerReach,
    pushes: &[PushMove],
) -> Option<Vec<PushMove>> {
    let mut visited = CellSet::new();
    let mut result: Option<Vec<PushMove>> = None;

    for push in pushes {
        let Some(dest) = board.move_position(push.box_pos, push.direction) else {
            continue;
        };
        // Only regions on the far side of a legal push can force the "I"
        // condition; anything else the player can already reach.
        if reach.contains(dest) || visited.get(dest) || board.is_wall(dest) {
            continue;
        }
        if board.box_cell_index(dest).is_some_and(|c| conf.contains(c)) {
            continue;
        }
        if let Some(corral_pushes) = explore_corral(board, conf, reach, pushes, dest, &mut visited)
        {
            let better = match &result {
                Some(best) => corral_pushes.len() < best.len(),
                None => true,
            };
            if better {
                result = Some(corral_pushes);
            }
        }
    }

    result
}

fn explore_corral(
    board: &Board,
    conf: &BoxConfiguration,
    reach: &PlayerReach,
    all_pushes: &[PushMove],
    start: Position,
    visited: &mut CellSet,
) -> Option<Vec<PushMove>> {
    debug_assert!(!reach.contains(start));

    let mut local = CellSet::new();
    let mut fence: ArrayVec<Position, MAX_BOXES> = ArrayVec::new();
    let mut stack: ArrayVec<Position, { MAX_SIZE * MAX_SIZE }> = ArrayVec::new();
    stack.push(start);
    let mut must_be_pushed = false;

    local.set(start);
    visited.set(start);

    while let Some(pos) = stack.pop() {
        let is_goal = board.is_goal(pos);
        let has_box = board.box_cell_index(pos).is_some_and(|c| conf.contains(c));

        if has_box {
            // A box off goal inside the corral means the corral cannot be
            // left alone.
            if !is_goal {
                must_be_pushed = true;
            }
            // Fence boxes are the ones the player can already touch; the
            // corral ends at them.
            if is_fence_box(board, reach, pos) {
                if !fence.contains(&pos) {
                    fence.push(pos);
                }
                continue;
            }
        } else if is_goal {
            // An unfilled goal inside the corral also forces pushes.
            must_be_pushed = true;
        }

        for dir in ALL_DIRECTIONS {
            if let Some(next) = board.move_position(pos, dir) {
                if !board.is_wall(next) && !local.get(next) {
                    local.set(next);
                    visited.set(next);
                    stack.push(next);
                }
            }
        }
    }

    if !must_be_pushed {
        return None;
    }

    // Verify the I condition over every fence box: each of its legal
    // pushes must enter the corral from a player-reachable square.
    let mut restricted = Vec::new();
    for &box_pos in &fence {
        for dir in ALL_DIRECTIONS {
            let (Some(next), Some(player_pos)) = (
                board.move_position(box_pos, dir),
                board.move_position(box_pos, dir.reverse()),
            ) else {
                continue;
            };
            // Pushes originating inside the corral are not the player's.
            if local.get(player_pos) {
                continue;
            }
            if board.is_wall(next)
                || board.box_cell_index(next).is_some_and(|c| conf.contains(c))
            {
                continue;
            }
            if board.is_wall(player_pos) {
                continue;
            }
            if board.is_simple_deadlock(next) {
                continue;
            }
            // A fence push escaping the corral breaks the I condition.
            if !local.get(next) {
                return None;
            }
            // And one the player cannot make breaks the P condition.
            if !reach.contains(player_pos) {
                return None;
            }
            restricted.push(PushMove {
                box_pos,
                direction: dir,
            });
        }
    }

    // Everything in the restriction must be a currently legal push.
    debug_assert!(restricted.iter().all(|p| all_pushes.contains(p)));

    Some(restricted)
}

fn is_fence_box(board: &Board, reach: &PlayerReach, box_pos: Position) -> bool {
    ALL_DIRECTIONS.iter().any(|&dir| {
        board
            .move_position(box_pos, dir)
            .is_some_and(|next| reach.contains(next))
    })
}
