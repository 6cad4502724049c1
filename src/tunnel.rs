use crate::bits::CellSet;
use crate::board::{Board, Direction, Position};
use crate::boxconf::BoxConfiguration;

/// Decide whether the box just pushed to `box_pos` in `direction` sits in
/// a tunnel: a spot where continuing to push the same box costs nothing
/// compared to any other push, so the search may commit to it.
///
/// The squares beside the box (perpendicular to the push) must be walls or
/// squares the player could not reach before the push, and pushing onward
/// must remain possible. A box resting on a goal is only treated as in a
/// tunnel when more goals lie ahead in the tunnel; otherwise this might be
/// its final square and other pushes must stay open.
pub fn is_in_tunnel(
    board: &Board,
    conf: &BoxConfiguration,
    reach_before: &CellSet,
    box_pos: Position,
    direction: Direction,
) -> bool {
    // Committing only makes sense if the forward push stays available.
    let Some(ahead) = board.move_position(box_pos, direction) else {
        return false;
    };
    if board.is_wall(ahead)
        || board.is_simple_deadlock(ahead)
        || board.box_cell_index(ahead).is_some_and(|c| conf.contains(c))
    {
        return false;
    }

    let [side_a, side_b] = direction.orthogonal();
    if !side_sealed(board, reach_before, box_pos, side_a)
        || !side_sealed(board, reach_before, box_pos, side_b)
    {
        return false;
    }

    if board.is_goal(box_pos) {
        return goals_ahead_in_tunnel(board, box_pos, direction);
    }

    true
}

fn side_sealed(board: &Board, reach_before: &CellSet, pos: Position, dir: Direction) -> bool {
    match board.move_position(pos, dir) {
        Some(next) => board.is_wall(next) || !reach_before.get(next),
        None => true,
    }
}

/// Scan forward along the tunnel for unfilled goal squares the box could
/// still serve.
fn goals_ahead_in_tunnel(board: &Board, box_pos: Position, direction: Direction) -> bool {
    let [side_a, side_b] = direction.orthogonal();
    let mut pos = box_pos;
    loop {
        let Some(next) = board.move_position(pos, direction) else {
            return false;
        };
        if board.is_wall(next) {
            return false;
        }
        if board.is_goal(next) {
            return true;
        }
        // Only keep scanning while the corridor stays one square wide.
        let walled = |p: Position, d: Direction| {
            board.move_position(p, d).is_none_or(|n| board.is_wall(n))
        };
        if !walled(next, side_a) || !walled(next, side_b) {
            return false;
        }
        pos = next;
    }
}
