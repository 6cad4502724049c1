use crate::board::Board;
use crate::error::Error;
use crate::lurd::{self, Step};

/// The five solution quality metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolutionMetrics {
    pub moves: u32,
    pub pushes: u32,
    /// Maximal runs of pushes of the same box in the same direction.
    pub box_lines: u32,
    /// Pushes where the pushed box differs from the previous push.
    pub box_changes: u32,
    /// Maximal push runs separated by at least one plain move.
    pub pushing_sessions: u32,
}

impl std::fmt::Display for SolutionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} moves, {} pushes, {} box lines, {} box changes, {} sessions",
            self.moves, self.pushes, self.box_lines, self.box_changes, self.pushing_sessions
        )
    }
}

/// A replayed and accepted solution.
#[derive(Debug, Clone)]
pub struct Verified {
    pub metrics: SolutionMetrics,
    /// Canonical form: pushes upper-case, moves lower-case, anything after
    /// the first solved position dropped.
    pub lurd_normalized: String,
}

/// Replay a lurd string on the board's initial position. Rejects steps
/// into walls, pushes into blocked squares and inputs that never solve the
/// board; case in the input is ignored, the push flags are recomputed.
pub fn verify(board: &Board, lurd: &str) -> Result<Verified, Error> {
    let steps = lurd::parse(lurd)?;

    let mut conf = board.start_conf();
    let mut player = board.player_start();
    let goal_conf = board.goal_conf();

    let mut metrics = SolutionMetrics::default();
    let mut normalized: Vec<Step> = Vec::with_capacity(steps.len());

    let mut last_box: Option<u16> = None;
    let mut last_dir = None;
    let mut moved_since_push = false;

    if conf.is_subset_of(goal_conf) {
        return Ok(Verified {
            metrics,
            lurd_normalized: String::new(),
        });
    }

    for (idx, step) in steps.iter().enumerate() {
        let dir = step.direction;
        let Some(target) = board.move_position(player, dir) else {
            return Err(Error::invalid_solution(format!(
                "step {} walks off the board",
                idx + 1
            )));
        };
        if board.is_wall(target) {
            return Err(Error::invalid_solution(format!(
                "step {} walks into a wall",
                idx + 1
            )));
        }

        let box_at_target = board.box_cell_index(target).filter(|c| conf.contains(*c));
        if let Some(from_cell) = box_at_target {
            // A push: the square behind the box must be open.
            let Some(dest) = board.move_position(target, dir) else {
                return Err(Error::invalid_solution(format!(
                    "step {} pushes off the board",
                    idx + 1
                )));
            };
            if board.is_wall(dest) {
                return Err(Error::invalid_solution(format!(
                    "step {} pushes into a wall",
                    idx + 1
                )));
            }
            let Some(to_cell) = board.box_cell_index(dest) else {
                return Err(Error::invalid_solution(format!(
                    "step {} pushes into a blocked square",
                    idx + 1
                )));
            };
            if conf.contains(to_cell) {
                return Err(Error::invalid_solution(format!(
                    "step {} pushes into another box",
                    idx + 1
                )));
            }

            conf.move_box(from_cell, to_cell);
            metrics.moves += 1;
            metrics.pushes += 1;
            // The box identity survives the move under its new cell.
            let same_box = last_box == Some(from_cell);
            if !(same_box && last_dir == Some(dir)) {
                metrics.box_lines += 1;
            }
            if !same_box {
                metrics.box_changes += 1;
            }
            if metrics.pushes == 1 || moved_since_push {
                metrics.pushing_sessions += 1;
            }
            last_box = Some(to_cell);
            last_dir = Some(dir);
            moved_since_push = false;
            normalized.push(Step::new(dir, true));
        } else {
            metrics.moves += 1;
            moved_since_push = true;
            normalized.push(Step::new(dir, false));
        }
        player = target;

        if conf.is_subset_of(goal_conf) {
            // Trailing characters after the solve are dropped.
            return Ok(Verified {
                metrics,
                lurd_normalized: lurd::format(&normalized),
            });
        }
    }

    Err(Error::invalid_solution(
        "solution leaves boxes off their goals",
    ))
}
