use std::collections::VecDeque;

use crate::board::{ALL_DIRECTIONS, Board};
use crate::boxconf::BoxConfiguration;
use crate::deadlock;

/// Matrix entry standing in for an unreachable goal; any assignment that
/// has to use one costs at least this much.
const UNREACHABLE: i64 = 1_000_000;

/// Estimated pushes still needed, as returned by the lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cost(pub u32);

impl Cost {
    pub const INFINITE: Cost = Cost(u32::MAX);

    pub fn is_infinite(self) -> bool {
        self == Cost::INFINITE
    }
}

/// Admissible pushes lower bound: a minimum-cost matching of boxes to
/// goals over precomputed single-box push distances, plus a freeze check.
///
/// `goal_dists[g][c]` is the minimum number of pushes moving a lone box
/// from box cell `c` to goal `g`, ignoring every other box; u16::MAX marks
/// cells that can never reach the goal.
pub struct PushesLowerBound {
    goal_dists: Vec<Vec<u16>>,
}

impl PushesLowerBound {
    pub fn new(board: &Board) -> Self {
        let goal_dists = board
            .goals()
            .iter()
            .map(|&goal| {
                let mut dists = vec![u16::MAX; board.num_box_cells()];
                // Pull the box backward from the goal; a pull needs the
                // square behind the box free for the player.
                let goal_cell = board.box_cell_index(goal).unwrap();
                dists[goal_cell as usize] = 0;
                let mut queue = VecDeque::new();
                queue.push_back(goal);
                while let Some(box_pos) = queue.pop_front() {
                    let dist = dists[board.box_cell_index(box_pos).unwrap() as usize];
                    for dir in ALL_DIRECTIONS {
                        let Some(next) = board.move_position(box_pos, dir) else {
                            continue;
                        };
                        let Some(player_pos) = board.move_position(next, dir) else {
                            continue;
                        };
                        if board.is_wall(next) || board.is_wall(player_pos) {
                            continue;
                        }
                        let Some(next_cell) = board.box_cell_index(next) else {
                            continue;
                        };
                        if dists[next_cell as usize] == u16::MAX {
                            dists[next_cell as usize] = dist + 1;
                            queue.push_back(next);
                        }
                    }
                }
                dists
            })
            .collect();

        PushesLowerBound { goal_dists }
    }

    /// Single-box push distance from `box_cell` to goal number `goal_idx`.
    pub fn box_distance(&self, goal_idx: usize, box_cell: u16) -> u16 {
        self.goal_dists[goal_idx][box_cell as usize]
    }

    /// The lower bound for a configuration. Infinite when some box can
    /// reach no goal at all or the configuration contains a freeze
    /// deadlock.
    pub fn compute(&self, board: &Board, conf: &BoxConfiguration) -> Cost {
        let cells: Vec<u16> = conf.iter().collect();
        let n = cells.len();
        debug_assert_eq!(n, self.goal_dists.len());

        // A box with no finite distance can never be solved; don't bother
        // with the matching.
        for &cell in &cells {
            if (0..n).all(|g| self.goal_dists[g][cell as usize] == u16::MAX) {
                return Cost::INFINITE;
            }
        }

        if deadlock::has_freeze_deadlock(board, conf) {
            return Cost::INFINITE;
        }

        let matrix: Vec<Vec<i64>> = cells
            .iter()
            .map(|&cell| {
                (0..n)
                    .map(|g| {
                        let d = self.goal_dists[g][cell as usize];
                        if d == u16::MAX { UNREACHABLE } else { d as i64 }
                    })
                    .collect()
            })
            .collect();

        let total = assignment_cost(&matrix);
        if total >= UNREACHABLE {
            Cost::INFINITE
        } else {
            Cost(total as u32)
        }
    }
}

// Reference: Andrey Lopatin (https://cp-algorithms.com/graph/hungarian-algorithm.html).
fn assignment_cost(matrix: &[Vec<i64>]) -> i64 {
    const INF: i64 = i64::MAX / 2;

    let n = matrix.len();
    if n == 0 {
        return 0;
    }

    // 1-indexed arrays with dummy 0 element
    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![INF; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1 = 0;

            for j in 1..=n {
                if !used[j] {
                    let cur = matrix[i0 - 1][j - 1] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;

            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;

            if j0 == 0 {
                break;
            }
        }
    }

    -v[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;

    fn parse(text: &str) -> Board {
        Board::from_text(text.trim_matches('\n')).unwrap()
    }

    #[test]
    fn test_assignment_cost() {
        let a = vec![vec![8, 4, 7], vec![5, 2, 3], vec![9, 4, 8]];
        assert_eq!(assignment_cost(&a), 15);
    }

    #[test]
    fn test_corridor_distance() {
        let board = parse(
            r#"
#######
#@ $ .#
#######
"#,
        );
        let lb = PushesLowerBound::new(&board);
        assert_eq!(lb.compute(&board, &board.start_conf()), Cost(2));
    }

    #[test]
    fn test_solved_position_is_zero() {
        let board = parse(
            r#"
#####
#@ *#
#####
"#,
        );
        let lb = PushesLowerBound::new(&board);
        assert_eq!(lb.compute(&board, &board.start_conf()), Cost(0));
    }

    #[test]
    fn test_matching_beats_greedy_per_box() {
        // Both boxes are nearest to the same goal; the matching must send
        // one of them to the far goal.
        let board = parse(
            r#"
########
#@$$. .#
########
"#,
        );
        let lb = PushesLowerBound::new(&board);
        // Boxes at x=2,3 and goals at x=4,6: the assignments cost 2+3 or
        // 4+1; either way the bound is 5, above the naive per-box sum 3.
        assert_eq!(lb.compute(&board, &board.start_conf()), Cost(5));
    }

    #[test]
    fn test_freeze_deadlock_is_infinite() {
        let board = parse(
            r#"
#####
#$  #
#$ .#
#  .#
#####
"#,
        );
        let lb = PushesLowerBound::new(&board);
        assert!(lb.compute(&board, &board.start_conf()).is_infinite());
    }

    #[test]
    fn test_box_with_no_goal_distance_is_infinite() {
        // The box starts in a dead corner; its distance to every goal is
        // infinite even though it is representable.
        let board = parse(
            r#"
######
#$  @#
# .$.#
######
"#,
        );
        let lb = PushesLowerBound::new(&board);
        assert!(lb.compute(&board, &board.start_conf()).is_infinite());
    }

    #[test]
    fn test_two_box_maze_bound() {
        // Distances here: one box 4 or 6 pushes to the goals, the other 5
        // or 7; both assignments total 11.
        let board = parse(
            r#"
  ####
###  ####
#     $ #
# #  #$ #
# . .#@ #
#########
"#,
        );
        let lb = PushesLowerBound::new(&board);
        assert_eq!(lb.compute(&board, &board.start_conf()), Cost(11));
    }

    #[test]
    fn test_distance_respects_simple_deadlocks() {
        let board = parse(
            r#"
#######
#@    #
# $   #
#    .#
#######
"#,
        );
        let lb = PushesLowerBound::new(&board);
        // The top and left wall runs are dead; the finite distances only
        // use live cells.
        let conf = board.start_conf();
        let cost = lb.compute(&board, &conf);
        assert!(!cost.is_infinite());
        // Box at (2, 2), goal at (5, 3): three pushes right, one down is
        // the shortest push path avoiding dead squares.
        assert_eq!(cost, Cost(4));
    }
}
