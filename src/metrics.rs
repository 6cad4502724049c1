use std::ops::Add;

use crate::verifier::SolutionMetrics;

/// The ordering a solution is optimized under. The first named metric is
/// the primary criterion, the second breaks ties; the `AllMetrics`
/// variants keep ranking by the remaining metrics after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    MovesPushes,
    PushesMoves,
    BoxLinesPushes,
    BoxLinesMoves,
    BoxChangesPushes,
    BoxChangesMoves,
    AllMetricsMovesPushes,
    AllMetricsBoxLinesPushes,
}

impl Metric {
    /// Lexicographic comparison key for a complete solution.
    pub fn key(&self, m: &SolutionMetrics) -> [u32; 5] {
        let SolutionMetrics {
            moves,
            pushes,
            box_lines,
            box_changes,
            pushing_sessions,
        } = *m;
        match self {
            Metric::MovesPushes => [moves, pushes, 0, 0, 0],
            Metric::PushesMoves => [pushes, moves, 0, 0, 0],
            Metric::BoxLinesPushes => [box_lines, pushes, 0, 0, 0],
            Metric::BoxLinesMoves => [box_lines, moves, 0, 0, 0],
            Metric::BoxChangesPushes => [box_changes, pushes, 0, 0, 0],
            Metric::BoxChangesMoves => [box_changes, moves, 0, 0, 0],
            Metric::AllMetricsMovesPushes => {
                [moves, pushes, box_lines, box_changes, pushing_sessions]
            }
            Metric::AllMetricsBoxLinesPushes => {
                [box_lines, pushes, moves, box_changes, pushing_sessions]
            }
        }
    }

    /// Strictly better under this metric's lexicographic order.
    pub fn is_better(&self, a: &SolutionMetrics, b: &SolutionMetrics) -> bool {
        self.key(a) < self.key(b)
    }

    /// Cost of one push transition: the player walks `walk` squares and
    /// pushes once. Context decides which secondary counters tick.
    pub fn step_cost(&self, walk: u32, same_box: bool, same_dir: bool, first_push: bool) -> CostVector {
        let moves = walk + 1;
        let pushes = 1;
        let box_lines = u32::from(!(same_box && same_dir));
        let box_changes = u32::from(!same_box);
        let sessions = u32::from(first_push || walk > 0);
        let m = SolutionMetrics {
            moves,
            pushes,
            box_lines,
            box_changes,
            pushing_sessions: sessions,
        };
        CostVector(self.key(&m))
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Metric::MovesPushes => "moves/pushes",
            Metric::PushesMoves => "pushes/moves",
            Metric::BoxLinesPushes => "box lines/pushes",
            Metric::BoxLinesMoves => "box lines/moves",
            Metric::BoxChangesPushes => "box changes/pushes",
            Metric::BoxChangesMoves => "box changes/moves",
            Metric::AllMetricsMovesPushes => "all metrics (moves/pushes)",
            Metric::AllMetricsBoxLinesPushes => "all metrics (box lines/pushes)",
        };
        write!(f, "{}", name)
    }
}

/// Accumulated path cost under a metric, compared lexicographically.
/// Componentwise addition keeps the lexicographic order, which is what
/// makes the weighted shortest-path search sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CostVector(pub [u32; 5]);

impl CostVector {
    pub const ZERO: CostVector = CostVector([0; 5]);
}

impl Add for CostVector {
    type Output = CostVector;

    fn add(self, other: CostVector) -> CostVector {
        let mut out = [0u32; 5];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *o = a + b;
        }
        CostVector(out)
    }
}
