//! End-to-end scenarios exercising the public API: solver, optimizer,
//! deadlock identification and the metric machinery together.

use boulder::board::Position;
use boulder::boxconf::BoxConfiguration;
use boulder::deadlock_db::{DeadlockDb, DeadlockDbOptions};
use boulder::lower_bound::{Cost, PushesLowerBound};
use boulder::solver::{Method, SolverOptions};
use boulder::{Board, Metric, OptimizerSettings, SearchContext, optimize, solve, verify};

fn parse(text: &str) -> Board {
    Board::from_text(text.trim_matches('\n')).unwrap()
}

fn quick_opts(method: Method) -> SolverOptions {
    SolverOptions {
        method,
        deadlocks: None,
        ..Default::default()
    }
}

#[test]
fn scenario_push_optimal_solver() {
    // Two boxes, two goals on the left wall; the matching lower bound is 4
    // and a 4-push solution exists, so both searches must return exactly 4.
    let board = parse(
        r#"
#######
#. @  #
#.$$  #
#     #
#######
"#,
    );
    let lb = PushesLowerBound::new(&board);
    assert_eq!(lb.compute(&board, &board.start_conf()), Cost(4));

    for method in [Method::AStar, Method::IdaStar] {
        let solution = solve(&board, &quick_opts(method), &SearchContext::unlimited()).unwrap();
        assert_eq!(solution.metrics.pushes, 4, "{}", method);
        let checked = verify(&board, &solution.lurd).unwrap();
        assert_eq!(checked.metrics.pushes, 4);
        assert_eq!(checked.lurd_normalized, solution.lurd);
    }
}

#[test]
fn scenario_freeze_deadlock_unsolvable() {
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

    for method in [Method::AStar, Method::IdaStar] {
        let err = solve(&board, &quick_opts(method), &SearchContext::unlimited()).unwrap_err();
        assert_eq!(err, boulder::Error::Unsolvable, "{}", method);
    }
}

#[test]
fn scenario_tunnel_pruning_correctness() {
    // A corridor between player and goal: with tunnel detection on, the
    // solver commits to the corridor box and expands no more nodes than
    // the plain search, at the same push count.
    let board = parse(
        r#"
##########
#@$    . #
#  $ .   #
#        #
##########
"#,
    );
    let with = solve(&board, &quick_opts(Method::AStar), &SearchContext::unlimited()).unwrap();
    let without = solve(
        &board,
        &SolverOptions {
            tunnel: false,
            ..quick_opts(Method::AStar)
        },
        &SearchContext::unlimited(),
    )
    .unwrap();
    assert_eq!(with.metrics.pushes, without.metrics.pushes);
    assert!(with.stats.expanded <= without.stats.expanded);
}

#[test]
fn scenario_vicinity_optimizer_fixpoint() {
    // Three boxes with unbounded radii: the universe already contains the
    // optimum, so a second optimization pass cannot move anything.
    let board = parse(
        r#"
########
#      #
# $$$  #
# ...@ #
#      #
########
"#,
    );
    let reference = solve(&board, &quick_opts(Method::AStar), &SearchContext::unlimited()).unwrap();

    let settings = OptimizerSettings {
        metric: Metric::MovesPushes,
        radii: vec![u16::MAX, u16::MAX, u16::MAX],
        deadlocks: None,
        threads: 2,
        ..Default::default()
    };
    let ctx = SearchContext::unlimited();
    let once = optimize(&board, &reference.lurd, &settings, &ctx).unwrap();
    let twice = optimize(&board, &once.lurd, &settings, &ctx).unwrap();
    assert_eq!(once.lurd, twice.lurd);
    assert_eq!(once.metrics, twice.metrics);

    let checked = verify(&board, &once.lurd).unwrap();
    assert_eq!(checked.metrics, once.metrics);
}

#[test]
fn scenario_deadlock_identification_soundness() {
    // The vertical pair against the left wall freezes and must be
    // reported; placements on the goals themselves must not be.
    let board = parse(
        r#"
##########
#        #
#        #
#        #
#.       #
#.       #
#    @   #
#  $ $   #
#        #
##########
"#,
    );
    let opts = DeadlockDbOptions {
        max_box_count: 2,
        threads: 2,
        ..Default::default()
    };
    let db = DeadlockDb::identify(&board, &opts, &SearchContext::unlimited());
    assert!(db.complete_up_to() >= 2);

    let pair = |a: Position, b: Position| {
        let mut conf = BoxConfiguration::new(board.num_box_cells());
        conf.add(board.box_cell_index(a).unwrap());
        conf.add(board.box_cell_index(b).unwrap());
        conf
    };

    let frozen = pair(Position(1, 2), Position(1, 3));
    assert!(db.is_deadlock_anywhere(&frozen));

    let on_goals = pair(Position(1, 4), Position(1, 5));
    assert!(!db.is_deadlock_anywhere(&on_goals));

    // Soundness spot check: a level starting from the reported deadlock
    // really is unsolvable.
    let frozen_board = parse(
        r#"
##########
#        #
#$       #
#$       #
#.       #
#.   @   #
#        #
#        #
#        #
##########
"#,
    );
    let err = solve(
        &frozen_board,
        &quick_opts(Method::AStar),
        &SearchContext::unlimited(),
    )
    .unwrap_err();
    assert_eq!(err, boulder::Error::Unsolvable);
}

#[test]
fn scenario_metric_ordering() {
    // A push-heavy and a walk-heavy solution: fewer moves but more pushes
    // on one side, the opposite on the other.
    let push_heavy_board = parse("#########\n#@$    .#\n#########");
    let walk_heavy_board = parse("##########\n#@   $  .#\n##########");

    let push_heavy = verify(&push_heavy_board, "RRRRR").unwrap().metrics;
    let walk_heavy = verify(&walk_heavy_board, "rrrrRRR").unwrap().metrics;
    assert_eq!((push_heavy.moves, push_heavy.pushes), (5, 5));
    assert_eq!((walk_heavy.moves, walk_heavy.pushes), (7, 3));

    assert!(Metric::MovesPushes.is_better(&push_heavy, &walk_heavy));
    assert!(Metric::PushesMoves.is_better(&walk_heavy, &push_heavy));
}

#[test]
fn scenario_normalization_round_trip() {
    let board = parse(
        r#"
#######
#     #
#@$  .#
#     #
#######
"#,
    );
    // Wrong case in the input, plus trailing moves after the solve.
    let verified = verify(&board, "rrrUDud").unwrap();
    let again = verify(&board, &verified.lurd_normalized).unwrap();
    assert_eq!(verified.lurd_normalized, again.lurd_normalized);
    assert_eq!(verified.metrics, again.metrics);
}

#[test]
fn scenario_optimizer_improves_each_metric_or_keeps_input() {
    let board = parse(
        r#"
########
#      #
# $$   #
# ..@  #
#      #
########
"#,
    );
    let reference = solve(&board, &quick_opts(Method::AStar), &SearchContext::unlimited()).unwrap();

    for metric in [
        Metric::MovesPushes,
        Metric::PushesMoves,
        Metric::BoxLinesPushes,
        Metric::BoxLinesMoves,
        Metric::BoxChangesPushes,
        Metric::BoxChangesMoves,
        Metric::AllMetricsMovesPushes,
        Metric::AllMetricsBoxLinesPushes,
    ] {
        let settings = OptimizerSettings {
            metric,
            radii: vec![u16::MAX, u16::MAX],
            deadlocks: None,
            threads: 2,
            ..Default::default()
        };
        let optimized = optimize(&board, &reference.lurd, &settings, &SearchContext::unlimited())
            .unwrap();
        let checked = verify(&board, &optimized.lurd).unwrap();
        assert_eq!(checked.metrics, optimized.metrics);
        assert!(
            !metric.is_better(&reference.metrics, &optimized.metrics),
            "{} got worse under {}",
            optimized.lurd,
            metric
        );
    }
}
