use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use fxhash::{FxHashMap, FxHashSet};
use log::{debug, info};

use crate::board::{ALL_DIRECTIONS, Board, Direction, Position};
use crate::boxconf::BoxConfiguration;
use crate::context::SearchContext;
use crate::deadlock_db::{DeadlockDb, DeadlockDbOptions};
use crate::error::Error;
use crate::lurd::{self, Step};
use crate::metrics::{CostVector, Metric};
use crate::reach::{self, PlayerReach};
use crate::verifier::{self, SolutionMetrics};
use crate::vicinity::{self, NearTable};

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub metric: Metric,
    /// Non-decreasing per-slot radii; the length bounds how many boxes may
    /// be relocated per reference configuration.
    pub radii: Vec<u16>,
    pub timeout: Option<Duration>,
    pub max_mem_mib: usize,
    pub iterate_to_fixpoint: bool,
    /// Capacity bound on the state universe.
    pub capacity: usize,
    pub threads: usize,
    /// Deadlock identification used to prune vicinity generation.
    pub deadlocks: Option<DeadlockDbOptions>,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            metric: Metric::MovesPushes,
            radii: vec![10, 20, 20],
            timeout: None,
            max_mem_mib: crate::context::DEFAULT_MAX_MEM_MIB,
            iterate_to_fixpoint: true,
            capacity: 1 << 20,
            threads: 0,
            deadlocks: Some(DeadlockDbOptions::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Optimized {
    pub lurd: String,
    pub metrics: SolutionMetrics,
    /// Improvement rounds run, including the final one that found nothing.
    pub iterations: u32,
}

/// Improve a solution under the configured metric by searching the graph
/// of configurations near it.
///
/// Each round replays the reference solution, generates the vicinity of
/// every configuration along it, and runs a shortest-path search over the
/// union with the metric as edge weight. The result replaces the
/// reference until a round stops improving. A universe overflow retries
/// once with halved radii before giving up.
pub fn optimize(
    board: &Board,
    lurd: &str,
    settings: &OptimizerSettings,
    ctx: &SearchContext,
) -> Result<Optimized, Error> {
    let verified = verifier::verify(board, lurd)?;
    let ctx = ctx.with_limits(settings.timeout, settings.max_mem_mib);

    let db = match &settings.deadlocks {
        Some(db_opts) => DeadlockDb::identify(board, db_opts, &ctx),
        None => DeadlockDb::empty(board),
    };
    let table = NearTable::new(board);

    let mut current = verified;
    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let improved = optimize_once(board, &table, &db, &current.lurd_normalized, settings, &ctx)?;

        let better = settings
            .metric
            .is_better(&improved.metrics, &current.metrics);
        if better {
            info!(
                "optimizer round {}: {} -> {}",
                iterations, current.metrics, improved.metrics
            );
            current = improved;
            if settings.iterate_to_fixpoint {
                continue;
            }
        }
        return Ok(Optimized {
            lurd: current.lurd_normalized,
            metrics: current.metrics,
            iterations,
        });
    }
}

/// One optimization round over the whole solution. Search state charged
/// against the memory budget is released again when the round ends.
fn optimize_once(
    board: &Board,
    table: &NearTable,
    db: &DeadlockDb,
    lurd: &str,
    settings: &OptimizerSettings,
    ctx: &SearchContext,
) -> Result<verifier::Verified, Error> {
    let mem_before = ctx.mem_used();
    let result = optimize_round(board, table, db, lurd, settings, ctx);
    ctx.release(ctx.mem_used().saturating_sub(mem_before));
    result
}

fn optimize_round(
    board: &Board,
    table: &NearTable,
    db: &DeadlockDb,
    lurd: &str,
    settings: &OptimizerSettings,
    ctx: &SearchContext,
) -> Result<verifier::Verified, Error> {
    let references = push_configurations(board, lurd)?;

    // Phase one: the state universe around the reference solution.
    let universe = match build_universe(table, db, &references, &settings.radii, settings, ctx) {
        Ok(u) => u,
        Err(Error::ResourceExhausted) => {
            // Shrink the vicinity and try once more before giving up.
            let halved: Vec<u16> = settings.radii.iter().map(|&v| (v / 2).max(1)).collect();
            debug!("universe overflowed, retrying with radii {:?}", halved);
            build_universe(table, db, &references, &halved, settings, ctx)?
        }
        Err(e) => return Err(e),
    };
    debug!(
        "optimizer universe: {} configurations from {} references",
        universe.len(),
        references.len()
    );

    // Phase two: shortest path over the universe under the metric.
    match shortest_path(board, &universe, settings.metric, ctx)? {
        Some(steps) => verifier::verify(board, &lurd::format(&steps)),
        // Goal unreachable inside the universe: keep the original.
        None => verifier::verify(board, lurd),
    }
}

/// The configuration sequence a solution passes through, one entry per
/// push, starting with the initial placement.
fn push_configurations(board: &Board, lurd: &str) -> Result<Vec<BoxConfiguration>, Error> {
    let steps = lurd::parse(lurd)?;
    let mut confs = vec![board.start_conf()];
    let mut conf = board.start_conf();
    let mut player = board.player_start();

    for step in steps {
        let target = board
            .move_position(player, step.direction)
            .ok_or_else(|| Error::invalid_solution("step walks off the board"))?;
        if let Some(from) = board.box_cell_index(target).filter(|c| conf.contains(*c)) {
            let dest = board
                .move_position(target, step.direction)
                .ok_or_else(|| Error::invalid_solution("push off the board"))?;
            let to = board
                .box_cell_index(dest)
                .ok_or_else(|| Error::invalid_solution("push into a blocked square"))?;
            conf.move_box(from, to);
            confs.push(conf.clone());
        }
        player = target;
    }
    Ok(confs)
}

fn build_universe(
    table: &NearTable,
    db: &DeadlockDb,
    references: &[BoxConfiguration],
    radii: &[u16],
    settings: &OptimizerSettings,
    ctx: &SearchContext,
) -> Result<FxHashSet<BoxConfiguration>, Error> {
    let mut universe: FxHashSet<BoxConfiguration> = FxHashSet::default();
    for conf in references {
        ctx.check()?;
        let vicinity = vicinity::generate(
            table,
            db,
            conf,
            radii,
            settings.capacity,
            settings.threads,
            ctx,
        )?;
        for entry in vicinity {
            if universe.len() >= settings.capacity {
                return Err(Error::ResourceExhausted);
            }
            if !universe.contains(&entry) {
                ctx.charge(entry.heap_bytes() + 48)?;
                universe.insert(entry);
            }
        }
    }
    Ok(universe)
}

/// A node of the optimization graph: the position right after a push.
/// The player square pins the walking costs and, together with the last
/// push direction, the box-line and session context.
#[derive(Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    conf: BoxConfiguration,
    player: Position,
    last_dir: Option<Direction>,
}

struct NodeData {
    key: NodeKey,
    parent: u32,
    entering: Option<(Position, Direction, u32)>,
}

const NO_PARENT: u32 = u32::MAX;

/// Weighted shortest path from the start position to any solved
/// configuration, expanding only pushes that stay inside the universe.
fn shortest_path(
    board: &Board,
    universe: &FxHashSet<BoxConfiguration>,
    metric: Metric,
    ctx: &SearchContext,
) -> Result<Option<Vec<Step>>, Error> {
    let goal_conf = board.goal_conf();
    let start_key = NodeKey {
        conf: board.start_conf(),
        player: board.player_start(),
        last_dir: None,
    };

    let mut nodes: Vec<NodeData> = vec![NodeData {
        key: start_key.clone(),
        parent: NO_PARENT,
        entering: None,
    }];
    let mut ids: FxHashMap<NodeKey, u32> = FxHashMap::default();
    ids.insert(start_key, 0);
    let mut dist: Vec<CostVector> = vec![CostVector::ZERO];
    let mut settled: Vec<bool> = vec![false];

    let mut heap: BinaryHeap<Reverse<(CostVector, u32)>> = BinaryHeap::new();
    heap.push(Reverse((CostVector::ZERO, 0)));

    let mut reach = PlayerReach::new();
    let mut pops = 0u32;

    while let Some(Reverse((cost, id))) = heap.pop() {
        pops += 1;
        if pops % 16 == 1 {
            ctx.check()?;
        }
        if settled[id as usize] || cost > dist[id as usize] {
            continue;
        }
        settled[id as usize] = true;

        let (conf, player, last_dir) = {
            let node = &nodes[id as usize];
            (
                node.key.conf.clone(),
                node.key.player,
                node.key.last_dir,
            )
        };

        if conf.is_subset_of(goal_conf) {
            return Ok(Some(emit_steps(board, &nodes, id)));
        }

        reach.compute(board, &conf, player);
        // The box last pushed sits one square past the player.
        let last_box = last_dir.map(|d| board.move_position(player, d).unwrap());

        for from_cell in conf.iter() {
            let box_pos = board.box_cell_pos(from_cell);
            for dir in ALL_DIRECTIONS {
                if !board.is_pushable(&conf, reach.cells(), box_pos, dir) {
                    continue;
                }
                let dest = board.move_position(box_pos, dir).unwrap();
                let to_cell = board.box_cell_index(dest).unwrap();

                let mut new_conf = conf.clone();
                new_conf.move_box(from_cell, to_cell);
                // The universe restriction is what keeps this tractable.
                if !universe.contains(&new_conf) {
                    continue;
                }

                let player_side = board.move_position(box_pos, dir.reverse()).unwrap();
                let walk = reach.moves_to(player_side).unwrap() as u32;
                let same_box = last_box == Some(box_pos);
                let same_dir = last_dir == Some(dir);
                let step = metric.step_cost(walk, same_box, same_dir, last_dir.is_none());
                let next_cost = cost + step;

                let key = NodeKey {
                    conf: new_conf,
                    player: box_pos,
                    last_dir: Some(dir),
                };
                match ids.get(&key) {
                    Some(&next_id) => {
                        if next_cost < dist[next_id as usize] {
                            dist[next_id as usize] = next_cost;
                            nodes[next_id as usize].parent = id;
                            nodes[next_id as usize].entering = Some((box_pos, dir, walk));
                            heap.push(Reverse((next_cost, next_id)));
                        }
                    }
                    None => {
                        let next_id = nodes.len() as u32;
                        ctx.charge(key.conf.heap_bytes() + 96)?;
                        ids.insert(key.clone(), next_id);
                        nodes.push(NodeData {
                            key,
                            parent: id,
                            entering: Some((box_pos, dir, walk)),
                        });
                        dist.push(next_cost);
                        settled.push(false);
                        heap.push(Reverse((next_cost, next_id)));
                    }
                }
            }
        }
    }

    Ok(None)
}

/// Rebuild the lurd steps for the winning path, walking the player
/// between consecutive pushes.
fn emit_steps(board: &Board, nodes: &[NodeData], goal: u32) -> Vec<Step> {
    let mut chain = Vec::new();
    let mut cur = goal;
    while cur != NO_PARENT {
        chain.push(cur);
        cur = nodes[cur as usize].parent;
    }
    chain.reverse();

    let mut steps = Vec::new();
    let mut conf = board.start_conf();
    let mut player = board.player_start();

    for &id in chain.iter().skip(1) {
        let (box_pos, dir, _) = nodes[id as usize].entering.unwrap();
        let player_side = board.move_position(box_pos, dir.reverse()).unwrap();
        let walk = reach::walk_path(board, &conf, player, player_side)
            .expect("optimized path must stay player-connected");
        for d in walk {
            steps.push(Step::new(d, false));
        }
        steps.push(Step::new(dir, true));
        let from = board.box_cell_index(box_pos).unwrap();
        let to = board
            .box_cell_index(board.move_position(box_pos, dir).unwrap())
            .unwrap();
        conf.move_box(from, to);
        player = box_pos;
    }
    steps
}
