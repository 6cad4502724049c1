use std::fmt;
use std::time::Duration;

use fxhash::FxHashMap;
use log::debug;

use crate::board::{Board, Direction, NO_CELL, Position, PushMove};
use crate::boxconf::BoxConfiguration;
use crate::context::SearchContext;
use crate::corral;
use crate::deadlock_db::{DeadlockDb, DeadlockDbOptions};
use crate::error::Error;
use crate::goal_room::GoalRoom;
use crate::lower_bound::PushesLowerBound;
use crate::lurd::{self, Step};
use crate::pqueue::BucketQueue;
use crate::reach::{self, PlayerReach};
use crate::tunnel;
use crate::verifier::{self, SolutionMetrics};
use crate::zobrist::Zobrist;

/// Nodes between full configuration snapshots in the search store; deltas
/// in between are replayed on demand.
const SNAPSHOT_INTERVAL: u8 = 32;
const NO_NODE: u32 = u32::MAX;
/// Rough per-node footprint (node + table entry + queue slot) charged
/// against the memory budget.
const NODE_BYTES: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    AStar,
    IdaStar,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::AStar => write!(f, "A*"),
            Method::IdaStar => write!(f, "IDA*"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub method: Method,
    pub timeout: Option<Duration>,
    pub max_mem_mib: usize,
    pub goal_room: bool,
    pub tunnel: bool,
    pub corral: bool,
    /// Deadlock identification to run before the search; None keeps only
    /// the simple-deadlock and freeze pruning.
    pub deadlocks: Option<DeadlockDbOptions>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            method: Method::AStar,
            timeout: None,
            max_mem_mib: crate::context::DEFAULT_MAX_MEM_MIB,
            goal_room: true,
            tunnel: true,
            corral: true,
            deadlocks: Some(DeadlockDbOptions::default()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub created: u64,
    pub expanded: u64,
    pub duplicates: u64,
    pub pruned_deadlock: u64,
    pub pruned_bound: u64,
    pub reopened: u64,
    pub fast_forwards: u64,
    pub iterations: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created {} expanded {} duplicates {} deadlock-pruned {} bound-pruned {} reopened {} fast-forwards {} iterations {}",
            self.created,
            self.expanded,
            self.duplicates,
            self.pruned_deadlock,
            self.pruned_bound,
            self.reopened,
            self.fast_forwards,
            self.iterations
        )
    }
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub lurd: String,
    pub metrics: SolutionMetrics,
    pub stats: Stats,
}

/// Solve a board push-optimally. Identifies deadlocks first when the
/// options ask for it, then runs the configured search.
pub fn solve(board: &Board, opts: &SolverOptions, ctx: &SearchContext) -> Result<Solution, Error> {
    let db = match &opts.deadlocks {
        Some(db_opts) => DeadlockDb::identify(board, db_opts, ctx),
        None => DeadlockDb::empty(board),
    };
    solve_with_db(board, &db, opts, ctx)
}

/// Solve with an already identified deadlock database (for callers that
/// cache it across runs of the same geometry).
pub fn solve_with_db(
    board: &Board,
    db: &DeadlockDb,
    opts: &SolverOptions,
    ctx: &SearchContext,
) -> Result<Solution, Error> {
    let mut search = Search::new(board, db, opts, ctx);
    let goal_node = search.run()?;
    search.emit(goal_node)
}

enum NodeKind {
    /// Full configuration after this node's push.
    Snapshot(BoxConfiguration),
    /// Only the entering push; the configuration is rebuilt by walking to
    /// the nearest snapshot.
    Delta,
}

struct Node {
    kind: NodeKind,
    parent: u32,
    /// Box cells moved by the entering push; NO_CELL on the root.
    from: u16,
    to: u16,
    direction: Direction,
    /// Player position after the push (the box's former square).
    player: Position,
    pushes: u16,
    /// Cached moves along this path, for reporting; the search minimizes
    /// pushes only.
    moves: u32,
    /// Deltas since the last snapshot on the parent chain.
    depth: u8,
    /// The entering push left the box in a tunnel; only it is relevant.
    in_tunnel: bool,
}

struct TableEntry {
    pushes: u16,
    node: u32,
    /// Deepening iteration this state was last entered in.
    iteration: u16,
    closed: bool,
}

struct Search<'a> {
    board: &'a Board,
    db: &'a DeadlockDb,
    opts: &'a SolverOptions,
    ctx: SearchContext,
    lower_bound: PushesLowerBound,
    zobrist: Zobrist,
    goal_room: Option<GoalRoom>,
    nodes: Vec<Node>,
    table: FxHashMap<u64, TableEntry>,
    queue: BucketQueue<u32>,
    reach: PlayerReach,
    stats: Stats,
    initial_bound: u32,
    iteration: u16,
    bound: Option<u32>,
    cutoff_seen: bool,
}

impl<'a> Search<'a> {
    fn new(
        board: &'a Board,
        db: &'a DeadlockDb,
        opts: &'a SolverOptions,
        ctx: &SearchContext,
    ) -> Self {
        let ctx = ctx.with_limits(opts.timeout, opts.max_mem_mib);
        let goal_room = if opts.goal_room {
            GoalRoom::detect(board)
        } else {
            None
        };
        Search {
            board,
            db,
            opts,
            ctx,
            lower_bound: PushesLowerBound::new(board),
            zobrist: Zobrist::new(board),
            goal_room,
            nodes: Vec::new(),
            table: FxHashMap::default(),
            queue: BucketQueue::new(),
            reach: PlayerReach::new(),
            stats: Stats::default(),
            initial_bound: 0,
            iteration: 0,
            bound: None,
            cutoff_seen: false,
        }
    }

    fn run(&mut self) -> Result<u32, Error> {
        let start_conf = self.board.start_conf();
        let start_cost = self.lower_bound.compute(self.board, &start_conf);
        if start_cost.is_infinite() {
            return Err(Error::Unsolvable);
        }
        self.initial_bound = start_cost.0;

        let root = self.add_node(Node {
            kind: NodeKind::Snapshot(start_conf),
            parent: NO_NODE,
            from: NO_CELL,
            to: NO_CELL,
            direction: Direction::Up,
            player: self.board.player_start(),
            pushes: 0,
            moves: 0,
            depth: 0,
            in_tunnel: false,
        })?;

        match self.opts.method {
            Method::AStar => {
                self.stats.iterations = 1;
                self.queue.push(self.initial_bound as usize, root);
                match self.run_pass()? {
                    Some(goal) => Ok(goal),
                    None => Err(Error::Unsolvable),
                }
            }
            Method::IdaStar => loop {
                self.bound = Some(self.initial_bound + 2 * self.iteration as u32);
                self.cutoff_seen = false;
                self.stats.iterations += 1;

                if self.iteration == 0 {
                    self.queue.push(self.initial_bound as usize, root);
                } else {
                    self.reactivate();
                }

                if let Some(goal) = self.run_pass()? {
                    return Ok(goal);
                }
                if !self.cutoff_seen {
                    return Err(Error::Unsolvable);
                }
                self.iteration += 1;
            },
        }
    }

    /// Re-seed the queue from every state remembered in the table. Old
    /// states enter at `bound - pushes + 2`, behind fresh nodes of equal
    /// estimate, so deepening resumes where the last iteration gave up.
    fn reactivate(&mut self) {
        let bound = self.bound.unwrap();
        self.queue.clear();
        let mut seen = Vec::new();
        for entry in self.table.values_mut() {
            entry.closed = false;
            if entry.node != NO_NODE {
                seen.push((entry.node, entry.pushes));
            }
        }
        seen.sort_unstable();
        seen.dedup();
        for (node, pushes) in seen {
            let priority = bound.saturating_sub(pushes as u32) + 2;
            self.queue.push(priority as usize, node);
        }
    }

    fn run_pass(&mut self) -> Result<Option<u32>, Error> {
        let goal_conf = self.board.goal_conf().clone();
        let mut pops: u32 = 0;

        while let Some((_, node_id)) = self.queue.pop_min() {
            pops += 1;
            if pops % 4 == 1 {
                self.ctx.check()?;
            }

            let conf = self.conf_of(node_id);
            let node = &self.nodes[node_id as usize];
            let (player, node_pushes) = (node.player, node.pushes);
            self.reach.compute(self.board, &conf, player);
            let canonical = self
                .board
                .player_cell_index(self.reach.canonical())
                .unwrap();
            let hash = self.zobrist.state_hash(&conf, canonical);

            if !self.open_state(hash, node_id, node_pushes) {
                self.stats.duplicates += 1;
                continue;
            }
            self.stats.expanded += 1;

            if conf.is_subset_of(&goal_conf) {
                return Ok(Some(node_id));
            }

            // Goal-room fast path: feed the waiting box along the
            // precomputed sequence instead of branching.
            if let Some(room) = self.goal_room.take() {
                let mut fed = false;
                let mut attempted = false;
                if let Some(seq) = room.fast_forward(self.board, &conf, &self.reach) {
                    let seq = seq.to_vec();
                    attempted = true;
                    fed = self.fast_forward(node_id, &conf, room.entrance(), &seq)?;
                }
                self.goal_room = Some(room);
                if fed {
                    self.stats.fast_forwards += 1;
                    continue;
                }
                if attempted {
                    // An aborted feed left the reach scratch on another
                    // configuration.
                    self.reach.compute(self.board, &conf, player);
                }
            }

            let mut pushes = self.board.compute_pushes(&conf, self.reach.cells());

            let node = &self.nodes[node_id as usize];
            if self.opts.tunnel && node.in_tunnel {
                // Committed to the tunnel box; everything else waits.
                let tunnel_pos = self.board.box_cell_pos(node.to);
                pushes.retain(|p| p.box_pos == tunnel_pos);
            } else {
                if self.opts.corral {
                    if let Some(restricted) =
                        corral::find_i_corral(self.board, &conf, &self.reach, &pushes)
                    {
                        pushes = restricted;
                    }
                }
                // Keep the previously pushed box's moves last so the LIFO
                // bucket order tries them first.
                if node.to != NO_CELL {
                    let last_pos = self.board.box_cell_pos(node.to);
                    pushes.sort_by_key(|p| p.box_pos == last_pos);
                }
            }

            for push in pushes {
                self.expand_push(node_id, &conf, push)?;
            }
        }

        Ok(None)
    }

    /// Mark a state closed for this iteration. Returns false when the
    /// state was already closed at least as cheaply.
    fn open_state(&mut self, hash: u64, node_id: u32, pushes: u16) -> bool {
        match self.table.entry(hash) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let entry = e.get_mut();
                if entry.closed && entry.iteration == self.iteration && entry.pushes <= pushes {
                    return false;
                }
                if entry.iteration < self.iteration {
                    self.stats.reopened += 1;
                }
                entry.closed = true;
                entry.iteration = self.iteration;
                if pushes < entry.pushes {
                    entry.pushes = pushes;
                    entry.node = node_id;
                }
                true
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(TableEntry {
                    pushes,
                    node: node_id,
                    iteration: self.iteration,
                    closed: true,
                });
                true
            }
        }
    }

    fn expand_push(
        &mut self,
        parent_id: u32,
        conf: &BoxConfiguration,
        push: PushMove,
    ) -> Result<(), Error> {
        let board = self.board;
        let from = board.box_cell_index(push.box_pos).unwrap();
        let dest = board.move_position(push.box_pos, push.direction).unwrap();
        let to = board.box_cell_index(dest).unwrap();

        let mut new_conf = conf.clone();
        new_conf.move_box(from, to);

        if self.db.is_deadlock(&new_conf, to) {
            self.stats.pruned_deadlock += 1;
            return Ok(());
        }
        let cost = self.lower_bound.compute(board, &new_conf);
        if cost.is_infinite() {
            self.stats.pruned_deadlock += 1;
            return Ok(());
        }

        let child_pushes = self.nodes[parent_id as usize].pushes + 1;
        let estimate = child_pushes as u32 + cost.0;
        if let Some(bound) = self.bound {
            if estimate > bound {
                self.cutoff_seen = true;
                self.stats.pruned_bound += 1;
                return Ok(());
            }
        }

        // Cheap duplicate test against the exact (pre-canonical) player
        // square; the canonical test happens when the node is expanded.
        let player_cell = board.player_cell_index(push.box_pos).unwrap();
        let child_hash = self.zobrist.boxes_hash(&new_conf) ^ self.zobrist.player_key(player_cell);
        if let Some(entry) = self.table.get(&child_hash) {
            if entry.pushes <= child_pushes && entry.iteration == self.iteration {
                self.stats.duplicates += 1;
                return Ok(());
            }
        }

        let player_side = board
            .move_position(push.box_pos, push.direction.reverse())
            .unwrap();
        let walk = self.reach.moves_to(player_side).unwrap() as u32;
        let child_moves = self.nodes[parent_id as usize].moves + walk + 1;

        let in_tunnel = self.opts.tunnel
            && tunnel::is_in_tunnel(board, &new_conf, self.reach.cells(), dest, push.direction);

        let parent_depth = self.nodes[parent_id as usize].depth;
        let kind = if parent_depth + 1 >= SNAPSHOT_INTERVAL {
            NodeKind::Snapshot(new_conf.clone())
        } else {
            NodeKind::Delta
        };
        let depth = match kind {
            NodeKind::Snapshot(_) => 0,
            NodeKind::Delta => parent_depth + 1,
        };

        let child_id = self.add_node(Node {
            kind,
            parent: parent_id,
            from,
            to,
            direction: push.direction,
            player: push.box_pos,
            pushes: child_pushes,
            moves: child_moves,
            depth,
            in_tunnel,
        })?;

        let iteration = self.iteration;
        self.table
            .entry(child_hash)
            .and_modify(|e| {
                if child_pushes < e.pushes || e.iteration < iteration {
                    e.pushes = child_pushes;
                    e.node = child_id;
                    e.iteration = iteration;
                    e.closed = false;
                }
            })
            .or_insert(TableEntry {
                pushes: child_pushes,
                node: child_id,
                iteration,
                closed: false,
            });

        self.queue.push(estimate as usize, child_id);
        Ok(())
    }

    /// Apply a goal-room feed sequence as a chain of forced pushes. Every
    /// intermediate state is entered into the table, so a later ordinary
    /// path to the same state is recognized as a duplicate. Returns false
    /// when the deepening bound cuts the sequence off or the plan no
    /// longer matches the position.
    fn fast_forward(
        &mut self,
        node_id: u32,
        conf: &BoxConfiguration,
        entrance: Position,
        seq: &[Direction],
    ) -> Result<bool, Error> {
        let board = self.board;

        // Cost the finished feed first; an over-bound feed is a cutoff.
        if let Some(bound) = self.bound {
            let mut final_conf = conf.clone();
            let mut pos = entrance;
            for &dir in seq {
                let next = board.move_position(pos, dir).unwrap();
                final_conf.move_box(
                    board.box_cell_index(pos).unwrap(),
                    board.box_cell_index(next).unwrap(),
                );
                pos = next;
            }
            let cost = self.lower_bound.compute(board, &final_conf);
            let final_pushes = self.nodes[node_id as usize].pushes as u32 + seq.len() as u32;
            if cost.is_infinite() || final_pushes + cost.0 > bound {
                self.cutoff_seen = true;
                self.stats.pruned_bound += 1;
                return Ok(false);
            }
        }

        let mut cur_id = node_id;
        let mut cur_conf = conf.clone();
        let mut box_pos = entrance;

        for &dir in seq {
            let player = self.nodes[cur_id as usize].player;
            self.reach.compute(board, &cur_conf, player);
            if !board.is_pushable(&cur_conf, self.reach.cells(), box_pos, dir) {
                return Ok(false);
            }

            let from = board.box_cell_index(box_pos).unwrap();
            let dest = board.move_position(box_pos, dir).unwrap();
            let to = board.box_cell_index(dest).unwrap();
            let player_side = board.move_position(box_pos, dir.reverse()).unwrap();
            let walk = self.reach.moves_to(player_side).unwrap() as u32;

            let parent = &self.nodes[cur_id as usize];
            let child_pushes = parent.pushes + 1;
            let child_moves = parent.moves + walk + 1;
            let parent_depth = parent.depth;

            cur_conf.move_box(from, to);
            let kind = if parent_depth + 1 >= SNAPSHOT_INTERVAL {
                NodeKind::Snapshot(cur_conf.clone())
            } else {
                NodeKind::Delta
            };
            let depth = match kind {
                NodeKind::Snapshot(_) => 0,
                NodeKind::Delta => parent_depth + 1,
            };

            let child_id = self.add_node(Node {
                kind,
                parent: cur_id,
                from,
                to,
                direction: dir,
                player: box_pos,
                pushes: child_pushes,
                moves: child_moves,
                depth,
                in_tunnel: false,
            })?;

            // Store the intermediate state under its exact player square.
            let player_cell = board.player_cell_index(box_pos).unwrap();
            let hash = self.zobrist.boxes_hash(&cur_conf) ^ self.zobrist.player_key(player_cell);
            let iteration = self.iteration;
            self.table
                .entry(hash)
                .and_modify(|e| {
                    if child_pushes < e.pushes {
                        e.pushes = child_pushes;
                        e.node = child_id;
                        e.iteration = iteration;
                    }
                })
                .or_insert(TableEntry {
                    pushes: child_pushes,
                    node: child_id,
                    iteration,
                    closed: false,
                });

            cur_id = child_id;
            box_pos = dest;
        }

        let final_cost = self.lower_bound.compute(board, &cur_conf);
        if final_cost.is_infinite() {
            return Ok(false);
        }
        let estimate = self.nodes[cur_id as usize].pushes as u32 + final_cost.0;
        self.queue.push(estimate as usize, cur_id);
        Ok(true)
    }

    fn conf_of(&self, node_id: u32) -> BoxConfiguration {
        let mut deltas: Vec<(u16, u16)> = Vec::new();
        let mut cur = node_id;
        loop {
            let node = &self.nodes[cur as usize];
            match &node.kind {
                NodeKind::Snapshot(conf) => {
                    let mut conf = conf.clone();
                    for &(from, to) in deltas.iter().rev() {
                        conf.move_box(from, to);
                    }
                    return conf;
                }
                NodeKind::Delta => {
                    deltas.push((node.from, node.to));
                    cur = node.parent;
                }
            }
        }
    }

    fn add_node(&mut self, node: Node) -> Result<u32, Error> {
        let mut bytes = NODE_BYTES;
        if let NodeKind::Snapshot(conf) = &node.kind {
            bytes += conf.heap_bytes();
        }
        self.ctx.charge(bytes)?;
        let id = self.nodes.len() as u32;
        self.nodes.push(node);
        self.stats.created += 1;
        Ok(id)
    }

    /// Turn the goal node into a lurd string by walking the push chain and
    /// filling in the player walks between pushes.
    fn emit(mut self, goal_node: u32) -> Result<Solution, Error> {
        let mut chain: Vec<u32> = Vec::new();
        let mut cur = goal_node;
        while cur != NO_NODE {
            chain.push(cur);
            cur = self.nodes[cur as usize].parent;
        }
        chain.reverse();

        let mut steps: Vec<Step> = Vec::new();
        let mut conf = self.board.start_conf();
        let mut player = self.board.player_start();

        for &node_id in chain.iter().skip(1) {
            let node = &self.nodes[node_id as usize];
            let box_pos = self.board.box_cell_pos(node.from);
            let player_side = self
                .board
                .move_position(box_pos, node.direction.reverse())
                .unwrap();
            let walk = reach::walk_path(self.board, &conf, player, player_side)
                .expect("push chain must stay player-connected");
            for dir in walk {
                steps.push(Step::new(dir, false));
            }
            steps.push(Step::new(node.direction, true));
            conf.move_box(node.from, node.to);
            player = box_pos;
        }

        let lurd = lurd::format(&steps);
        debug!("solution found: {} ({})", lurd, self.stats);

        let verified = verifier::verify(self.board, &lurd)?;
        debug_assert_eq!(verified.lurd_normalized, lurd);

        Ok(Solution {
            lurd,
            metrics: verified.metrics,
            stats: std::mem::take(&mut self.stats),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn solve_quick(board: &Board, method: Method) -> Result<Solution, Error> {
        solve(board, &quick_opts(method), &SearchContext::unlimited())
    }

    #[test]
    fn test_single_push() {
        let board = parse("#####\n#@$.#\n#####");
        let solution = solve_quick(&board, Method::AStar).unwrap();
        assert_eq!(solution.lurd, "R");
        assert_eq!(solution.metrics.pushes, 1);
        assert_eq!(solution.metrics.moves, 1);
    }

    #[test]
    fn test_corridor_walk_and_push() {
        let board = parse("#######\n#@ $ .#\n#######");
        for method in [Method::AStar, Method::IdaStar] {
            let solution = solve_quick(&board, method).unwrap();
            assert_eq!(solution.lurd, "rRR", "{}", method);
            assert_eq!(solution.metrics.pushes, 2);
        }
    }

    #[test]
    fn test_already_solved() {
        let board = parse("####\n#@*#\n####");
        let solution = solve_quick(&board, Method::AStar).unwrap();
        assert_eq!(solution.lurd, "");
        assert_eq!(solution.metrics.pushes, 0);
    }

    #[test]
    fn test_freeze_start_is_unsolvable() {
        let board = parse(
            r#"
#####
#$  #
#$ .#
#  .#
#####
"#,
        );
        assert_eq!(
            solve_quick(&board, Method::AStar).unwrap_err(),
            Error::Unsolvable
        );
        assert_eq!(
            solve_quick(&board, Method::IdaStar).unwrap_err(),
            Error::Unsolvable
        );
    }

    #[test]
    fn test_exhaustion_proves_unsolvable() {
        // Finite lower bound, but both goals are fed from the same square
        // and the first delivered box blocks the second; the search must
        // exhaust the state space to prove it.
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
        assert_eq!(
            solve_quick(&board, Method::AStar).unwrap_err(),
            Error::Unsolvable
        );
        assert_eq!(
            solve_quick(&board, Method::IdaStar).unwrap_err(),
            Error::Unsolvable
        );
    }

    #[test]
    fn test_methods_agree_on_push_counts() {
        let boards = [
            "######\n#@$ .#\n# $ .#\n######",
            "#######\n#     #\n# $$@ #\n# ..  #\n#######",
            "########\n#@$  . #\n# $# . #\n#      #\n#      #\n########",
        ];
        for text in boards {
            let board = parse(text);
            let a = solve_quick(&board, Method::AStar).unwrap();
            let b = solve_quick(&board, Method::IdaStar).unwrap();
            assert_eq!(a.metrics.pushes, b.metrics.pushes, "{}", text);
            assert!(verifier::verify(&board, &a.lurd).is_ok());
            assert!(verifier::verify(&board, &b.lurd).is_ok());
        }
    }

    #[test]
    fn test_feature_toggles_preserve_push_counts() {
        let boards = [
            "######\n#@$ .#\n# $ .#\n######",
            "#########\n#@$    .#\n#########",
            "#######\n#     #\n# $$@ #\n# ..  #\n#######",
            "########\n#@$  . #\n# $# . #\n#      #\n#      #\n########",
        ];
        for text in boards {
            let board = parse(text);
            let reference = solve_quick(&board, Method::AStar).unwrap();
            for (tunnel, corral, goal_room) in [
                (false, false, false),
                (true, false, false),
                (false, true, false),
                (true, true, true),
            ] {
                let opts = SolverOptions {
                    method: Method::AStar,
                    tunnel,
                    corral,
                    goal_room,
                    deadlocks: None,
                    ..Default::default()
                };
                let solution = solve(&board, &opts, &SearchContext::unlimited()).unwrap();
                assert_eq!(
                    solution.metrics.pushes, reference.metrics.pushes,
                    "{} tunnel={} corral={} room={}",
                    text, tunnel, corral, goal_room
                );
            }
        }
    }

    #[test]
    fn test_tunnel_equivalence_on_random_boards() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        // Random small boards, including goal squares inside corridors,
        // must solve to the same push count with and without the tunnel
        // and corral rules.
        let mut rng = ChaCha8Rng::seed_from_u64(0xb0a7d);
        let mut checked = 0;

        while checked < 12 {
            let width = rng.gen_range(5..8);
            let height = rng.gen_range(4..7);
            let mut grid: Vec<Vec<char>> = (0..height)
                .map(|y| {
                    (0..width)
                        .map(|x| {
                            if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                                '#'
                            } else if rng.gen_bool(0.2) {
                                '#'
                            } else {
                                ' '
                            }
                        })
                        .collect()
                })
                .collect();

            let mut free: Vec<(usize, usize)> = (1..height - 1)
                .flat_map(|y| (1..width - 1).map(move |x| (x, y)))
                .filter(|&(x, y)| grid[y][x] == ' ')
                .collect();
            if free.len() < 5 {
                continue;
            }
            // Place player, two boxes and two goals on distinct squares.
            for ch in ['@', '$', '$', '.', '.'] {
                let idx = rng.gen_range(0..free.len());
                let (x, y) = free.swap_remove(idx);
                grid[y][x] = ch;
            }
            let text: String = grid
                .into_iter()
                .map(|row| row.into_iter().collect::<String>())
                .collect::<Vec<_>>()
                .join("\n");

            let Ok(board) = Board::from_text(&text) else {
                continue;
            };
            checked += 1;

            let mut results = Vec::new();
            for (tunnel, corral) in [(true, true), (false, false)] {
                let opts = SolverOptions {
                    method: Method::AStar,
                    tunnel,
                    corral,
                    goal_room: false,
                    deadlocks: None,
                    ..Default::default()
                };
                let pushes = match solve(&board, &opts, &SearchContext::unlimited()) {
                    Ok(solution) => Some(solution.metrics.pushes),
                    Err(Error::Unsolvable) => None,
                    Err(e) => panic!("unexpected error on\n{}\n{}", text, e),
                };
                results.push(pushes);
            }
            assert_eq!(results[0], results[1], "board:\n{}", text);
        }
    }

    #[test]
    fn test_tunnel_reduces_expansions() {
        // A corridor start next to an open room: committing to the tunnel
        // box avoids re-branching on the second box at every step.
        let board = parse(
            r#"
##########
#@$    . #
#  $ .   #
#        #
##########
"#,
        );
        let with = solve_quick(&board, Method::AStar).unwrap();
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
    fn test_goal_room_fast_path() {
        let board = parse(
            r#"
#########
# @     #
# $$    #
#       #
####### #
#######.#
#######.#
#########
"#,
        );
        let with = solve_quick(&board, Method::AStar).unwrap();
        let without = solve(
            &board,
            &SolverOptions {
                goal_room: false,
                ..quick_opts(Method::AStar)
            },
            &SearchContext::unlimited(),
        )
        .unwrap();
        assert_eq!(with.metrics.pushes, without.metrics.pushes);
        assert!(with.stats.fast_forwards > 0);
        assert!(verifier::verify(&board, &with.lurd).is_ok());
    }

    #[test]
    fn test_cancellation() {
        let board = parse(
            r#"
##########
#@$    . #
#  $ .   #
#        #
##########
"#,
        );
        let ctx = SearchContext::unlimited();
        ctx.cancel();
        assert_eq!(
            solve(&board, &quick_opts(Method::AStar), &ctx).unwrap_err(),
            Error::Cancelled
        );
    }

    #[test]
    fn test_timeout() {
        let board = parse(
            r#"
##########
#@$    . #
#  $ .   #
#        #
##########
"#,
        );
        let opts = SolverOptions {
            timeout: Some(Duration::from_millis(0)),
            ..quick_opts(Method::AStar)
        };
        let err = solve(&board, &opts, &SearchContext::unlimited()).unwrap_err();
        assert!(matches!(err, Error::Timeout | Error::Cancelled));
    }

    #[test]
    fn test_memory_budget_exhaustion() {
        let board = parse(
            r#"
###########
#@$      .#
# $ $ $  .#
#       ..#
###########
"#,
        );
        let opts = SolverOptions {
            max_mem_mib: 15,
            ..quick_opts(Method::AStar)
        };
        assert_eq!(
            solve(&board, &opts, &SearchContext::unlimited()).unwrap_err(),
            Error::ResourceExhausted
        );
    }
}
