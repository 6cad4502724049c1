use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use fxhash::FxHashSet;
use log::debug;

use crate::board::{ALL_DIRECTIONS, Board, Position};
use crate::boxconf::BoxConfiguration;
use crate::context::SearchContext;
use crate::reach::PlayerReach;

/// Limits for deadlock identification.
#[derive(Debug, Clone)]
pub struct DeadlockDbOptions {
    /// Largest deadlock cardinality to identify (k = 2..=max_box_count).
    pub max_box_count: usize,
    /// Capacity bound on the no-deadlock configuration set per k.
    pub capacity: usize,
    /// Cap on the number of stored deadlock configurations.
    pub max_deadlocks: usize,
    /// Hard wall-clock bound for the whole identification.
    pub time_limit: Duration,
    /// Worker thread count; 0 picks the available parallelism.
    pub threads: usize,
}

impl Default for DeadlockDbOptions {
    fn default() -> Self {
        DeadlockDbOptions {
            max_box_count: 3,
            capacity: 1 << 20,
            max_deadlocks: 1 << 16,
            time_limit: Duration::from_secs(3),
            threads: 0,
        }
    }
}

/// Box configurations that are deadlocked regardless of the player
/// position, indexed by every box cell they contain so that a query after
/// a push only scans configurations involving the pushed box.
///
/// Configurations are immutable once inserted; the generator and the
/// optimizer borrow them read-only.
pub struct DeadlockDb {
    buckets: Vec<Vec<BoxConfiguration>>,
    len: usize,
    /// Largest cardinality for which identification ran to completion.
    complete_up_to: usize,
}

impl DeadlockDb {
    /// A database with no multi-box entries; singleton deadlocks (boxes
    /// starting on simple-deadlock squares) are still recorded so that
    /// every simple-deadlock cell representable in the box numbering
    /// reports as deadlocked.
    pub fn empty(board: &Board) -> Self {
        let mut db = DeadlockDb {
            buckets: vec![Vec::new(); board.num_box_cells()],
            len: 0,
            complete_up_to: 1,
        };
        db.insert_singletons(board);
        db
    }

    /// Identify position-independent deadlocks of up to
    /// `opts.max_box_count` boxes within the time and capacity bounds.
    ///
    /// For each cardinality k, phase one pulls k boxes backward from every
    /// placement on goals to enumerate every solvable-from-somewhere
    /// configuration; phase two reports every k-subset of box cells absent
    /// from that set. Phase two only runs when phase one completed, since
    /// an aborted enumeration would misreport unexplored configurations as
    /// deadlocks. Identification keeps whatever it found when the clock or
    /// a capacity bound runs out.
    pub fn identify(board: &Board, opts: &DeadlockDbOptions, ctx: &SearchContext) -> Self {
        let mut db = Self::empty(board);
        let deadline = Instant::now() + opts.time_limit;
        let threads = if opts.threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            opts.threads
        };

        let max_k = opts.max_box_count.min(board.box_count());
        for k in 2..=max_k {
            let Some(no_deadlock) = generate_no_deadlock_set(board, k, opts, ctx, deadline, threads)
            else {
                debug!(
                    "deadlock identification stopped during generation for k={}, keeping {} deadlocks",
                    k,
                    db.len()
                );
                return db;
            };
            debug!(
                "deadlock identification k={}: {} pull-reachable configurations",
                k,
                no_deadlock.len()
            );

            let complete =
                enumerate_deadlocks(board, k, &no_deadlock, &mut db, opts, ctx, deadline, threads);
            if !complete {
                debug!(
                    "deadlock identification stopped during enumeration for k={}, keeping {} deadlocks",
                    k,
                    db.len()
                );
                return db;
            }
            db.complete_up_to = k;
        }
        debug!("deadlock identification finished: {} deadlocks", db.len());
        db
    }

    fn insert_singletons(&mut self, board: &Board) {
        for cell in 0..board.num_box_cells() as u16 {
            if board.is_simple_deadlock(board.box_cell_pos(cell)) {
                let mut conf = BoxConfiguration::new(board.num_box_cells());
                conf.add(cell);
                self.insert(conf);
            }
        }
    }

    fn insert(&mut self, conf: BoxConfiguration) {
        for cell in conf.iter() {
            self.buckets[cell as usize].push(conf.clone());
        }
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn complete_up_to(&self) -> usize {
        self.complete_up_to
    }

    /// Check whether `conf` is a superset of a known deadlock involving
    /// `involved_cell`. Callers pass the cell a box was just moved to, so
    /// only the configurations that could newly apply are scanned.
    pub fn is_deadlock(&self, conf: &BoxConfiguration, involved_cell: u16) -> bool {
        self.buckets[involved_cell as usize]
            .iter()
            .any(|deadlock| deadlock.is_subset_of(conf))
    }

    /// Check `conf` against the buckets of every cell it occupies.
    pub fn is_deadlock_anywhere(&self, conf: &BoxConfiguration) -> bool {
        conf.iter().any(|cell| self.is_deadlock(conf, cell))
    }
}

/// Phase one for cardinality k: every configuration reachable by pulls
/// from some all-on-goals placement, for at least one player position.
/// Returns None when the capacity bound, the deadline or a cancellation
/// cut the enumeration short.
fn generate_no_deadlock_set(
    board: &Board,
    k: usize,
    opts: &DeadlockDbOptions,
    ctx: &SearchContext,
    deadline: Instant,
    threads: usize,
) -> Option<FxHashSet<BoxConfiguration>> {
    let goal_cells: Vec<u16> = board.goal_conf().iter().collect();
    let placements = combinations(&goal_cells, k);
    if placements.is_empty() {
        return Some(FxHashSet::default());
    }

    // Workers take start placements from a shared counter and explore the
    // pull closure locally; the per-thread sets are merged at join time.
    let next_placement = AtomicUsize::new(0);
    let aborted = AtomicBool::new(false);
    let merged: Mutex<FxHashSet<BoxConfiguration>> = Mutex::new(FxHashSet::default());

    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let mut local: FxHashSet<BoxConfiguration> = FxHashSet::default();
                let mut reach = PlayerReach::new();

                loop {
                    let idx = next_placement.fetch_add(1, Ordering::Relaxed);
                    if idx >= placements.len() || aborted.load(Ordering::Relaxed) {
                        break;
                    }
                    if Instant::now() >= deadline || ctx.is_cancelled() {
                        aborted.store(true, Ordering::Relaxed);
                        break;
                    }
                    if !pull_closure(
                        board,
                        &placements[idx],
                        &mut local,
                        &mut reach,
                        opts.capacity,
                        deadline,
                        ctx,
                    ) {
                        aborted.store(true, Ordering::Relaxed);
                        break;
                    }
                }

                merged.lock().unwrap().extend(local);
            });
        }
    });

    if aborted.load(Ordering::Relaxed) {
        None
    } else {
        Some(merged.into_inner().unwrap())
    }
}

/// Explore every configuration pull-reachable from `placement`, recording
/// each visited configuration. Returns false on capacity or time abort.
fn pull_closure(
    board: &Board,
    placement: &[u16],
    no_deadlock: &mut FxHashSet<BoxConfiguration>,
    reach: &mut PlayerReach,
    capacity: usize,
    deadline: Instant,
    ctx: &SearchContext,
) -> bool {
    let mut start_conf = BoxConfiguration::new(board.num_box_cells());
    for &cell in placement {
        start_conf.add(cell);
    }

    let mut visited: FxHashSet<(BoxConfiguration, u16)> = FxHashSet::default();
    let mut stack: Vec<(BoxConfiguration, Position)> = Vec::new();

    // One start state per player reach zone of the complement.
    let mut seen_zones = crate::bits::CellSet::new();
    for idx in 0..board.num_player_cells() as u16 {
        let pos = board.player_cell_pos(idx);
        if seen_zones.get(pos) {
            continue;
        }
        if board
            .box_cell_index(pos)
            .is_some_and(|c| start_conf.contains(c))
        {
            continue;
        }
        reach.compute(board, &start_conf, pos);
        seen_zones.set_all(reach.cells());
        let canonical = board.player_cell_index(reach.canonical()).unwrap();
        if visited.insert((start_conf.clone(), canonical)) {
            stack.push((start_conf.clone(), reach.canonical()));
        }
    }
    no_deadlock.insert(start_conf);

    let mut steps = 0u32;
    while let Some((conf, player)) = stack.pop() {
        steps += 1;
        if steps % 256 == 0 && (Instant::now() >= deadline || ctx.is_cancelled()) {
            return false;
        }

        reach.compute(board, &conf, player);
        // Snapshot the zone; reach is recomputed per pull below.
        let zone = reach.cells().clone();

        for from_cell in conf.iter() {
            let box_pos = board.box_cell_pos(from_cell);
            for dir in ALL_DIRECTIONS {
                // Pulling moves the box one square toward the player, who
                // backs off one further square.
                let Some(box_dest) = board.move_position(box_pos, dir) else {
                    continue;
                };
                let Some(player_dest) = board.move_position(box_dest, dir) else {
                    continue;
                };
                let Some(to_cell) = board.box_cell_index(box_dest) else {
                    continue;
                };
                if conf.contains(to_cell) {
                    continue;
                }
                if board.is_wall(player_dest)
                    || board
                        .box_cell_index(player_dest)
                        .is_some_and(|c| conf.contains(c))
                {
                    continue;
                }
                if !zone.get(player_dest) {
                    continue;
                }

                let mut new_conf = conf.clone();
                new_conf.move_box(from_cell, to_cell);

                reach.compute(board, &new_conf, player_dest);
                let canonical = board.player_cell_index(reach.canonical()).unwrap();
                if visited.insert((new_conf.clone(), canonical)) {
                    if no_deadlock.len() >= capacity {
                        return false;
                    }
                    no_deadlock.insert(new_conf.clone());
                    stack.push((new_conf, player_dest));
                }
            }
        }
    }

    true
}

/// Phase two for cardinality k: every k-subset of box cells absent from
/// the no-deadlock set is a deadlock. Subsets already covered by a smaller
/// known deadlock are skipped, keeping the buckets minimal. Returns false
/// if the deadline or the deadlock cap stopped the sweep.
#[allow(clippy::too_many_arguments)]
fn enumerate_deadlocks(
    board: &Board,
    k: usize,
    no_deadlock: &FxHashSet<BoxConfiguration>,
    db: &mut DeadlockDb,
    opts: &DeadlockDbOptions,
    ctx: &SearchContext,
    deadline: Instant,
    threads: usize,
) -> bool {
    let num_cells = board.num_box_cells() as u16;

    // Workers take the first (lowest) cell of the subset from a shared
    // counter and enumerate the remaining cells in increasing order.
    let next_first = AtomicUsize::new(0);
    let aborted = AtomicBool::new(false);
    let found: Mutex<Vec<BoxConfiguration>> = Mutex::new(Vec::new());
    let db_view: &DeadlockDb = db;

    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let mut local: Vec<BoxConfiguration> = Vec::new();
                let mut subset = vec![0u16; k];

                loop {
                    let first = next_first.fetch_add(1, Ordering::Relaxed) as u16;
                    if first >= num_cells || aborted.load(Ordering::Relaxed) {
                        break;
                    }
                    if Instant::now() >= deadline || ctx.is_cancelled() {
                        aborted.store(true, Ordering::Relaxed);
                        break;
                    }
                    subset[0] = first;
                    collect_deadlock_subsets(
                        board,
                        &mut subset,
                        1,
                        no_deadlock,
                        db_view,
                        &mut local,
                    );
                }

                found.lock().unwrap().extend(local);
            });
        }
    });

    if aborted.load(Ordering::Relaxed) {
        return false;
    }

    let mut found = found.into_inner().unwrap();
    // Deterministic bucket contents regardless of thread interleaving.
    found.sort_by(|a, b| a.iter().collect::<Vec<_>>().cmp(&b.iter().collect::<Vec<_>>()));
    for conf in found {
        if db.len() >= opts.max_deadlocks {
            return false;
        }
        if ctx.charge(conf.heap_bytes() * conf.len()).is_err() {
            return false;
        }
        db.insert(conf);
    }
    true
}

fn collect_deadlock_subsets(
    board: &Board,
    subset: &mut [u16],
    depth: usize,
    no_deadlock: &FxHashSet<BoxConfiguration>,
    db: &DeadlockDb,
    out: &mut Vec<BoxConfiguration>,
) {
    if depth == subset.len() {
        let mut conf = BoxConfiguration::new(board.num_box_cells());
        for &cell in subset.iter() {
            conf.add(cell);
        }
        // Supersets of known deadlocks are already covered by the subset
        // test at query time.
        if db.is_deadlock_anywhere(&conf) {
            return;
        }
        if !no_deadlock.contains(&conf) {
            out.push(conf);
        }
        return;
    }
    for cell in (subset[depth - 1] + 1)..board.num_box_cells() as u16 {
        subset[depth] = cell;
        collect_deadlock_subsets(board, subset, depth + 1, no_deadlock, db, out);
    }
}

/// All k-element subsets of `items`, preserving order.
fn combinations(items: &[u16], k: usize) -> Vec<Vec<u16>> {
    let mut result = Vec::new();
    if k > items.len() {
        return result;
    }
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        result.push(indices.iter().map(|&i| items[i]).collect());
        // Advance the combination counter from the right.
        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if indices[i] != i + items.len() - k {
                break;
            }
            if i == 0 {
                return result;
            }
        }
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
    }
}
