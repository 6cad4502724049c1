use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use fxhash::FxHashSet;
use log::debug;

use crate::board::{ALL_DIRECTIONS, Board};
use crate::boxconf::BoxConfiguration;
use crate::context::SearchContext;
use crate::deadlock_db::DeadlockDb;
use crate::error::Error;

/// For every box cell, the other box cells ordered by how far a lone box
/// would have to be pushed to get there. Slot radii of the vicinity
/// generator index into these lists.
pub struct NearTable {
    nearest: Vec<Vec<u16>>,
}

impl NearTable {
    pub fn new(board: &Board) -> Self {
        let num_cells = board.num_box_cells();
        let nearest = (0..num_cells as u16)
            .map(|start| {
                // BFS over single-box pushes, other boxes ignored.
                let mut dists = vec![u16::MAX; num_cells];
                dists[start as usize] = 0;
                let mut queue = VecDeque::new();
                queue.push_back(start);
                while let Some(cell) = queue.pop_front() {
                    let pos = board.box_cell_pos(cell);
                    let dist = dists[cell as usize];
                    for dir in ALL_DIRECTIONS {
                        let Some(dest) = board.move_position(pos, dir) else {
                            continue;
                        };
                        let Some(player_side) = board.move_position(pos, dir.reverse()) else {
                            continue;
                        };
                        if board.is_wall(dest) || board.is_wall(player_side) {
                            continue;
                        }
                        if board.is_simple_deadlock(dest) {
                            continue;
                        }
                        let Some(dest_cell) = board.box_cell_index(dest) else {
                            continue;
                        };
                        if dists[dest_cell as usize] == u16::MAX {
                            dists[dest_cell as usize] = dist + 1;
                            queue.push_back(dest_cell);
                        }
                    }
                }

                let mut cells: Vec<u16> = (0..num_cells as u16)
                    .filter(|&c| dists[c as usize] != u16::MAX)
                    .collect();
                cells.sort_by_key(|&c| (dists[c as usize], c));
                cells
            })
            .collect();

        NearTable { nearest }
    }

    /// The `radius` nearest cells to `cell`, nearest first. The cell
    /// itself heads its own list with distance zero.
    pub fn nearest(&self, cell: u16, radius: u16) -> &[u16] {
        let list = &self.nearest[cell as usize];
        &list[..list.len().min(radius as usize)]
    }
}

/// Enumerate every configuration obtained from `reference` by relocating
/// up to `radii.len()` distinct boxes, where the i-th relocated box may
/// move to any of the `radii[i]` cells nearest its original square.
/// Configurations that are a known deadlock are not emitted, and nothing
/// past them is explored: relocating a further box keeps the deadlocked
/// subset in place.
///
/// Relocated boxes are chosen in increasing order of their original cell,
/// which keeps the enumeration free of structural duplicates with one
/// documented exception: a later box may land exactly on an earlier box's
/// vacated original cell, reaching the same configuration along two slot
/// assignments. The output set absorbs those.
///
/// Worker threads take the first relocated box from a shared counter and
/// enumerate the deeper slots on private state; the per-thread sets merge
/// at join time. The merged set is capped at `capacity`; overflowing it
/// discards the run and reports resource exhaustion so the caller can
/// shrink the radii.
pub fn generate(
    table: &NearTable,
    db: &DeadlockDb,
    reference: &BoxConfiguration,
    radii: &[u16],
    capacity: usize,
    threads: usize,
    ctx: &SearchContext,
) -> Result<FxHashSet<BoxConfiguration>, Error> {
    let mut result = FxHashSet::default();
    result.insert(reference.clone());
    if radii.is_empty() {
        return Ok(result);
    }

    let threads = if threads == 0 {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        threads
    };
    let boxes: Vec<u16> = reference.iter().collect();

    let next_box = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let merged: Mutex<FxHashSet<BoxConfiguration>> = Mutex::new(result);

    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let mut local: FxHashSet<BoxConfiguration> = FxHashSet::default();
                loop {
                    let idx = next_box.fetch_add(1, Ordering::Relaxed);
                    if idx >= boxes.len() || failed.load(Ordering::Relaxed) {
                        break;
                    }
                    if ctx.check().is_err() {
                        failed.store(true, Ordering::Relaxed);
                        break;
                    }

                    let mut conf = reference.clone();
                    let mut moved = Vec::new();
                    if !relocate_slot(
                        table, db, radii, 0, boxes[idx], &mut conf, &mut moved, capacity,
                        &mut local,
                    ) {
                        failed.store(true, Ordering::Relaxed);
                        break;
                    }
                }

                let mut merged = merged.lock().unwrap();
                merged.extend(local);
                if merged.len() > capacity {
                    failed.store(true, Ordering::Relaxed);
                }
            });
        }
    });

    if failed.load(Ordering::Relaxed) {
        ctx.check()?;
        debug!("vicinity capacity {} overflowed, discarding", capacity);
        return Err(Error::ResourceExhausted);
    }
    Ok(merged.into_inner().unwrap())
}

/// Enumerate every relocation of the box whose original square is
/// `box_cell` in the given slot, then recurse into later slots over boxes
/// with larger original cells. `moved` holds the current squares of boxes
/// relocated by outer slots so they are never picked again. Returns false
/// when the local set overflows.
#[allow(clippy::too_many_arguments)]
fn relocate_slot(
    table: &NearTable,
    db: &DeadlockDb,
    radii: &[u16],
    slot: usize,
    box_cell: u16,
    conf: &mut BoxConfiguration,
    moved: &mut Vec<u16>,
    capacity: usize,
    out: &mut FxHashSet<BoxConfiguration>,
) -> bool {
    let targets: Vec<u16> = table
        .nearest(box_cell, radii[slot])
        .iter()
        .copied()
        .filter(|&t| t != box_cell && !conf.contains(t))
        .collect();

    for target in targets {
        conf.move_box(box_cell, target);
        moved.push(target);

        if !db.is_deadlock(conf, target) {
            if out.len() >= capacity {
                moved.pop();
                conf.move_box(target, box_cell);
                return false;
            }
            out.insert(conf.clone());

            if slot + 1 < radii.len() {
                // Later slots only touch reference boxes after this one's
                // original cell, keeping the slot assignment canonical.
                let deeper: Vec<u16> = conf
                    .iter()
                    .filter(|&c| c > box_cell && !moved.contains(&c))
                    .collect();
                for next_box in deeper {
                    if !relocate_slot(
                        table,
                        db,
                        radii,
                        slot + 1,
                        next_box,
                        conf,
                        moved,
                        capacity,
                        out,
                    ) {
                        moved.pop();
                        conf.move_box(target, box_cell);
                        return false;
                    }
                }
            }
        }

        moved.pop();
        conf.move_box(target, box_cell);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;

    fn parse(text: &str) -> Board {
        Board::from_text(text.trim_matches('\n')).unwrap()
    }

    fn generate_all(
        board: &Board,
        radii: &[u16],
    ) -> FxHashSet<BoxConfiguration> {
        let table = NearTable::new(board);
        let db = DeadlockDb::empty(board);
        generate(
            &table,
            &db,
            &board.start_conf(),
            radii,
            1 << 20,
            2,
            &SearchContext::unlimited(),
        )
        .unwrap()
    }

    #[test]
    fn test_near_table_orders_by_push_distance() {
        let board = parse("#######\n#@ $ .#\n#######");
        let table = NearTable::new(&board);
        let start = board.box_cell_index(Position(3, 1)).unwrap();
        let list = table.nearest(start, 100);
        // Itself first, then the adjacent corridor cells.
        assert_eq!(list[0], start);
        assert!(list.len() >= 3);
    }

    #[test]
    fn test_zero_slots_yield_reference_only() {
        let board = parse("#######\n#@ $ .#\n#######");
        let set = generate_all(&board, &[]);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&board.start_conf()));
    }

    #[test]
    fn test_single_slot_counts() {
        // The box can stand on any of the four live corridor cells; one
        // relocation slot with a large radius reaches all of them.
        let board = parse("#######\n#@ $ .#\n#######");
        let set = generate_all(&board, &[100]);
        // Reference plus three other placements.
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_radius_limits_targets() {
        let board = parse("#######\n#@ $ .#\n#######");
        // Radius 2 allows the reference cell and its single nearest cell.
        let set = generate_all(&board, &[2]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_two_boxes_two_slots() {
        let board = parse(
            r#"
######
#@$ .#
# $ .#
######
"#,
        );
        let one = generate_all(&board, &[100]);
        let two = generate_all(&board, &[100, 100]);
        // Moving two boxes strictly extends the one-box vicinity.
        assert!(two.len() > one.len());
        assert!(one.iter().all(|c| two.contains(c)));
        // Every emitted configuration keeps the box count.
        for conf in &two {
            assert_eq!(conf.len(), 2);
        }
    }

    #[test]
    fn test_deadlocks_are_not_emitted() {
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
        let table = NearTable::new(&board);
        let opts = crate::deadlock_db::DeadlockDbOptions {
            max_box_count: 2,
            threads: 2,
            ..Default::default()
        };
        let db = DeadlockDb::identify(&board, &opts, &SearchContext::unlimited());
        let set = generate(
            &table,
            &db,
            &board.start_conf(),
            &[1000, 1000],
            1 << 20,
            2,
            &SearchContext::unlimited(),
        )
        .unwrap();

        for conf in &set {
            assert!(!db.is_deadlock_anywhere(conf));
        }
        // The frozen wall pair must have been pruned away.
        let mut frozen = BoxConfiguration::new(board.num_box_cells());
        frozen.add(board.box_cell_index(Position(1, 2)).unwrap());
        frozen.add(board.box_cell_index(Position(1, 3)).unwrap());
        assert!(!set.contains(&frozen));
    }

    #[test]
    fn test_capacity_overflow_reports_exhaustion() {
        let board = parse(
            r#"
########
#@     #
# $  . #
# $  . #
#      #
########
"#,
        );
        let table = NearTable::new(&board);
        let db = DeadlockDb::empty(&board);
        let result = generate(
            &table,
            &db,
            &board.start_conf(),
            &[1000, 1000],
            4,
            2,
            &SearchContext::unlimited(),
        );
        assert_eq!(result.unwrap_err(), Error::ResourceExhausted);
    }

    #[test]
    fn test_cancellation_wins_over_overflow() {
        let board = parse("#######\n#@ $ .#\n#######");
        let table = NearTable::new(&board);
        let db = DeadlockDb::empty(&board);
        let ctx = SearchContext::unlimited();
        ctx.cancel();
        let result = generate(
            &table,
            &db,
            &board.start_conf(),
            &[100],
            1 << 20,
            2,
            &ctx,
        );
        assert_eq!(result.unwrap_err(), Error::Cancelled);
    }
}
