use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::board::Board;
use crate::boxconf::BoxConfiguration;

/// Zobrist keys for search states, one key per dense box cell and one per
/// dense player cell. A state hashes to the xor of its box-cell keys and
/// the key of the canonical player reach cell.
pub struct Zobrist {
    box_keys: Vec<u64>,
    player_keys: Vec<u64>,
}

impl Zobrist {
    pub fn new(board: &Board) -> Self {
        // Seeded PRNG for reproducible hashes across runs
        let mut rng = ChaCha8Rng::seed_from_u64(0x51ab_0c0d_e51a_b0c0);

        let box_keys = (0..board.num_box_cells()).map(|_| rng.next_u64()).collect();
        let player_keys = (0..board.num_player_cells())
            .map(|_| rng.next_u64())
            .collect();

        Zobrist {
            box_keys,
            player_keys,
        }
    }

    pub fn box_key(&self, box_cell: u16) -> u64 {
        self.box_keys[box_cell as usize]
    }

    pub fn player_key(&self, player_cell: u16) -> u64 {
        self.player_keys[player_cell as usize]
    }

    pub fn boxes_hash(&self, conf: &BoxConfiguration) -> u64 {
        conf.iter().fold(0, |acc, cell| acc ^ self.box_key(cell))
    }

    /// Full state hash from the box configuration and the canonical
    /// player reach cell.
    pub fn state_hash(&self, conf: &BoxConfiguration, canonical_player_cell: u16) -> u64 {
        self.boxes_hash(conf) ^ self.player_key(canonical_player_cell)
    }
}
