use std::fmt;

use fxhash::FxHasher;
use std::hash::{Hash, Hasher};

use crate::bits::CellSet;
use crate::boxconf::BoxConfiguration;
use crate::deadlock;
use crate::error::Error;

pub const MAX_SIZE: usize = 64;
pub const MAX_BOXES: usize = 64;

/// Sentinel for "position is not part of a dense cell numbering".
pub const NO_CELL: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Floor,
    Goal,
}

/// Grid position as (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(pub u8, pub u8);

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

pub const ALL_DIRECTIONS: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

impl Direction {
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// The two directions perpendicular to this one.
    pub fn orthogonal(&self) -> [Direction; 2] {
        match self {
            Direction::Up | Direction::Down => [Direction::Left, Direction::Right],
            Direction::Left | Direction::Right => [Direction::Up, Direction::Down],
        }
    }

    pub fn delta(&self) -> (i8, i8) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn from_index(idx: usize) -> Direction {
        match idx {
            0 => Direction::Up,
            1 => Direction::Down,
            2 => Direction::Left,
            3 => Direction::Right,
            _ => unreachable!(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
            Direction::Left => write!(f, "Left"),
            Direction::Right => write!(f, "Right"),
        }
    }
}

/// A push identified by the pushed box's current position and the push
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushMove {
    pub box_pos: Position,
    pub direction: Direction,
}

impl fmt::Display for PushMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Push {} {}", self.box_pos, self.direction)
    }
}

/// A preprocessed Sokoban board: geometry, goals, the two dense cell
/// numberings and the per-cell simple-deadlock flags. Immutable after
/// construction; box positions are tracked separately as a
/// [`BoxConfiguration`].
#[derive(Debug, Clone)]
pub struct Board {
    tiles: [[Tile; MAX_SIZE]; MAX_SIZE],
    width: u8,
    height: u8,
    player_start: Position,
    box_starts: Vec<Position>,
    goals: Vec<Position>,
    simple_deadlocks: CellSet,
    // Cells the player can ever reach, densely numbered in scan order.
    player_cells: Vec<Position>,
    player_index: [[u16; MAX_SIZE]; MAX_SIZE],
    // Cells a box can ever legally occupy (player-reachable, non-wall,
    // non-simple-deadlock, plus initial box cells), densely numbered.
    box_cells: Vec<Position>,
    box_index: [[u16; MAX_SIZE]; MAX_SIZE],
    goal_conf: BoxConfiguration,
}

impl Board {
    /// Parse a Sokoban board from text format.
    ///
    /// Characters:
    /// - `#` = Wall
    /// - ` ` = Floor (empty space)
    /// - `.` = Goal (target location for boxes)
    /// - `$` = Box
    /// - `@` = Player
    /// - `*` = Box on goal
    /// - `+` = Player on goal
    ///
    /// Rows may be ragged; missing cells are treated as floor and, like
    /// every cell outside the player-reachable component, coerced to wall.
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let lines: Vec<&str> = text.lines().collect();

        if lines.is_empty() {
            return Err(Error::invalid_board("empty board"));
        }

        let height = lines.len();
        let width = lines.iter().map(|line| line.len()).max().unwrap_or(0);

        if width > MAX_SIZE || height > MAX_SIZE {
            return Err(Error::invalid_board(format!(
                "board size {}x{} exceeds maximum {}x{}",
                width, height, MAX_SIZE, MAX_SIZE
            )));
        }

        let mut tiles = [[Tile::Floor; MAX_SIZE]; MAX_SIZE];
        let mut player = None;
        let mut box_starts = Vec::new();
        let mut goals = Vec::new();

        for (y, line) in lines.iter().enumerate() {
            for (x, ch) in line.chars().enumerate() {
                let pos = Position(x as u8, y as u8);
                match ch {
                    '#' => tiles[y][x] = Tile::Wall,
                    ' ' => tiles[y][x] = Tile::Floor,
                    '.' => {
                        tiles[y][x] = Tile::Goal;
                        goals.push(pos);
                    }
                    '$' => {
                        tiles[y][x] = Tile::Floor;
                        box_starts.push(pos);
                    }
                    '*' => {
                        tiles[y][x] = Tile::Goal;
                        goals.push(pos);
                        box_starts.push(pos);
                    }
                    '@' => {
                        tiles[y][x] = Tile::Floor;
                        if player.is_some() {
                            return Err(Error::invalid_board("multiple players found"));
                        }
                        player = Some(pos);
                    }
                    '+' => {
                        tiles[y][x] = Tile::Goal;
                        goals.push(pos);
                        if player.is_some() {
                            return Err(Error::invalid_board("multiple players found"));
                        }
                        player = Some(pos);
                    }
                    _ => {
                        return Err(Error::invalid_board(format!(
                            "invalid character '{}' at ({}, {})",
                            ch, x, y
                        )));
                    }
                }
            }
        }

        let Some(player_start) = player else {
            return Err(Error::invalid_board("no player found on board"));
        };

        // Flood-fill the component the player can ever reach (boxes are
        // floor for this purpose since they can be pushed away).
        let mut visited = CellSet::new();
        let mut stack = vec![player_start];
        visited.set(player_start);
        while let Some(pos) = stack.pop() {
            // An open cell on the outermost ring means the wall border is
            // incomplete and the player could walk off the grid.
            if pos.0 == 0
                || pos.1 == 0
                || pos.0 as usize == width - 1
                || pos.1 as usize == height - 1
            {
                return Err(Error::invalid_board("incomplete wall border"));
            }
            for dir in ALL_DIRECTIONS {
                let (dx, dy) = dir.delta();
                let nx = pos.0 as i32 + dx as i32;
                let ny = pos.1 as i32 + dy as i32;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let next = Position(nx as u8, ny as u8);
                if tiles[ny as usize][nx as usize] != Tile::Wall && !visited.get(next) {
                    visited.set(next);
                    stack.push(next);
                }
            }
        }

        // Boxes and goals outside the reachable component are dropped only
        // if they cancel out (box resting on a goal); otherwise the level
        // is broken.
        let goal_set: CellSet = {
            let mut s = CellSet::new();
            for &g in &goals {
                s.set(g);
            }
            s
        };
        let box_set: CellSet = {
            let mut s = CellSet::new();
            for &b in &box_starts {
                s.set(b);
            }
            s
        };
        for &pos in &box_starts {
            if !visited.get(pos) && !goal_set.get(pos) {
                return Err(Error::invalid_board(format!("unreachable box at {}", pos)));
            }
        }
        for &pos in &goals {
            if !visited.get(pos) && !box_set.get(pos) {
                return Err(Error::invalid_board(format!("unreachable goal at {}", pos)));
            }
        }
        box_starts.retain(|&pos| visited.get(pos));
        goals.retain(|&pos| visited.get(pos));

        if box_starts.is_empty() {
            return Err(Error::invalid_board("no boxes"));
        }
        if box_starts.len() != goals.len() {
            return Err(Error::invalid_board(format!(
                "box count ({}) does not match goal count ({})",
                box_starts.len(),
                goals.len()
            )));
        }
        if box_starts.len() > MAX_BOXES {
            return Err(Error::invalid_board(format!(
                "more than {} boxes",
                MAX_BOXES
            )));
        }

        // Coerce everything outside the reachable component to wall.
        for y in 0..height {
            for x in 0..width {
                if !visited.get(Position(x as u8, y as u8)) {
                    tiles[y][x] = Tile::Wall;
                }
            }
        }

        let simple_deadlocks =
            deadlock::compute_simple_deadlocks(&tiles, width as u8, height as u8, &goals);

        // Dense numberings. Box cells are a subset of player cells except
        // that a box starting on a simple-deadlock square keeps its cell
        // (the position is representable; the lower bound reports it as
        // unsolvable).
        let mut player_cells = Vec::new();
        let mut player_index = [[NO_CELL; MAX_SIZE]; MAX_SIZE];
        let mut box_cells = Vec::new();
        let mut box_index = [[NO_CELL; MAX_SIZE]; MAX_SIZE];
        for y in 0..height {
            for x in 0..width {
                let pos = Position(x as u8, y as u8);
                if !visited.get(pos) {
                    continue;
                }
                player_index[y][x] = player_cells.len() as u16;
                player_cells.push(pos);
                if !simple_deadlocks.get(pos) || box_set.get(pos) {
                    box_index[y][x] = box_cells.len() as u16;
                    box_cells.push(pos);
                }
            }
        }

        let mut goal_conf = BoxConfiguration::new(box_cells.len());
        for &g in &goals {
            goal_conf.add(box_index[g.1 as usize][g.0 as usize]);
        }

        Ok(Board {
            tiles,
            width: width as u8,
            height: height as u8,
            player_start,
            box_starts,
            goals,
            simple_deadlocks,
            player_cells,
            player_index,
            box_cells,
            box_index,
            goal_conf,
        })
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn height(&self) -> usize {
        self.height as usize
    }

    pub fn get_tile(&self, pos: Position) -> Tile {
        self.tiles[pos.1 as usize][pos.0 as usize]
    }

    pub fn is_wall(&self, pos: Position) -> bool {
        self.get_tile(pos) == Tile::Wall
    }

    pub fn is_goal(&self, pos: Position) -> bool {
        self.get_tile(pos) == Tile::Goal
    }

    pub fn is_simple_deadlock(&self, pos: Position) -> bool {
        self.simple_deadlocks.get(pos)
    }

    pub fn player_start(&self) -> Position {
        self.player_start
    }

    pub fn box_starts(&self) -> &[Position] {
        &self.box_starts
    }

    pub fn goals(&self) -> &[Position] {
        &self.goals
    }

    pub fn box_count(&self) -> usize {
        self.box_starts.len()
    }

    /// Number of cells the player can ever reach.
    pub fn num_player_cells(&self) -> usize {
        self.player_cells.len()
    }

    /// Number of cells a box can ever occupy.
    pub fn num_box_cells(&self) -> usize {
        self.box_cells.len()
    }

    pub fn player_cell_index(&self, pos: Position) -> Option<u16> {
        let idx = self.player_index[pos.1 as usize][pos.0 as usize];
        if idx == NO_CELL { None } else { Some(idx) }
    }

    pub fn player_cell_pos(&self, index: u16) -> Position {
        self.player_cells[index as usize]
    }

    pub fn box_cell_index(&self, pos: Position) -> Option<u16> {
        let idx = self.box_index[pos.1 as usize][pos.0 as usize];
        if idx == NO_CELL { None } else { Some(idx) }
    }

    pub fn box_cell_pos(&self, index: u16) -> Position {
        self.box_cells[index as usize]
    }

    /// The goal cells as a box configuration; a position is solved when
    /// its configuration is a subset of (hence equal to) this.
    pub fn goal_conf(&self) -> &BoxConfiguration {
        &self.goal_conf
    }

    /// The initial box placement as a configuration.
    pub fn start_conf(&self) -> BoxConfiguration {
        let mut conf = BoxConfiguration::new(self.box_cells.len());
        for &pos in &self.box_starts {
            conf.add(self.box_cell_index(pos).unwrap());
        }
        conf
    }

    /// Move from position in the given direction.
    /// Returns None if the new position would leave the grid.
    pub fn move_position(&self, pos: Position, dir: Direction) -> Option<Position> {
        let (dx, dy) = dir.delta();
        let new_x = pos.0 as i32 + dx as i32;
        let new_y = pos.1 as i32 + dy as i32;

        if new_x >= 0 && new_y >= 0 && new_x < self.width as i32 && new_y < self.height as i32 {
            Some(Position(new_x as u8, new_y as u8))
        } else {
            None
        }
    }

    /// Check whether the box at `box_pos` can be pushed one square in
    /// `dir`: the player must reach the square opposite the push, and the
    /// destination must be a free, non-simple-deadlock box cell.
    pub fn is_pushable(
        &self,
        conf: &BoxConfiguration,
        reach: &CellSet,
        box_pos: Position,
        dir: Direction,
    ) -> bool {
        let Some(player_pos) = self.move_position(box_pos, dir.reverse()) else {
            return false;
        };
        if !reach.get(player_pos) {
            return false;
        }
        let Some(dest) = self.move_position(box_pos, dir) else {
            return false;
        };
        if self.is_wall(dest) || self.is_simple_deadlock(dest) {
            return false;
        }
        match self.box_cell_index(dest) {
            Some(idx) => !conf.contains(idx),
            None => false,
        }
    }

    /// Apply a push, returning the resulting configuration. The caller
    /// guarantees pushability; the box simply moves one cell.
    pub fn do_push(
        &self,
        conf: &BoxConfiguration,
        box_pos: Position,
        dir: Direction,
    ) -> BoxConfiguration {
        let from = self.box_cell_index(box_pos).expect("box not on a box cell");
        let dest = self.move_position(box_pos, dir).expect("push out of bounds");
        let to = self.box_cell_index(dest).expect("push into a non-box cell");
        let mut new_conf = conf.clone();
        new_conf.move_box(from, to);
        new_conf
    }

    /// All legal pushes from a position, given the player's reach.
    pub fn compute_pushes(&self, conf: &BoxConfiguration, reach: &CellSet) -> Vec<PushMove> {
        let mut pushes = Vec::new();
        for cell in conf.iter() {
            let box_pos = self.box_cell_pos(cell);
            for direction in ALL_DIRECTIONS {
                if self.is_pushable(conf, reach, box_pos, direction) {
                    pushes.push(PushMove { box_pos, direction });
                }
            }
        }
        pushes
    }

    /// Stable hash of (dimensions, walls, goals, simple deadlocks), usable
    /// as an external cache key for precomputed deadlock sets.
    pub fn geometry_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        (self.width, self.height).hash(&mut hasher);
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let pos = Position(x as u8, y as u8);
                (self.is_wall(pos), self.is_goal(pos), self.is_simple_deadlock(pos))
                    .hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Render the board with an arbitrary box configuration and player
    /// position in the canonical text format.
    pub fn render(&self, conf: &BoxConfiguration, player: Position) -> String {
        let mut out = String::new();
        for y in 0..self.height {
            let mut line = String::new();
            for x in 0..self.width {
                let pos = Position(x, y);
                let has_box = self
                    .box_cell_index(pos)
                    .is_some_and(|idx| conf.contains(idx));
                let ch = if pos == player {
                    if self.is_goal(pos) { '+' } else { '@' }
                } else if has_box {
                    if self.is_goal(pos) { '*' } else { '$' }
                } else {
                    match self.get_tile(pos) {
                        Tile::Wall => '#',
                        Tile::Floor => ' ',
                        Tile::Goal => '.',
                    }
                };
                line.push(ch);
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&self.start_conf(), self.player_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Board {
        Board::from_text(text.trim_matches('\n')).unwrap()
    }

    #[test]
    fn test_parse_basic_board() {
        let board = parse(
            r#"
####
# .#
#  ###
#*@  #
#  $ #
#  ###
####
"#,
        );
        assert_eq!(board.width(), 6);
        assert_eq!(board.height(), 7);
        assert_eq!(board.player_start(), Position(2, 3));
        assert_eq!(board.box_count(), 2);
        assert_eq!(board.goals().len(), 2);
    }

    #[test]
    fn test_no_player() {
        assert!(matches!(
            Board::from_text("####\n#$.#\n####"),
            Err(Error::InvalidBoard(_))
        ));
    }

    #[test]
    fn test_multiple_players() {
        assert!(matches!(
            Board::from_text("#####\n#@@*#\n#####"),
            Err(Error::InvalidBoard(_))
        ));
    }

    #[test]
    fn test_box_goal_mismatch() {
        assert!(matches!(
            Board::from_text("#####\n#@$ #\n#####"),
            Err(Error::InvalidBoard(_))
        ));
    }

    #[test]
    fn test_incomplete_border() {
        for text in ["####\n#@*\n####", "## #\n#@*#\n####", "####\n#@*#\n# ##"] {
            assert!(
                matches!(Board::from_text(text), Err(Error::InvalidBoard(_))),
                "expected border error for:\n{}",
                text
            );
        }
    }

    #[test]
    fn test_unreachable_cells_coerced_to_wall() {
        let board = parse(
            r#"
#######
#@$.###
#### ##
#######
"#,
        );
        // The pocket at (4, 2) is outside the player component.
        assert!(board.is_wall(Position(4, 2)));
    }

    #[test]
    fn test_unreachable_box_rejected_unless_cancelled() {
        // Box not on goal behind a wall: broken level.
        assert!(matches!(
            Board::from_text("########\n#@$.#$.#\n########"),
            Err(Error::InvalidBoard(_))
        ));
        // Box on goal behind a wall: both are dropped.
        let board = parse("########\n#@$.#*##\n########");
        assert_eq!(board.box_count(), 1);
        assert_eq!(board.goals().len(), 1);
    }

    #[test]
    fn test_dense_numberings() {
        let board = parse(
            r#"
#####
#@  #
# $.#
#####
"#,
        );
        // Player cells cover the whole interior.
        assert_eq!(board.num_player_cells(), 6);
        // Corners other than the goal are simple deadlocks and drop out of
        // the box numbering.
        assert!(board.num_box_cells() < board.num_player_cells());
        for &goal in board.goals() {
            assert!(board.box_cell_index(goal).is_some());
        }
        for &start in board.box_starts() {
            assert!(board.box_cell_index(start).is_some());
        }
        // Index mappings invert each other.
        for idx in 0..board.num_box_cells() as u16 {
            assert_eq!(board.box_cell_index(board.box_cell_pos(idx)), Some(idx));
        }
        for idx in 0..board.num_player_cells() as u16 {
            assert_eq!(
                board.player_cell_index(board.player_cell_pos(idx)),
                Some(idx)
            );
        }
    }

    #[test]
    fn test_pushability() {
        let board = parse(
            r#"
######
#@$ .#
######
"#,
        );
        let conf = board.start_conf();
        let mut reach = CellSet::new();
        reach.set(Position(1, 1));

        assert!(board.is_pushable(&conf, &reach, Position(2, 1), Direction::Right));
        // Player can't reach the other side.
        assert!(!board.is_pushable(&conf, &reach, Position(2, 1), Direction::Left));
        // Pushing up goes into a wall.
        assert!(!board.is_pushable(&conf, &reach, Position(2, 1), Direction::Up));
    }

    #[test]
    fn test_do_push() {
        let board = parse(
            r#"
######
#@$ .#
######
"#,
        );
        let conf = board.start_conf();
        let pushed = board.do_push(&conf, Position(2, 1), Direction::Right);
        let idx_old = board.box_cell_index(Position(2, 1)).unwrap();
        let idx_new = board.box_cell_index(Position(3, 1)).unwrap();
        assert!(!pushed.contains(idx_old));
        assert!(pushed.contains(idx_new));
        // Original configuration is untouched.
        assert!(conf.contains(idx_old));
    }

    #[test]
    fn test_geometry_hash_stable() {
        let a = parse("#####\n#@$.#\n#####");
        let b = parse("#####\n#@$.#\n#####");
        let c = parse("#####\n#.$@#\n#####");
        assert_eq!(a.geometry_hash(), b.geometry_hash());
        assert_ne!(a.geometry_hash(), c.geometry_hash());
    }

    #[test]
    fn test_render_round_trip() {
        let text = "#####\n#@$.#\n#####";
        let board = parse(text);
        assert_eq!(board.to_string().trim_end(), text);
    }
}
