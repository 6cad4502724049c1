use std::fmt;

use crate::board::Direction;
use crate::error::Error;

/// One step of a solution: a player move, optionally pushing a box.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Step {
    pub direction: Direction,
    pub is_push: bool,
}

impl Step {
    pub fn new(direction: Direction, is_push: bool) -> Self {
        Step { direction, is_push }
    }

    /// The lurd character: lower case for moves, upper case for pushes.
    pub fn to_char(self) -> char {
        let ch = match self.direction {
            Direction::Up => 'u',
            Direction::Down => 'd',
            Direction::Left => 'l',
            Direction::Right => 'r',
        };
        if self.is_push {
            ch.to_ascii_uppercase()
        } else {
            ch
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Parse a lurd string into steps. Whitespace is ignored; case carries the
/// claimed push flag (the verifier recomputes it during replay).
pub fn parse(lurd: &str) -> Result<Vec<Step>, Error> {
    let mut steps = Vec::with_capacity(lurd.len());
    for ch in lurd.chars() {
        if ch.is_whitespace() {
            continue;
        }
        let direction = match ch.to_ascii_lowercase() {
            'u' => Direction::Up,
            'd' => Direction::Down,
            'l' => Direction::Left,
            'r' => Direction::Right,
            _ => {
                return Err(Error::invalid_solution(format!(
                    "invalid lurd character '{}'",
                    ch
                )));
            }
        };
        steps.push(Step::new(direction, ch.is_ascii_uppercase()));
    }
    Ok(steps)
}

/// Format steps back into a lurd string.
pub fn format(steps: &[Step]) -> String {
    steps.iter().map(|s| s.to_char()).collect()
}
