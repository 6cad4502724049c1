use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::board::Board;
use crate::error::Error;

/// Error type for level collection loading.
#[derive(Debug)]
pub enum LevelError {
    /// IO error when reading from file
    Io(io::Error),
    /// A level in the collection failed validation
    InvalidLevel(usize, Error),
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::Io(err) => write!(f, "IO error: {}", err),
            LevelError::InvalidLevel(number, err) => {
                write!(f, "level {}: {}", number, err)
            }
        }
    }
}

impl std::error::Error for LevelError {}

impl From<io::Error> for LevelError {
    fn from(err: io::Error) -> Self {
        LevelError::Io(err)
    }
}

/// A collection of Sokoban levels in XSB format.
#[derive(Debug)]
pub struct Levels {
    levels: Vec<Board>,
}

impl Levels {
    /// Parse XSB-formatted levels from a string.
    ///
    /// Lines starting with `;` separate or annotate levels; blank lines
    /// end the current level. Every level is validated on load.
    pub fn from_text(contents: &str) -> Result<Self, LevelError> {
        let mut levels = Vec::new();
        let mut current = String::new();

        let finish =
            |current: &mut String, levels: &mut Vec<Board>| -> Result<(), LevelError> {
                if current.is_empty() {
                    return Ok(());
                }
                let board = Board::from_text(current.trim_end())
                    .map_err(|e| LevelError::InvalidLevel(levels.len() + 1, e))?;
                levels.push(board);
                current.clear();
                Ok(())
            };

        for line in contents.lines() {
            if line.trim_start().starts_with(';') || line.trim().is_empty() {
                finish(&mut current, &mut levels)?;
                continue;
            }
            current.push_str(line);
            current.push('\n');
        }
        finish(&mut current, &mut levels)?;

        Ok(Levels { levels })
    }

    /// Load XSB-formatted levels from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LevelError> {
        let contents = fs::read_to_string(path)?;
        Self::from_text(&contents)
    }

    /// Get the nth level (0-indexed).
    pub fn get(&self, index: usize) -> Option<&Board> {
        self.levels.get(index)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_basic() {
        let level1 = "#####\n#@$.#\n#####";
        let level2 = "######\n#@$ .#\n# $ .#\n######";
        let contents = format!("; 1\n\n{}\n\n; 2\n\n{}\n", level1, level2);

        let levels = Levels::from_text(&contents).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels.get(0).unwrap().box_count(), 1);
        assert_eq!(levels.get(1).unwrap().box_count(), 2);
        assert!(levels.get(2).is_none());
    }

    #[test]
    fn test_from_text_invalid_level() {
        let contents = "; broken\n\n####\n#@@#\n####\n";
        let result = Levels::from_text(contents);
        assert!(matches!(result, Err(LevelError::InvalidLevel(1, _))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Levels::from_file("does-not-exist.xsb");
        assert!(matches!(result, Err(LevelError::Io(_))));
    }
}
