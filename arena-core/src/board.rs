//! The immutable game board. Loaded once at startup from a run-length
//! encoded cell file plus a sibling dimensions file, then only queried.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A cell position on the board. Origin is the top left corner, `x` runs
/// along columns and `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }

    /// Manhattan distance to another point.
    pub fn manhattan(&self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// The content of one board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Wall,
    /// A pre-declared spawn cell. Counts as empty for movement and bullets.
    Spawn,
}

impl Cell {
    fn from_code(code: u8) -> Option<Cell> {
        match code {
            0 => Some(Cell::Empty),
            1 => Some(Cell::Wall),
            2 => Some(Cell::Spawn),
            _ => None,
        }
    }

    fn code(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::Wall => 1,
            Cell::Spawn => 2,
        }
    }
}

/// Everything that can go wrong while loading a board definition. All of
/// these are fatal at startup.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("failed to read board file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse board file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown cell code {code} in board file")]
    UnknownCell { code: u8 },
    #[error("board declares {expected} cells but the file encodes {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("board dimensions must be positive, got {width}x{height}")]
    BadDimensions { width: i32, height: i32 },
}

/// One run-length encoded entry of the board file: a cell code and an
/// optional repeat count (absent means one).
#[derive(Debug, Serialize, Deserialize)]
struct RleEntry {
    entity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repeat: Option<u32>,
}

/// The sibling dimensions file, `<stem>.config.json` next to the cell file.
#[derive(Debug, Serialize, Deserialize)]
struct Dimensions {
    width: i32,
    height: i32,
}

/// The immutable 2D grid. Cells are stored row-major; spawn points keep
/// their row-major discovery order, which is also the assignment order.
#[derive(Debug, Clone)]
pub struct Board {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
    spawn_points: Vec<Point>,
}

impl Board {
    /// Loads a board from the run-length encoded cell file at `path` and
    /// the dimensions file next to it.
    pub fn load(path: &Path) -> Result<Board, BoardError> {
        let dims_path = path.with_extension("config.json");
        let dims_text = std::fs::read_to_string(&dims_path).map_err(|source| BoardError::Read {
            path: dims_path.clone(),
            source,
        })?;
        let dims: Dimensions =
            serde_json::from_str(&dims_text).map_err(|source| BoardError::Parse {
                path: dims_path,
                source,
            })?;

        let cells_text = std::fs::read_to_string(path).map_err(|source| BoardError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<RleEntry> =
            serde_json::from_str(&cells_text).map_err(|source| BoardError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut cells = Vec::new();
        for entry in &entries {
            let cell = Cell::from_code(entry.entity)
                .ok_or(BoardError::UnknownCell { code: entry.entity })?;
            let repeat = entry.repeat.unwrap_or(1) as usize;
            cells.extend(std::iter::repeat_n(cell, repeat));
        }

        Board::from_cells(dims.width, dims.height, cells)
    }

    /// Builds a board from already decoded cells, validating the rectangle.
    pub fn from_cells(width: i32, height: i32, cells: Vec<Cell>) -> Result<Board, BoardError> {
        if width <= 0 || height <= 0 {
            return Err(BoardError::BadDimensions { width, height });
        }
        let expected = (width as usize) * (height as usize);
        if cells.len() != expected {
            return Err(BoardError::SizeMismatch {
                expected,
                actual: cells.len(),
            });
        }

        let spawn_points = cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell == Cell::Spawn)
            .map(|(index, _)| Point::new(index as i32 % width, index as i32 / width))
            .collect();

        Ok(Board {
            width,
            height,
            cells,
            spawn_points,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// True iff `(x, y)` is in bounds and a wall.
    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        self.cell_at(x, y) == Some(Cell::Wall)
    }

    pub fn cell_at(&self, x: i32, y: i32) -> Option<Cell> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(self.cells[(y * self.width + x) as usize])
    }

    /// The declared spawn points in assignment order.
    pub fn spawn_points(&self) -> &[Point] {
        &self.spawn_points
    }

    /// The row-major cell code matrix used by snapshots.
    pub fn grid_rows(&self) -> Vec<Vec<u8>> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| self.cells[(y * self.width + x) as usize].code())
                    .collect()
            })
            .collect()
    }

    /// The snapshot view of this board.
    pub fn view(&self) -> protocol::BoardView {
        protocol::BoardView {
            width: self.width,
            height: self.height,
            grid: self.grid_rows(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write as _;

    /// A bordered board: perimeter walls, empty interior, spawn cells at
    /// the listed positions.
    pub(crate) fn bordered(width: i32, height: i32, spawns: &[(i32, i32)]) -> Board {
        let mut cells = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
                let cell = if border {
                    Cell::Wall
                } else if spawns.contains(&(x, y)) {
                    Cell::Spawn
                } else {
                    Cell::Empty
                };
                cells.push(cell);
            }
        }
        Board::from_cells(width, height, cells).unwrap()
    }

    fn encode(board: &Board) -> (String, String) {
        // Greedy run-length encoding of the row-major cell codes.
        let mut entries: Vec<RleEntry> = Vec::new();
        for row in board.grid_rows() {
            for code in row {
                match entries.last_mut() {
                    Some(last) if last.entity == code => {
                        last.repeat = Some(last.repeat.unwrap_or(1) + 1);
                    }
                    _ => entries.push(RleEntry {
                        entity: code,
                        repeat: None,
                    }),
                }
            }
        }
        let dims = Dimensions {
            width: board.width(),
            height: board.height(),
        };
        (
            serde_json::to_string(&entries).unwrap(),
            serde_json::to_string(&dims).unwrap(),
        )
    }

    fn write_board_files(dir: &Path, name: &str, cells: &str, dims: &str) -> PathBuf {
        let cell_path = dir.join(format!("{name}.json"));
        let dims_path = dir.join(format!("{name}.config.json"));
        std::fs::File::create(&cell_path)
            .unwrap()
            .write_all(cells.as_bytes())
            .unwrap();
        std::fs::File::create(&dims_path)
            .unwrap()
            .write_all(dims.as_bytes())
            .unwrap();
        cell_path
    }

    #[test]
    fn load_round_trips_the_grid() {
        let original = bordered(6, 5, &[(2, 2), (4, 3)]);
        let (cells, dims) = encode(&original);
        let dir = tempfile::tempdir().unwrap();
        let path = write_board_files(dir.path(), "arena", &cells, &dims);

        let loaded = Board::load(&path).unwrap();
        assert_eq!(loaded.grid_rows(), original.grid_rows());
        assert_eq!(loaded.spawn_points(), original.spawn_points());
    }

    #[test]
    fn spawn_points_keep_row_major_order() {
        let board = bordered(8, 8, &[(5, 2), (1, 1), (3, 6)]);
        assert_eq!(
            board.spawn_points(),
            &[Point::new(1, 1), Point::new(5, 2), Point::new(3, 6)]
        );
    }

    #[test]
    fn wall_and_bounds_queries() {
        let board = bordered(4, 3, &[]);
        assert!(board.is_wall(0, 0));
        assert!(!board.is_wall(1, 1));
        // Out of bounds is not a wall, just out of bounds.
        assert!(!board.is_wall(-1, 0));
        assert!(!board.in_bounds(4, 1));
        assert!(board.in_bounds(3, 2));
    }

    #[test]
    fn load_rejects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_board_files(
            dir.path(),
            "short",
            r#"[{"entity":0,"repeat":5}]"#,
            r#"{"width":3,"height":2}"#,
        );
        assert!(matches!(
            Board::load(&path),
            Err(BoardError::SizeMismatch {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn load_rejects_unknown_cell_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_board_files(
            dir.path(),
            "odd",
            r#"[{"entity":7,"repeat":6}]"#,
            r#"{"width":3,"height":2}"#,
        );
        assert!(matches!(
            Board::load(&path),
            Err(BoardError::UnknownCell { code: 7 })
        ));
    }

    #[test]
    fn load_rejects_missing_dimensions_file() {
        let dir = tempfile::tempdir().unwrap();
        let cell_path = dir.path().join("alone.json");
        std::fs::write(&cell_path, r#"[{"entity":0,"repeat":4}]"#).unwrap();
        assert!(matches!(Board::load(&cell_path), Err(BoardError::Read { .. })));
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_board_files(dir.path(), "broken", "not json", r#"{"width":2,"height":2}"#);
        assert!(matches!(Board::load(&path), Err(BoardError::Parse { .. })));
    }

    #[test]
    fn from_cells_rejects_nonpositive_dimensions() {
        assert!(matches!(
            Board::from_cells(0, 4, vec![]),
            Err(BoardError::BadDimensions { .. })
        ));
    }
}
