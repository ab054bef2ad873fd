//! Spawn point availability. A candidate is usable when it is a free cell,
//! its full clearance disk fits on the board and no live player sits within
//! the clearance radius.

use crate::board::{Board, Point};

/// True iff `point` can take a spawn right now. `live_positions` are the
/// positions of spawned players only; waiting players do not contest a
/// point. The Manhattan disk of radius `clear_radius` around the candidate
/// must lie fully inside the board, otherwise the candidate is rejected.
pub fn is_available(
    board: &Board,
    point: Point,
    live_positions: &[Point],
    clear_radius: i32,
) -> bool {
    if !board.in_bounds(point.x, point.y) || board.is_wall(point.x, point.y) {
        return false;
    }
    if point.x - clear_radius < 0
        || point.y - clear_radius < 0
        || point.x + clear_radius >= board.width()
        || point.y + clear_radius >= board.height()
    {
        return false;
    }
    live_positions
        .iter()
        .all(|occupied| occupied.manhattan(point) > clear_radius)
}

/// Walks the board's spawn points in declaration order and returns the
/// index of the first available one.
pub fn first_available(board: &Board, live_positions: &[Point], clear_radius: i32) -> Option<usize> {
    board
        .spawn_points()
        .iter()
        .position(|point| is_available(board, *point, live_positions, clear_radius))
}
