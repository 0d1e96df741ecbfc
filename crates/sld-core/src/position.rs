//! Grid positions, pixel coordinates and the small orientation enums shared
//! by nodes, cells and blocks.

use serde::{Deserialize, Serialize};

/// Layout axis of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Side of the busbars a cell is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Top,
    Bottom,
    /// Drawn in the busbar row itself (flat couplings between adjacent sections)
    Flat,
    #[default]
    Undefined,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Top => write!(f, "TOP"),
            Direction::Bottom => write!(f, "BOTTOM"),
            Direction::Flat => write!(f, "FLAT"),
            Direction::Undefined => write!(f, "UNDEFINED"),
        }
    }
}

/// Left or right leg of a horizontal intern cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Undefined,
}

impl Side {
    pub fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Undefined => Side::Undefined,
        }
    }
}

/// Integer grid slot of a block or a busbar.
///
/// `h`/`v` are relative to the parent block unless `absolute` is set, in
/// which case the position is pinned and ancestors must not shift it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub h: i32,
    pub v: i32,
    pub h_span: i32,
    pub v_span: i32,
    pub orientation: Orientation,
    pub absolute: bool,
}

impl Position {
    pub fn new(h: i32, v: i32) -> Self {
        Self {
            h,
            v,
            h_span: 0,
            v_span: 0,
            orientation: Orientation::Vertical,
            absolute: false,
        }
    }

    pub fn set_hv(&mut self, h: i32, v: i32) {
        self.h = h;
        self.v = v;
    }

    pub fn with_h_span(mut self, h_span: i32) -> Self {
        self.h_span = h_span;
        self
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(-1, -1)
    }
}

/// Pixel coordinate of a block center and its extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub x_span: f64,
    pub y_span: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            x_span: 0.0,
            y_span: 0.0,
        }
    }
}

impl Default for Coord {
    fn default() -> Self {
        Self::new(-1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_position_is_unset() {
        let pos = Position::default();
        assert_eq!((pos.h, pos.v), (-1, -1));
        assert_eq!((pos.h_span, pos.v_span), (0, 0));
        assert!(!pos.absolute);
    }

    #[test]
    fn test_side_flip() {
        assert_eq!(Side::Left.flip(), Side::Right);
        assert_eq!(Side::Right.flip(), Side::Left);
        assert_eq!(Side::Undefined.flip(), Side::Undefined);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Top.to_string(), "TOP");
        assert_eq!(Direction::default(), Direction::Undefined);
    }
}
