use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

/// Wire-compatible rectangle: signed 16-bit origin, unsigned 16-bit extent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as i32 + self.width as i32 <= i16::MAX as i32
            && self.y as i32 + self.height as i32 <= i16::MAX as i32
    }

    /// Coordinates of the bottom-right pixel still inside the rectangle.
    pub fn max_point(&self) -> Point {
        Point {
            x: (self.x as i32 + self.width as i32 - 1) as i16,
            y: (self.y as i32 + self.height as i32 - 1) as i16,
        }
    }

    pub fn right(&self) -> i32 { self.x as i32 + self.width as i32 }

    pub fn bottom(&self) -> i32 { self.y as i32 + self.height as i32 }

    pub fn center(&self) -> Point {
        Point {
            x: (self.x as i32 + self.width as i32 / 2) as i16,
            y: (self.y as i32 + self.height as i32 / 2) as i16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    West,
    South,
    East,
}

impl Direction {
    pub fn split_type(self) -> SplitType {
        match self {
            Direction::West | Direction::East => SplitType::Vertical,
            Direction::North | Direction::South => SplitType::Horizontal,
        }
    }
}

/// `Vertical` divides the width, `Horizontal` divides the height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    Vertical,
    Horizontal,
}

impl SplitType {
    pub fn other(self) -> Self {
        match self {
            SplitType::Vertical => SplitType::Horizontal,
            SplitType::Horizontal => SplitType::Vertical,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleDir {
    Prev,
    Next,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CirculateDir {
    Forward,
    Backward,
}

/// Stringency of the directional side test: `Low` accepts neighbors that
/// begin within the source's extent, `High` requires strict separation
/// past the opposite edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tightness {
    Low,
    #[default]
    High,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Padding {
    #[serde(default)]
    pub top: i16,
    #[serde(default)]
    pub right: i16,
    #[serde(default)]
    pub bottom: i16,
    #[serde(default)]
    pub left: i16,
}

pub fn is_inside(p: Point, r: Rect) -> bool {
    if !r.is_valid() {
        return false;
    }
    (p.x as i32) >= (r.x as i32)
        && (p.x as i32) < r.right()
        && (p.y as i32) >= (r.y as i32)
        && (p.y as i32) < r.bottom()
}

pub fn contains(a: Rect, b: Rect) -> bool {
    if !a.is_valid() || !b.is_valid() {
        return false;
    }
    a.x <= b.x && a.y <= b.y && a.right() >= b.right() && a.bottom() >= b.bottom()
}

pub fn area(r: Rect) -> u32 {
    if !r.is_valid() {
        return 0;
    }
    (r.width as u32).saturating_mul(r.height as u32)
}

pub fn boundary_distance(r1: Rect, r2: Rect, dir: Direction) -> u32 {
    if !r1.is_valid() || !r2.is_valid() {
        return u32::MAX;
    }

    let r1_max = r1.max_point();
    let r2_max = r2.max_point();

    let d = match dir {
        Direction::North => (r2_max.y as i32 - r1.y as i32).abs(),
        Direction::West => (r2_max.x as i32 - r1.x as i32).abs(),
        Direction::South => (r1_max.y as i32 - r2.y as i32).abs(),
        Direction::East => (r1_max.x as i32 - r2.x as i32).abs(),
    };
    d as u32
}

pub fn on_dir_side(r1: Rect, r2: Rect, dir: Direction, tightness: Tightness) -> bool {
    if !r1.is_valid() || !r2.is_valid() {
        return false;
    }

    let r1_max = r1.max_point();
    let r2_max = r2.max_point();

    let on_side = match tightness {
        Tightness::Low => match dir {
            Direction::North => r2.y <= r1_max.y,
            Direction::West => r2.x <= r1_max.x,
            Direction::South => r2_max.y >= r1.y,
            Direction::East => r2_max.x >= r1.x,
        },
        Tightness::High => match dir {
            Direction::North => r2.y < r1.y,
            Direction::West => r2.x < r1.x,
            Direction::South => r2_max.y > r1_max.y,
            Direction::East => r2_max.x > r1_max.x,
        },
    };
    if !on_side {
        return false;
    }

    match dir {
        Direction::North | Direction::South => r2_max.x >= r1.x && r2.x <= r1_max.x,
        Direction::West | Direction::East => r2_max.y >= r1.y && r2.y <= r1_max.y,
    }
}

/// Orders non-overlapping rectangles top-to-bottom then left-to-right;
/// overlapping rectangles compare by descending area.
pub fn cmp_rects(r1: Rect, r2: Rect) -> Ordering {
    if !r1.is_valid() || !r2.is_valid() {
        return Ordering::Equal;
    }

    if r1.y as i32 >= r2.bottom() {
        return Ordering::Greater;
    }
    if r2.y as i32 >= r1.bottom() {
        return Ordering::Less;
    }
    if r1.x as i32 >= r2.right() {
        return Ordering::Greater;
    }
    if r2.x as i32 >= r1.right() {
        return Ordering::Less;
    }

    area(r2).cmp(&area(r1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: i16, y: i16, w: u16, h: u16) -> Rect { Rect::new(x, y, w, h) }

    #[test]
    fn inside_is_half_open() {
        let rect = r(10, 10, 20, 20);
        assert!(is_inside(Point { x: 10, y: 10 }, rect));
        assert!(is_inside(Point { x: 29, y: 29 }, rect));
        assert!(!is_inside(Point { x: 30, y: 29 }, rect));
        assert!(!is_inside(Point { x: 9, y: 15 }, rect));
    }

    #[test]
    fn containment_accepts_equal_rects() {
        let rect = r(0, 0, 100, 50);
        assert!(contains(rect, rect));
        assert!(contains(rect, r(10, 10, 10, 10)));
        assert!(!contains(r(10, 10, 10, 10), rect));
    }

    #[test]
    fn area_saturates_and_rejects_invalid() {
        assert_eq!(area(r(0, 0, 0, 10)), 0);
        assert_eq!(area(r(0, 0, 100, 100)), 10_000);
        assert_eq!(area(r(30_000, 0, 10_000, 10)), 0);
    }

    #[test]
    fn rect_order_is_reading_order() {
        let top = r(0, 0, 100, 100);
        let bottom = r(0, 100, 100, 100);
        let right = r(100, 0, 100, 100);
        assert_eq!(cmp_rects(top, bottom), Ordering::Less);
        assert_eq!(cmp_rects(bottom, top), Ordering::Greater);
        assert_eq!(cmp_rects(top, right), Ordering::Less);
    }

    #[test]
    fn overlapping_rects_order_by_descending_area() {
        let big = r(0, 0, 100, 100);
        let small = r(10, 10, 20, 20);
        assert_eq!(cmp_rects(big, small), Ordering::Less);
        assert_eq!(cmp_rects(small, big), Ordering::Greater);
    }

    #[test]
    fn dir_side_tightness_modes_differ() {
        let src = r(100, 0, 100, 100);
        let overlapping = r(150, 0, 100, 100);
        assert!(on_dir_side(src, overlapping, Direction::East, Tightness::Low));
        assert!(on_dir_side(src, overlapping, Direction::East, Tightness::High));
        // Begins within the source's extent: only the low mode accepts it
        // as a western neighbor.
        assert!(on_dir_side(src, overlapping, Direction::West, Tightness::Low));
        assert!(!on_dir_side(src, overlapping, Direction::West, Tightness::High));
    }

    #[test]
    fn boundary_distance_measures_facing_edges() {
        let a = r(0, 0, 100, 100);
        let b = r(150, 0, 100, 100);
        assert_eq!(boundary_distance(a, b, Direction::East), 51);
        assert_eq!(boundary_distance(b, a, Direction::West), 51);
    }
}
