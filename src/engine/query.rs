use serde::{Deserialize, Serialize};

use crate::backend::WindowBackend;
use crate::engine::Engine;
use crate::geometry::{area, boundary_distance, on_dir_side, CycleDir, Direction, Rect};
use crate::model::forest::NodeId;
use crate::model::monitor::{DesktopId, MonitorId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaPeak {
    Biggest,
    Smallest,
}

impl<B: WindowBackend> Engine<B> {
    /// Two rectangles share an edge in the given direction.
    pub fn is_adjacent(&self, a: NodeId, b: NodeId, dir: Direction) -> bool {
        let (Some(ra), Some(rb)) = (
            self.forest.get(a).map(|x| x.rectangle),
            self.forest.get(b).map(|x| x.rectangle),
        ) else {
            return false;
        };
        match dir {
            Direction::East => ra.right() == rb.x as i32,
            Direction::South => ra.bottom() == rb.y as i32,
            Direction::West => rb.right() == ra.x as i32,
            Direction::North => rb.bottom() == ra.y as i32,
        }
    }

    /// Closest visible leaf in the given direction across the active
    /// desktops of every monitor; distance first, focus recency breaks
    /// ties.
    pub fn find_nearest_neighbor(
        &self,
        m: MonitorId,
        d: DesktopId,
        n: NodeId,
        dir: Direction,
    ) -> Option<(MonitorId, DesktopId, NodeId)> {
        if !self.forest.contains(n) {
            return None;
        }
        let rect = self.get_rectangle(Some(m), Some(d), Some(n));
        let tightness = self.settings.directional_focus_tightness;

        let mut best: Option<(u32, u32, (MonitorId, DesktopId, NodeId))> = None;
        for &fm in &self.monitor_order {
            let Some(fd) = self.monitors[fm].desk else { continue };
            let Some(root) = self.desktops[fd].root else { continue };
            for f in self.forest.leaves(root) {
                let node = &self.forest[f];
                if f == n
                    || node.client.is_none()
                    || node.hidden
                    || self.forest.is_descendant(f, n)
                {
                    continue;
                }
                let r = self.get_rectangle(Some(fm), Some(fd), Some(f));
                if !on_dir_side(rect, r, dir, tightness) {
                    continue;
                }
                let fd_dist = boundary_distance(rect, r, dir);
                let fr = self.history.rank(f);
                let better = match best {
                    Some((bd, br, _)) => fd_dist < bd || (fd_dist == bd && fr < br),
                    None => true,
                };
                if better {
                    best = Some((fd_dist, fr, (fm, fd, f)));
                }
            }
        }
        best.map(|(_, _, loc)| loc)
    }

    /// Extreme-area leaf across all desktops, skipping vacant ones.
    pub fn find_by_area(&self, peak: AreaPeak) -> Option<(MonitorId, DesktopId, NodeId)> {
        let mut best: Option<(u32, (MonitorId, DesktopId, NodeId))> = None;
        for &m in &self.monitor_order {
            for &d in &self.monitors[m].desktops {
                let Some(root) = self.desktops[d].root else { continue };
                for f in self.forest.leaves(root) {
                    if self.forest[f].vacant {
                        continue;
                    }
                    let f_area = area(self.get_rectangle(Some(m), Some(d), Some(f)));
                    let better = match best {
                        Some((b, _)) => match peak {
                            AreaPeak::Biggest => f_area > b,
                            AreaPeak::Smallest => f_area < b,
                        },
                        None => true,
                    };
                    if better {
                        best = Some((f_area, (m, d, f)));
                    }
                }
            }
        }
        best.map(|(_, loc)| loc)
    }

    /// Next or previous managed leaf in world order, wrapping across
    /// desktops and monitors.
    pub fn closest_node(
        &self,
        m: MonitorId,
        d: DesktopId,
        n: Option<NodeId>,
        dir: CycleDir,
    ) -> Option<(MonitorId, DesktopId, NodeId)> {
        let mut world: Vec<(MonitorId, DesktopId, NodeId)> = Vec::new();
        let mut ref_pos: Option<usize> = None;
        let mut desk_start: Option<usize> = None;

        for &fm in &self.monitor_order {
            for &fd in &self.monitors[fm].desktops {
                if fd == d && desk_start.is_none() {
                    desk_start = Some(world.len());
                }
                let Some(root) = self.desktops[fd].root else { continue };
                for f in self.forest.leaves(root) {
                    if Some(f) == n {
                        ref_pos = Some(world.len());
                    }
                    world.push((fm, fd, f));
                }
            }
        }
        if world.is_empty() {
            return None;
        }

        let start = ref_pos.or(desk_start).unwrap_or(0);
        let len = world.len();
        for step in 1..=len {
            let idx = match dir {
                CycleDir::Next => (start + step) % len,
                CycleDir::Prev => (start + len - step % len) % len,
            };
            let (fm, fd, f) = world[idx];
            if Some(f) == n {
                break;
            }
            let node = &self.forest[f];
            if node.client.is_some() && !node.hidden {
                return Some((fm, fd, f));
            }
        }
        None
    }

    /// Leaf whose computed rectangle contains the point, on the active
    /// desktop of the monitor under the point.
    pub fn node_from_point(&self, p: crate::geometry::Point) -> Option<(MonitorId, DesktopId, NodeId)> {
        let m = self.monitor_from_point(p)?;
        let d = self.monitors[m].desk?;
        let root = self.desktops[d].root?;
        for f in self.forest.leaves(root) {
            let node = &self.forest[f];
            if node.client.is_none() || node.hidden {
                continue;
            }
            let r: Rect = self.get_rectangle(Some(m), Some(d), Some(f));
            if crate::geometry::is_inside(p, r) {
                return Some((m, d, f));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::AreaPeak;
    use crate::engine::test_support::{managed, single_monitor};
    use crate::geometry::{CycleDir, Direction, Rect};

    fn rect() -> Rect { Rect::new(0, 0, 1000, 1000) }

    #[test]
    fn nearest_neighbor_follows_the_direction() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);

        let east = engine.find_nearest_neighbor(m, d, a, Direction::East);
        assert_eq!(east, Some((m, d, b)));
        let west = engine.find_nearest_neighbor(m, d, b, Direction::West);
        assert_eq!(west, Some((m, d, a)));
        assert_eq!(engine.find_nearest_neighbor(m, d, a, Direction::West), None);
    }

    #[test]
    fn neighbor_ties_break_by_focus_recency() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let c = managed(&mut engine, m, d);
        // B and C stack on the east half; both touch A's east edge.
        engine.focus_node(Some(m), Some(d), Some(c));
        engine.focus_node(Some(m), Some(d), Some(a));

        let east = engine.find_nearest_neighbor(m, d, a, Direction::East).unwrap();
        assert_eq!(east.2, c);
        let _ = b;
    }

    #[test]
    fn closest_node_cycles_across_desktops() {
        let (mut engine, m, d1) = single_monitor(rect());
        let d2 = engine.add_desktop(m, "two");
        let a = managed(&mut engine, m, d1);
        let b = managed(&mut engine, m, d1);
        let c = managed(&mut engine, m, d2);

        assert_eq!(engine.closest_node(m, d1, Some(a), CycleDir::Next), Some((m, d1, b)));
        assert_eq!(engine.closest_node(m, d1, Some(b), CycleDir::Next), Some((m, d2, c)));
        assert_eq!(engine.closest_node(m, d2, Some(c), CycleDir::Next), Some((m, d1, a)));
        assert_eq!(engine.closest_node(m, d1, Some(a), CycleDir::Prev), Some((m, d2, c)));
    }

    #[test]
    fn find_by_area_picks_the_extremes() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let c = managed(&mut engine, m, d);
        // A keeps the west half; B and C share the east half.
        let biggest = engine.find_by_area(AreaPeak::Biggest).unwrap();
        assert_eq!(biggest.2, a);
        let smallest = engine.find_by_area(AreaPeak::Smallest).unwrap();
        assert!(smallest.2 == b || smallest.2 == c);
    }

    #[test]
    fn node_from_point_hits_the_covering_leaf() {
        let (mut engine, m, d) = single_monitor(rect());
        let a = managed(&mut engine, m, d);
        let b = managed(&mut engine, m, d);
        let pa = engine.node_from_point(crate::geometry::Point { x: 10, y: 500 });
        assert_eq!(pa, Some((m, d, a)));
        let pb = engine.node_from_point(crate::geometry::Point { x: 900, y: 500 });
        assert_eq!(pb, Some((m, d, b)));
    }
}
