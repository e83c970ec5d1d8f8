//! Grid pathfinding over the 6144x6144 world.
//!
//! The search runs on a lattice anchored at the requested start point and
//! quantized to [`GRID_STEP`] units, so the first waypoint is the exact
//! start and intermediate waypoints advance one step per walker tick. The
//! final waypoint is the exact goal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use tokio::sync::Semaphore;

use protocol::{Point, Realm, RegionData, RegionKind, GRID_STEP, WORLD_SIZE};

use crate::error::{GameServerError, Result};
use crate::geometry::polygons_contain;

/// Upper bound on explored lattice cells before a search is abandoned.
const MAX_NODES: usize = 65_536;

/// Ring radius searched when snapping a walled-in start to free ground.
const MAX_SNAP_RADIUS: i32 = 8;

const LRU_CAPACITY: usize = 1024;
const MAX_CONCURRENT_SEARCHES: usize = 4;

/// Impassability datasets, rebuilt wholesale on any editor change.
#[derive(Debug, Clone, Default)]
pub struct WorldGrid {
    /// Wall and water polygons; impassable for everyone.
    blocked: Vec<Vec<Point>>,
    /// Realm-restricted region polygons.
    realm_regions: Vec<(Realm, Vec<Point>)>,
}

impl WorldGrid {
    pub fn from_regions(regions: &[RegionData]) -> Self {
        let mut blocked = Vec::new();
        let mut realm_regions = Vec::new();

        for region in regions {
            match region.kind {
                RegionKind::Wall | RegionKind::Water => blocked.push(region.points.clone()),
                RegionKind::Realm => {
                    if let Some(realm) = region.realm {
                        realm_regions.push((realm, region.points.clone()));
                    }
                }
            }
        }

        Self {
            blocked,
            realm_regions,
        }
    }

    /// Whether a player of `realm` may stand on this point.
    pub fn is_walkable(&self, p: Point, realm: Realm) -> bool {
        if p.x < 0 || p.y < 0 || p.x > WORLD_SIZE || p.y > WORLD_SIZE {
            return false;
        }

        if polygons_contain(p, &self.blocked) {
            return false;
        }

        !self
            .realm_regions
            .iter()
            .any(|(owner, poly)| *owner != realm && crate::geometry::point_in_polygon(p, poly))
    }
}

type PathKey = (Point, Point, Realm);

#[derive(Clone)]
pub struct PathfindingService {
    grid: Arc<RwLock<Arc<WorldGrid>>>,
    cache: Arc<Mutex<LruCache<PathKey, Option<Vec<Point>>>>>,
    permits: Arc<Semaphore>,
}

impl PathfindingService {
    pub fn new(grid: WorldGrid) -> Self {
        Self {
            grid: Arc::new(RwLock::new(Arc::new(grid))),
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(LRU_CAPACITY).expect("nonzero LRU capacity"),
            ))),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_SEARCHES)),
        }
    }

    /// Swaps in new editor datasets and drops every cached path.
    pub fn replace_regions(&self, regions: &[RegionData]) {
        let grid = WorldGrid::from_regions(regions);
        if let Ok(mut slot) = self.grid.write() {
            *slot = Arc::new(grid);
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn grid_snapshot(&self) -> Arc<WorldGrid> {
        self.grid
            .read()
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }

    /// Walk-permission check for a click destination.
    pub fn can_walk(&self, p: Point, realm: Realm) -> bool {
        self.grid_snapshot().is_walkable(p, realm)
    }

    /// Computes the waypoint list, or `Unreachable`. CPU-bound work runs on
    /// the blocking pool behind a small semaphore so a burst of requests
    /// cannot starve the tick workers.
    pub async fn find_path(&self, start: Point, goal: Point, realm: Realm) -> Result<Vec<Point>> {
        let key = (start, goal, realm);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return cached.clone().ok_or(GameServerError::Unreachable);
            }
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GameServerError::Internal("pathfinding pool closed".to_string()))?;

        let grid = self.grid_snapshot();
        let found = tokio::task::spawn_blocking(move || search(&grid, start, goal, realm))
            .await
            .map_err(|err| GameServerError::Internal(format!("pathfinding task: {err}")))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, found.clone());
        }

        found.ok_or(GameServerError::Unreachable)
    }
}

/// Dijkstra over the 8-connected, start-anchored lattice. Cardinal moves
/// cost 2 and diagonals 3, so straight walks beat zig-zags; remaining ties
/// break by insertion order for determinism.
pub fn search(grid: &WorldGrid, start: Point, goal: Point, realm: Realm) -> Option<Vec<Point>> {
    if !grid.is_walkable(goal, realm) {
        return None;
    }

    if start == goal {
        return Some(vec![start]);
    }

    let anchor = snap_to_walkable(grid, start, realm)?;
    if anchor == goal {
        return Some(vec![anchor]);
    }

    let lattice = |cell: (i32, i32)| -> Point {
        Point::new(anchor.x + cell.0 * GRID_STEP, anchor.y + cell.1 * GRID_STEP)
    };

    let target_cell = goal_cell(grid, anchor, goal, realm)?;
    if target_cell == (0, 0) {
        // Goal is within one step of the (possibly snapped) start.
        return Some(vec![anchor, goal]);
    }

    let mut dist: HashMap<(i32, i32), u32> = HashMap::new();
    let mut prev: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(u32, u64, (i32, i32))>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    dist.insert((0, 0), 0);
    heap.push(Reverse((0, seq, (0, 0))));

    let mut reached = false;
    while let Some(Reverse((cost, _, cell))) = heap.pop() {
        if cell == target_cell {
            reached = true;
            break;
        }

        if dist.get(&cell).copied().unwrap_or(u32::MAX) < cost {
            continue;
        }

        if dist.len() > MAX_NODES {
            return None;
        }

        for dj in -1..=1 {
            for di in -1..=1 {
                if di == 0 && dj == 0 {
                    continue;
                }

                let next = (cell.0 + di, cell.1 + dj);
                if !grid.is_walkable(lattice(next), realm) {
                    continue;
                }

                let move_cost = if di != 0 && dj != 0 { 3 } else { 2 };
                let next_cost = cost + move_cost;
                if next_cost < dist.get(&next).copied().unwrap_or(u32::MAX) {
                    dist.insert(next, next_cost);
                    prev.insert(next, cell);
                    seq += 1;
                    heap.push(Reverse((next_cost, seq, next)));
                }
            }
        }
    }

    if !reached {
        return None;
    }

    let mut cells = vec![target_cell];
    let mut cursor = target_cell;
    while let Some(parent) = prev.get(&cursor) {
        cells.push(*parent);
        cursor = *parent;
    }
    cells.reverse();

    let mut path: Vec<Point> = cells.into_iter().map(lattice).collect();
    // The final lattice point is within one step of the goal; finish the
    // walk by landing exactly on it.
    if path.last() != Some(&goal) {
        path.push(goal);
    }

    Some(path)
}

/// Nearest walkable lattice-aligned point to `start`, searching outward in
/// rings. Needed when an editor change walls in a standing player.
fn snap_to_walkable(grid: &WorldGrid, start: Point, realm: Realm) -> Option<Point> {
    if grid.is_walkable(start, realm) {
        return Some(start);
    }

    for radius in 1..=MAX_SNAP_RADIUS {
        for dj in -radius..=radius {
            for di in -radius..=radius {
                if di.abs() != radius && dj.abs() != radius {
                    continue;
                }

                let candidate =
                    Point::new(start.x + di * GRID_STEP, start.y + dj * GRID_STEP);
                if grid.is_walkable(candidate, realm) {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

/// Lattice cell standing in for the goal: the offset truncated toward the
/// anchor (so the exact goal is appended after it, never overshot), or a
/// walkable cell adjacent to it that still lands within reach of the goal.
fn goal_cell(grid: &WorldGrid, anchor: Point, goal: Point, realm: Realm) -> Option<(i32, i32)> {
    let di = (goal.x - anchor.x) / GRID_STEP;
    let dj = (goal.y - anchor.y) / GRID_STEP;

    let mut candidates = vec![(di, dj)];
    for (ox, oy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
        candidates.push((di + ox, dj + oy));
    }

    candidates.into_iter().find(|cell| {
        let p = Point::new(anchor.x + cell.0 * GRID_STEP, anchor.y + cell.1 * GRID_STEP);
        grid.is_walkable(p, realm)
            && crate::geometry::distance(p, goal) <= (GRID_STEP * 2) as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid() -> WorldGrid {
        WorldGrid::default()
    }

    fn wall(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    #[test]
    fn straight_walk_east_lands_on_exact_goal() {
        let grid = open_grid();
        let path = search(&grid, Point::new(100, 100), Point::new(200, 100), Realm::A)
            .expect("path must exist");

        assert_eq!(
            path,
            vec![
                Point::new(100, 100),
                Point::new(132, 100),
                Point::new(164, 100),
                Point::new(196, 100),
                Point::new(200, 100),
            ]
        );
    }

    #[test]
    fn goal_equals_start_returns_single_waypoint() {
        let grid = open_grid();
        let path = search(&grid, Point::new(50, 50), Point::new(50, 50), Realm::B)
            .expect("path must exist");
        assert_eq!(path, vec![Point::new(50, 50)]);
    }

    #[test]
    fn goal_inside_wall_is_unreachable() {
        let mut grid = open_grid();
        grid.blocked.push(wall(500, 500, 700, 700));

        assert!(search(&grid, Point::new(100, 100), Point::new(600, 600), Realm::A).is_none());
    }

    #[test]
    fn path_routes_around_wall() {
        let mut grid = open_grid();
        // A vertical bar between start and goal, with room above.
        grid.blocked.push(wall(300, 0, 340, 600));

        let start = Point::new(100, 300);
        let goal = Point::new(600, 300);
        let path = search(&grid, start, goal, Realm::A).expect("path must exist");

        assert_eq!(*path.first().unwrap(), start);
        assert_eq!(*path.last().unwrap(), goal);
        for p in &path {
            assert!(grid.is_walkable(*p, Realm::A), "waypoint {p:?} blocked");
        }
        // The detour is strictly longer than the straight-line hop count.
        assert!(path.len() > 6);
    }

    #[test]
    fn realm_region_blocks_other_realms_only() {
        let mut grid = open_grid();
        grid.realm_regions
            .push((Realm::A, wall(0, 0, 1000, 1000)));

        assert!(grid.is_walkable(Point::new(500, 500), Realm::A));
        assert!(!grid.is_walkable(Point::new(500, 500), Realm::B));

        assert!(search(&grid, Point::new(100, 100), Point::new(200, 100), Realm::A).is_some());
        assert!(search(&grid, Point::new(100, 100), Point::new(200, 100), Realm::B).is_none());
    }

    #[test]
    fn start_inside_wall_snaps_to_free_cell() {
        let mut grid = open_grid();
        grid.blocked.push(wall(90, 90, 110, 110));

        let path = search(&grid, Point::new(100, 100), Point::new(300, 100), Realm::A)
            .expect("path must exist");

        let first = *path.first().unwrap();
        assert!(grid.is_walkable(first, Realm::A));
        assert_eq!(*path.last().unwrap(), Point::new(300, 100));
    }

    #[test]
    fn out_of_bounds_is_never_walkable() {
        let grid = open_grid();
        assert!(!grid.is_walkable(Point::new(-1, 0), Realm::A));
        assert!(!grid.is_walkable(Point::new(0, WORLD_SIZE + 1), Realm::A));
        assert!(grid.is_walkable(Point::new(0, 0), Realm::A));
    }

    #[tokio::test]
    async fn service_caches_paths_and_surfaces_unreachable() {
        let mut grid = open_grid();
        grid.blocked.push(wall(500, 500, 700, 700));
        let service = PathfindingService::new(grid);

        let path = service
            .find_path(Point::new(0, 0), Point::new(64, 0), Realm::A)
            .await
            .expect("path must exist");
        assert_eq!(path.len(), 3);

        // Second request is answered from the LRU.
        let cached = service
            .find_path(Point::new(0, 0), Point::new(64, 0), Realm::A)
            .await
            .expect("cached path");
        assert_eq!(cached, path);

        let blocked = service
            .find_path(Point::new(0, 0), Point::new(600, 600), Realm::A)
            .await;
        assert!(matches!(blocked, Err(GameServerError::Unreachable)));
    }

    #[tokio::test]
    async fn editor_change_invalidates_cached_paths() {
        let service = PathfindingService::new(open_grid());

        let open = service
            .find_path(Point::new(100, 300), Point::new(600, 300), Realm::A)
            .await
            .expect("open path");
        assert_eq!(open.len(), 17);

        service.replace_regions(&[RegionData {
            region_id: 1,
            name: "new wall".to_string(),
            kind: RegionKind::Wall,
            realm: None,
            points: wall(300, 0, 340, 600),
        }]);

        let rerouted = service
            .find_path(Point::new(100, 300), Point::new(600, 300), Realm::A)
            .await
            .expect("rerouted path");
        assert!(rerouted.len() > open.len());
    }
}
