//! Scenario coverage for the movement core: the path a request produces and
//! the tick sequence that consumes it.

use protocol::{Point, Realm, RegionData, RegionKind};
use server::cache::walkers::WalkerState;
use server::pathfinding::{search, PathfindingService, WorldGrid};
use server::workers::walker::{advance_count, advance_walker, WalkerAdvance};

fn walker_for(path: Vec<Point>) -> WalkerState {
    WalkerState {
        walker_id: 1,
        user_id: 7,
        positions: path,
        current_index: 0,
        updated_at: 0,
    }
}

#[test]
fn simple_walk_computes_and_completes_in_four_ticks() {
    // Player at (100,100), request (200,100), step 32: 100→132→164→196→200.
    let grid = WorldGrid::default();
    let path = search(&grid, Point::new(100, 100), Point::new(200, 100), Realm::A)
        .expect("open ground must be reachable");

    assert_eq!(path.len(), 5);
    assert_eq!(path[0], Point::new(100, 100));
    assert_eq!(path[4], Point::new(200, 100));

    let mut walker = walker_for(path.clone());
    let mut steps = 0;
    let mut completed = 0;

    loop {
        match advance_walker(&mut walker, advance_count(1.0)) {
            WalkerAdvance::Stepped => steps += 1,
            WalkerAdvance::Completed => {
                completed += 1;
                break;
            }
        }
    }

    // Three intermediate steps, one completion, final position exact.
    assert_eq!(steps, 3);
    assert_eq!(completed, 1);
    assert_eq!(walker.current_position(), *path.last().unwrap());
}

#[test]
fn walker_index_bounds_hold_for_any_tick_count() {
    let grid = WorldGrid::default();
    let path = search(&grid, Point::new(0, 0), Point::new(640, 640), Realm::B)
        .expect("diagonal walk must be reachable");

    let mut walker = walker_for(path);
    for _ in 0..1_000 {
        advance_walker(&mut walker, 1);
        assert!(walker.current_index < walker.positions.len());
    }
    assert!(walker.is_finished());
}

#[test]
fn interruption_point_is_the_partially_walked_position() {
    // Two ticks into a walk, the position handed to the replacement walker
    // is the waypoint reached so far, not the original goal.
    let grid = WorldGrid::default();
    let path = search(&grid, Point::new(100, 100), Point::new(500, 500), Realm::A)
        .expect("open ground must be reachable");

    let mut walker = walker_for(path.clone());
    advance_walker(&mut walker, 1);
    advance_walker(&mut walker, 1);

    let interruption_point = walker.current_position();
    assert_eq!(interruption_point, path[2]);
    assert_ne!(interruption_point, *path.last().unwrap());

    // The second request starts a fresh path from that point.
    let second = search(&grid, interruption_point, Point::new(300, 300), Realm::A)
        .expect("second path must be reachable");
    assert_eq!(second[0], interruption_point);
    assert_eq!(*second.last().unwrap(), Point::new(300, 300));
}

#[tokio::test]
async fn realm_restricted_ground_is_unreachable_for_outsiders() {
    let regions = vec![RegionData {
        region_id: 1,
        name: "home territory".to_string(),
        kind: RegionKind::Realm,
        realm: Some(Realm::C),
        points: vec![
            Point::new(1000, 1000),
            Point::new(2000, 1000),
            Point::new(2000, 2000),
            Point::new(1000, 2000),
        ],
    }];
    let service = PathfindingService::new(WorldGrid::from_regions(&regions));

    assert!(service.can_walk(Point::new(1500, 1500), Realm::C));
    assert!(!service.can_walk(Point::new(1500, 1500), Realm::A));

    let insider = service
        .find_path(Point::new(1100, 1100), Point::new(1500, 1500), Realm::C)
        .await;
    assert!(insider.is_ok());

    let outsider = service
        .find_path(Point::new(100, 1500), Point::new(1500, 1500), Realm::A)
        .await;
    assert!(outsider.is_err());
}

#[test]
fn walk_speed_buff_shortens_the_walk() {
    let grid = WorldGrid::default();
    let path = search(&grid, Point::new(0, 0), Point::new(320, 0), Realm::A)
        .expect("open ground must be reachable");
    let length = path.len();

    let mut slow = walker_for(path.clone());
    let mut slow_ticks = 0;
    while advance_walker(&mut slow, advance_count(1.0)) == WalkerAdvance::Stepped {
        slow_ticks += 1;
    }

    let mut fast = walker_for(path);
    let mut fast_ticks = 0;
    while advance_walker(&mut fast, advance_count(2.0)) == WalkerAdvance::Stepped {
        fast_ticks += 1;
    }

    assert_eq!(slow_ticks + 1, length - 1);
    assert!(fast_ticks < slow_ticks);
    // Both still finish exactly on the last waypoint.
    assert_eq!(slow.current_index, length - 1);
    assert_eq!(fast.current_index, length - 1);
}
