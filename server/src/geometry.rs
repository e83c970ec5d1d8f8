//! Pure planar geometry shared by pathfinding, walk-permission checks and
//! territory capture detection.

use protocol::Point;

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Ray-casting point-in-polygon test. Points exactly on an edge count as
/// inside, which is the safe answer for impassability checks.
pub fn point_in_polygon(p: Point, poly: &[Point]) -> bool {
    if poly.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = poly.len() - 1;

    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[j];

        if on_segment(p, a, b) {
            return true;
        }

        let crosses = (a.y > p.y) != (b.y > p.y);
        if crosses {
            let t = (p.y - a.y) as f64 / (b.y - a.y) as f64;
            let intersect_x = a.x as f64 + t * (b.x - a.x) as f64;
            if (p.x as f64) < intersect_x {
                inside = !inside;
            }
        }

        j = i;
    }

    inside
}

/// True when any polygon in the set contains the point.
pub fn polygons_contain(p: Point, polys: &[Vec<Point>]) -> bool {
    polys.iter().any(|poly| point_in_polygon(p, poly))
}

/// True when segment `a-b` crosses any edge of the polygon, or either
/// endpoint lies inside it.
pub fn segment_intersects_polygon(a: Point, b: Point, poly: &[Point]) -> bool {
    if poly.len() < 2 {
        return false;
    }

    if point_in_polygon(a, poly) || point_in_polygon(b, poly) {
        return true;
    }

    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        if segments_intersect(a, b, poly[j], poly[i]) {
            return true;
        }
        j = i;
    }

    false
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    if orientation(a, b, p) != 0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// 0 collinear, 1 clockwise, 2 counter-clockwise.
fn orientation(a: Point, b: Point, c: Point) -> i8 {
    let cross =
        (b.y - a.y) as i64 * (c.x - b.x) as i64 - (b.x - a.x) as i64 * (c.y - b.y) as i64;
    match cross {
        0 => 0,
        c if c > 0 => 1,
        _ => 2,
    }
}

fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && on_segment(q1, p1, p2))
        || (o2 == 0 && on_segment(q2, p1, p2))
        || (o3 == 0 && on_segment(p1, q1, q2))
        || (o4 == 0 && on_segment(p2, q1, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: i32, y0: i32, side: i32) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x0 + side, y0),
            Point::new(x0 + side, y0 + side),
            Point::new(x0, y0 + side),
        ]
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(distance(Point::new(0, 0), Point::new(3, 4)), 5.0);
        assert_eq!(distance(Point::new(7, 7), Point::new(7, 7)), 0.0);
    }

    #[test]
    fn point_inside_square() {
        let poly = square(0, 0, 100);
        assert!(point_in_polygon(Point::new(50, 50), &poly));
        assert!(!point_in_polygon(Point::new(150, 50), &poly));
        assert!(!point_in_polygon(Point::new(-1, 50), &poly));
    }

    #[test]
    fn point_on_edge_counts_as_inside() {
        let poly = square(0, 0, 100);
        assert!(point_in_polygon(Point::new(0, 50), &poly));
        assert!(point_in_polygon(Point::new(100, 100), &poly));
    }

    #[test]
    fn concave_polygon() {
        // A "U" shape: the notch between the arms is outside.
        let poly = vec![
            Point::new(0, 0),
            Point::new(30, 0),
            Point::new(30, 30),
            Point::new(20, 30),
            Point::new(20, 10),
            Point::new(10, 10),
            Point::new(10, 30),
            Point::new(0, 30),
        ];

        assert!(point_in_polygon(Point::new(5, 20), &poly));
        assert!(point_in_polygon(Point::new(25, 20), &poly));
        assert!(!point_in_polygon(Point::new(15, 20), &poly));
    }

    #[test]
    fn polygons_contain_checks_whole_set() {
        let set = vec![square(0, 0, 10), square(100, 100, 10)];
        assert!(polygons_contain(Point::new(5, 5), &set));
        assert!(polygons_contain(Point::new(105, 105), &set));
        assert!(!polygons_contain(Point::new(50, 50), &set));
    }

    #[test]
    fn segment_crossing_polygon_detected() {
        let poly = square(10, 10, 10);
        // Straight through.
        assert!(segment_intersects_polygon(
            Point::new(0, 15),
            Point::new(30, 15),
            &poly
        ));
        // Entirely outside.
        assert!(!segment_intersects_polygon(
            Point::new(0, 0),
            Point::new(5, 0),
            &poly
        ));
        // Endpoint inside.
        assert!(segment_intersects_polygon(
            Point::new(15, 15),
            Point::new(50, 50),
            &poly
        ));
    }

    #[test]
    fn degenerate_polygons_never_contain() {
        assert!(!point_in_polygon(Point::new(0, 0), &[]));
        assert!(!point_in_polygon(
            Point::new(0, 0),
            &[Point::new(0, 0), Point::new(1, 1)]
        ));
    }
}
