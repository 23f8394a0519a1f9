//! Minimal feature geometry for Reviewer geometry tables.
//!
//! Geometry I/O and projection belong to the store. This module only covers
//! what the export needs to turn line and polygon findings into points:
//! explode multi-part shapes, repair them, derive an interior point per part,
//! and dissolve the points back together per link id.
//!
//! The serialized form mirrors GeoJSON geometry objects, so point output can
//! be written without a conversion step.

use serde::{Deserialize, Serialize};

use crate::core::value::Identifier;

/// A 2D coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from(c: [f64; 2]) -> Self {
        Point::new(c[0], c[1])
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Feature geometry.
///
/// Polygon rings follow the orientation of the first ring: rings with the
/// same winding start a new part, rings with the opposite winding are holes
/// of the part before them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Point),
    MultiPoint(Vec<Point>),
    #[serde(rename = "MultiLineString")]
    Polyline(Vec<Vec<Point>>),
    Polygon(Vec<Vec<Point>>),
}

impl Geometry {
    /// Geometry type name.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::Polyline(_) => "Polyline",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    /// Number of parts.
    pub fn part_count(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::MultiPoint(points) => points.len(),
            Geometry::Polyline(paths) => paths.len(),
            Geometry::Polygon(rings) => polygon_parts(rings).len(),
        }
    }

    /// Split a multi-part geometry into single-part geometries.
    pub fn explode(&self) -> Vec<Geometry> {
        match self {
            Geometry::Point(_) => vec![self.clone()],
            Geometry::MultiPoint(points) => points.iter().map(|p| Geometry::Point(*p)).collect(),
            Geometry::Polyline(paths) => paths
                .iter()
                .map(|path| Geometry::Polyline(vec![path.clone()]))
                .collect(),
            Geometry::Polygon(rings) => polygon_parts(rings)
                .into_iter()
                .map(Geometry::Polygon)
                .collect(),
        }
    }

    /// Drop non-finite and repeated vertices, close open rings, and remove
    /// degenerate parts. Returns `None` when nothing usable is left.
    pub fn repair(&self) -> Option<Geometry> {
        match self {
            Geometry::Point(p) => p.is_finite().then_some(self.clone()),
            Geometry::MultiPoint(points) => {
                let kept: Vec<Point> = points.iter().copied().filter(Point::is_finite).collect();
                (!kept.is_empty()).then_some(Geometry::MultiPoint(kept))
            }
            Geometry::Polyline(paths) => {
                let kept: Vec<Vec<Point>> = paths
                    .iter()
                    .map(|p| dedup_vertices(p))
                    .filter(|p| p.len() >= 2)
                    .collect();
                (!kept.is_empty()).then_some(Geometry::Polyline(kept))
            }
            Geometry::Polygon(rings) => {
                let kept: Vec<Vec<Point>> = rings
                    .iter()
                    .map(|r| close_ring(dedup_vertices(r)))
                    .filter(|r| r.len() >= 4 && signed_area(r).abs() > f64::EPSILON)
                    .collect();
                (!kept.is_empty()).then_some(Geometry::Polygon(kept))
            }
        }
    }

    /// A representative point that lies on or inside the geometry.
    ///
    /// Lines use the point halfway along their longest path. Polygons use the
    /// area centroid of the largest part when it falls inside; otherwise the
    /// middle of the widest interior span on a horizontal line through it.
    pub fn interior_point(&self) -> Option<Point> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::MultiPoint(points) => points.first().copied(),
            Geometry::Polyline(paths) => paths
                .iter()
                .filter(|p| p.len() >= 2)
                .max_by(|a, b| path_length(a).total_cmp(&path_length(b)))
                .and_then(|p| point_along(p, path_length(p) / 2.0)),
            Geometry::Polygon(rings) => polygon_parts(rings)
                .into_iter()
                .max_by(|a, b| part_area(a).total_cmp(&part_area(b)))
                .and_then(|part| polygon_interior_point(&part)),
        }
    }
}

fn dedup_vertices(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points.iter().filter(|p| p.is_finite()) {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    out
}

fn close_ring(mut ring: Vec<Point>) -> Vec<Point> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

/// Shoelace signed area of a ring (closed or not).
fn signed_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Group rings into parts: outer ring followed by its holes.
fn polygon_parts(rings: &[Vec<Point>]) -> Vec<Vec<Vec<Point>>> {
    let mut parts: Vec<Vec<Vec<Point>>> = Vec::new();
    let outer_sign = rings
        .iter()
        .map(|r| signed_area(r))
        .find(|a| *a != 0.0)
        .map(f64::signum)
        .unwrap_or(1.0);
    for ring in rings {
        let sign = signed_area(ring).signum();
        match parts.last_mut() {
            Some(part) if sign != outer_sign => part.push(ring.clone()),
            _ => parts.push(vec![ring.clone()]),
        }
    }
    parts
}

fn part_area(part: &[Vec<Point>]) -> f64 {
    let mut rings = part.iter();
    let outer = rings.next().map(|r| signed_area(r).abs()).unwrap_or(0.0);
    outer - rings.map(|r| signed_area(r).abs()).sum::<f64>()
}

fn path_length(path: &[Point]) -> f64 {
    path.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

fn point_along(path: &[Point], distance: f64) -> Option<Point> {
    let mut remaining = distance;
    for w in path.windows(2) {
        let seg = w[0].distance(&w[1]);
        if seg > 0.0 && remaining <= seg {
            let t = remaining / seg;
            return Some(Point::new(
                w[0].x + (w[1].x - w[0].x) * t,
                w[0].y + (w[1].y - w[0].y) * t,
            ));
        }
        remaining -= seg;
    }
    path.last().copied()
}

fn ring_centroid(ring: &[Point]) -> Option<(Point, f64)> {
    let area = signed_area(ring);
    if area == 0.0 {
        return None;
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    Some((Point::new(cx / (6.0 * area), cy / (6.0 * area)), area.abs()))
}

fn ring_contains(ring: &[Point], p: &Point) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn part_contains(part: &[Vec<Point>], p: &Point) -> bool {
    let mut rings = part.iter();
    match rings.next() {
        Some(outer) if ring_contains(outer, p) => rings.all(|hole| !ring_contains(hole, p)),
        _ => false,
    }
}

fn polygon_interior_point(part: &[Vec<Point>]) -> Option<Point> {
    let outer = part.first()?;
    let (mut centroid, outer_area) = ring_centroid(outer)?;

    // Subtract holes from the area-weighted centroid.
    let mut area = outer_area;
    let (mut sx, mut sy) = (centroid.x * outer_area, centroid.y * outer_area);
    for hole in &part[1..] {
        if let Some((c, a)) = ring_centroid(hole) {
            sx -= c.x * a;
            sy -= c.y * a;
            area -= a;
        }
    }
    if area > 0.0 {
        centroid = Point::new(sx / area, sy / area);
    }

    if part_contains(part, &centroid) {
        return Some(centroid);
    }

    // Scan line through the centroid; take the widest inside span.
    let y = centroid.y;
    let mut xs: Vec<f64> = Vec::new();
    for ring in part {
        for w in ring.windows(2) {
            let (a, b) = (w[0], w[1]);
            if (a.y > y) != (b.y > y) {
                xs.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
    }
    xs.sort_by(f64::total_cmp);
    xs.chunks_exact(2)
        .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])))
        .map(|span| Point::new((span[0] + span[1]) / 2.0, y))
}

/// Dissolve points by link id: one geometry per link, in first-seen order.
/// A single point stays a `Point`; several become a `MultiPoint`.
pub fn aggregate_by_link(points: Vec<(Identifier, Point)>) -> Vec<(Identifier, Geometry)> {
    let mut order: Vec<Identifier> = Vec::new();
    let mut grouped: std::collections::HashMap<Identifier, Vec<Point>> =
        std::collections::HashMap::new();
    for (link, point) in points {
        grouped
            .entry(link.clone())
            .or_insert_with(|| {
                order.push(link);
                Vec::new()
            })
            .push(point);
    }
    order
        .into_iter()
        .filter_map(|link| {
            let pts = grouped.remove(&link)?;
            let geometry = if pts.len() == 1 {
                Geometry::Point(pts[0])
            } else {
                Geometry::MultiPoint(pts)
            };
            Some((link, geometry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x0, y0 + size),
            Point::new(x0 + size, y0 + size),
            Point::new(x0 + size, y0),
            Point::new(x0, y0),
        ]
    }

    #[test]
    fn test_explode_polyline() {
        let g = Geometry::Polyline(vec![
            vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
            vec![Point::new(5.0, 5.0), Point::new(6.0, 5.0)],
        ]);
        let parts = g.explode();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.part_count() == 1));
    }

    #[test]
    fn test_explode_polygon_keeps_holes_with_their_outer_ring() {
        let mut hole = square(1.0, 1.0, 1.0);
        hole.reverse();
        let g = Geometry::Polygon(vec![square(0.0, 0.0, 4.0), hole, square(10.0, 10.0, 2.0)]);
        let parts = g.explode();
        assert_eq!(parts.len(), 2);
        match &parts[0] {
            Geometry::Polygon(rings) => assert_eq!(rings.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_repair_drops_degenerate_parts() {
        let g = Geometry::Polyline(vec![
            vec![Point::new(0.0, 0.0), Point::new(0.0, 0.0)],
            vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(2.0, 0.0)],
        ]);
        let repaired = g.repair().unwrap();
        assert_eq!(
            repaired,
            Geometry::Polyline(vec![vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0)]])
        );

        let open_ring = Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
        ]]);
        match open_ring.repair().unwrap() {
            Geometry::Polygon(rings) => assert_eq!(rings[0].len(), 4),
            other => panic!("unexpected {:?}", other),
        }

        let flat = Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
        ]]);
        assert!(flat.repair().is_none());
        assert!(Geometry::Point(Point::new(f64::NAN, 0.0)).repair().is_none());
    }

    #[test]
    fn test_line_interior_point_is_midpoint_along_length() {
        let g = Geometry::Polyline(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
        ]]);
        assert_eq!(g.interior_point(), Some(Point::new(4.0, 0.0)));
    }

    #[test]
    fn test_square_interior_point_is_centroid() {
        let g = Geometry::Polygon(vec![square(0.0, 0.0, 2.0)]);
        let p = g.interior_point().unwrap();
        assert!((p.x - 1.0).abs() < 1e-9 && (p.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_concave_polygon_interior_point_is_inside() {
        // U shape: centroid falls in the notch.
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 3.0),
            Point::new(1.0, 3.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 1.0),
            Point::new(2.0, 3.0),
            Point::new(3.0, 3.0),
            Point::new(3.0, 0.0),
            Point::new(0.0, 0.0),
        ];
        let part = vec![ring.clone()];
        let p = Geometry::Polygon(vec![ring]).interior_point().unwrap();
        assert!(part_contains(&part, &p), "{:?} not inside", p);
    }

    #[test]
    fn test_aggregate_by_link() {
        let a = Identifier::Int(1);
        let b = Identifier::Int(2);
        let out = aggregate_by_link(vec![
            (a.clone(), Point::new(0.0, 0.0)),
            (b.clone(), Point::new(1.0, 1.0)),
            (a.clone(), Point::new(2.0, 2.0)),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, a);
        assert_eq!(
            out[0].1,
            Geometry::MultiPoint(vec![Point::new(0.0, 0.0), Point::new(2.0, 2.0)])
        );
        assert_eq!(out[1].1, Geometry::Point(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_serializes_like_geojson() {
        let g = Geometry::Point(Point::new(1.5, 2.0));
        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Point", "coordinates": [1.5, 2.0]}));
        let back: Geometry = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
    }
}
