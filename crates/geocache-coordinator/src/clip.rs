//! Hand-rolled Sutherland-Hodgman clip used to shrink a cell's boundary down
//! to its intersection with the caller's footprint before handing it to the
//! upstream fetch (spec.md §4.H step 4): upstream is never asked to search
//! a whole hex when the caller only wanted a sliver of it.

type Point = (f64, f64);

fn cross(a: Point, b: Point, p: Point) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn signed_area(ring: &[Point]) -> f64 {
    let mut area = 0.0;
    for window in ring.windows(2) {
        let (x1, y1) = window[0];
        let (x2, y2) = window[1];
        area += x1 * y2 - x2 * y1;
    }
    area / 2.0
}

/// Forces a closed ring counterclockwise, so `cross(a, b, p) >= 0` always
/// means "p is on the interior side of edge a->b" regardless of how the
/// caller wound their polygon.
fn ensure_ccw(mut ring: Vec<Point>) -> Vec<Point> {
    if signed_area(&ring) < 0.0 {
        ring.reverse();
    }
    ring
}

fn segment_intersection(p1: Point, p2: Point, a: Point, b: Point) -> Option<Point> {
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    let (x3, y3) = a;
    let (x4, y4) = b;
    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-15 {
        return None;
    }
    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    Some((x1 + t * (x2 - x1), y1 + t * (y2 - y1)))
}

/// Clips `subject` (an arbitrary closed ring) against `clip` (a convex
/// closed ring), via Sutherland-Hodgman. Returns an empty ring when the
/// intersection is empty or degenerate.
pub fn clip_convex(subject: &[Point], clip: &[Point]) -> Vec<Point> {
    if subject.len() < 3 || clip.len() < 3 {
        return Vec::new();
    }
    let clip = ensure_ccw(clip.to_vec());
    let edges = if clip.first() == clip.last() { clip.len() - 1 } else { clip.len() };

    let mut output: Vec<Point> = subject.to_vec();
    for i in 0..edges {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % edges];
        let input = output;
        output = Vec::with_capacity(input.len() + 1);
        for j in 0..input.len() {
            let current = input[j];
            let prev = input[if j == 0 { input.len() - 1 } else { j - 1 }];
            let current_inside = cross(a, b, current) >= 0.0;
            let prev_inside = cross(a, b, prev) >= 0.0;
            if current_inside {
                if !prev_inside {
                    if let Some(p) = segment_intersection(prev, current, a, b) {
                        output.push(p);
                    }
                }
                output.push(current);
            } else if prev_inside {
                if let Some(p) = segment_intersection(prev, current, a, b) {
                    output.push(p);
                }
            }
        }
    }
    if output.len() >= 3 && output.first() != output.last() {
        let first = output[0];
        output.push(first);
    }
    output
}
