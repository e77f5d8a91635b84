use serde::{Deserialize, Serialize};

/// Number of points every finalized stroke is resampled to.
pub const SAMPLE_COUNT: usize = 32;

/// Timestamped pointer sample in root-window coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub time: u64,
}

impl Point {
    pub fn new(x: f64, y: f64, time: u64) -> Self {
        Self { x, y, time }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vector {
    x: f64,
    y: f64,
}

/// Raw samples collected while the trigger button is held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreStroke {
    points: Vec<Point>,
}

impl PreStroke {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64, y: f64, time: u64) {
        self.points.push(Point::new(x, y, time));
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A finalized, normalized stroke.
///
/// Points are resampled to [`SAMPLE_COUNT`] samples spaced evenly along the
/// path, translated so the centroid sits at the origin and scaled so the
/// larger side of the bounding box is 1. A stroke built from fewer than two
/// distinct samples is empty: it carries only its button, which makes it the
/// "hold the trigger and click" gesture for that button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    points: Vec<Point>,
    #[serde(default)]
    button: u32,
}

impl Stroke {
    pub fn new(pre: &PreStroke, button: u32) -> Self {
        Self::from_points(pre.points(), button)
    }

    pub fn from_points(points: &[Point], button: u32) -> Self {
        if points.len() < 2 || track_length(points) == 0.0 {
            return Self::empty(button);
        }
        let resampled = resample_points(points, SAMPLE_COUNT);
        Self {
            points: normalize_points(&resampled),
            button,
        }
    }

    pub fn empty(button: u32) -> Self {
        Self {
            points: Vec::new(),
            button,
        }
    }

    /// Same shape, recorded against a different button.
    pub fn with_button(&self, button: u32) -> Self {
        Self {
            points: self.points.clone(),
            button,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn button(&self) -> u32 {
        self.button
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Similarity in `[0, 1]`; higher is closer and `1.0` means identical.
    ///
    /// Strokes recorded against different buttons score `0.0`. Two empty
    /// strokes are identical; an empty stroke against a drawn one scores
    /// `0.0`.
    pub fn compare(&self, other: &Stroke) -> f64 {
        if self.button != other.button {
            return 0.0;
        }
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return 1.0,
            (false, false) => {}
            _ => return 0.0,
        }
        let cost = dtw_distance(
            &points_to_vectors(&self.points),
            &points_to_vectors(&other.points),
        );
        (1.0 - cost / 2.0).clamp(0.0, 1.0)
    }
}

pub fn track_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|pair| distance(pair[0], pair[1]))
        .sum()
}

fn resample_points(points: &[Point], sample_count: usize) -> Vec<Point> {
    let total_length = track_length(points);
    if total_length == 0.0 {
        return vec![points[0]; sample_count];
    }

    let spacing = total_length / (sample_count as f64 - 1.0);
    let mut resampled = Vec::with_capacity(sample_count);
    resampled.push(points[0]);

    let mut accumulated = 0.0;
    let mut segment_start = points[0];
    for &point in &points[1..] {
        let mut segment_length = distance(segment_start, point);
        while accumulated + segment_length >= spacing && resampled.len() < sample_count {
            let t = (spacing - accumulated) / segment_length;
            let new_point = lerp(segment_start, point, t);
            resampled.push(new_point);
            segment_start = new_point;
            segment_length = distance(segment_start, point);
            accumulated = 0.0;
        }
        accumulated += segment_length;
        segment_start = point;
    }

    let last = points[points.len() - 1];
    while resampled.len() < sample_count {
        resampled.push(last);
    }
    resampled.truncate(sample_count);
    resampled
}

fn normalize_points(points: &[Point]) -> Vec<Point> {
    let count = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / count;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / count;

    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    let scale = (max_x - min_x).max(max_y - min_y);
    let scale = if scale > 0.0 { scale } else { 1.0 };

    points
        .iter()
        .map(|p| Point::new((p.x - cx) / scale, (p.y - cy) / scale, p.time))
        .collect()
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    let time = a.time as f64 + (b.time as f64 - a.time as f64) * t;
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t, time.round() as u64)
}

fn points_to_vectors(points: &[Point]) -> Vec<Vector> {
    points
        .windows(2)
        .map(|pair| {
            normalize_vector(Vector {
                x: pair[1].x - pair[0].x,
                y: pair[1].y - pair[0].y,
            })
        })
        .collect()
}

fn normalize_vector(vector: Vector) -> Vector {
    let length = (vector.x * vector.x + vector.y * vector.y).sqrt();
    if length == 0.0 {
        return Vector { x: 0.0, y: 0.0 };
    }
    Vector {
        x: vector.x / length,
        y: vector.y / length,
    }
}

fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

fn vector_distance(a: Vector, b: Vector) -> f64 {
    if a == b {
        return 0.0;
    }
    let dot = (a.x * b.x + a.y * b.y).clamp(-1.0, 1.0);
    1.0 - dot
}

/// DTW distance between two direction sequences.
///
/// Normalization formula:
/// `normalized = total_cost / path_len`, where `total_cost` is the cumulative
/// DTW cost and `path_len` is the number of steps in the optimal warping path.
/// Each step cost is `1 - dot(a, b)`, yielding a normalized range of `[0, 2]`.
fn dtw_distance(vectors_a: &[Vector], vectors_b: &[Vector]) -> f64 {
    if vectors_a.is_empty() || vectors_b.is_empty() {
        return 2.0;
    }

    let rows = vectors_a.len() + 1;
    let cols = vectors_b.len() + 1;
    let mut cost = vec![vec![f64::INFINITY; cols]; rows];
    let mut steps = vec![vec![usize::MAX; cols]; rows];
    cost[0][0] = 0.0;
    steps[0][0] = 0;

    for i in 1..rows {
        for j in 1..cols {
            let step_cost = vector_distance(vectors_a[i - 1], vectors_b[j - 1]);
            let (prev_cost, prev_steps) = best_predecessor(&cost, &steps, i, j);
            cost[i][j] = prev_cost + step_cost;
            steps[i][j] = prev_steps + 1;
        }
    }

    let final_steps = steps[rows - 1][cols - 1].max(1) as f64;
    (cost[rows - 1][cols - 1] / final_steps).clamp(0.0, 2.0)
}

fn best_predecessor(cost: &[Vec<f64>], steps: &[Vec<usize>], i: usize, j: usize) -> (f64, usize) {
    let mut best_cost = cost[i - 1][j - 1];
    let mut best_steps = steps[i - 1][j - 1];

    let candidates = [
        (cost[i - 1][j], steps[i - 1][j]),
        (cost[i][j - 1], steps[i][j - 1]),
    ];
    for (cand_cost, cand_steps) in candidates {
        if cand_cost < best_cost || (cand_cost == best_cost && cand_steps < best_steps) {
            best_cost = cand_cost;
            best_steps = cand_steps;
        }
    }

    (best_cost, best_steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(dx: f64, dy: f64, steps: u32) -> Vec<Point> {
        (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                Point::new(dx * t, dy * t, i as u64 * 10)
            })
            .collect()
    }

    #[test]
    fn resample_produces_fixed_count() {
        let stroke = Stroke::from_points(&line(100.0, 0.0, 3), 0);
        assert_eq!(stroke.points().len(), SAMPLE_COUNT);
    }

    #[test]
    fn resample_interpolates_time() {
        let points = resample_points(&[Point::new(0.0, 0.0, 0), Point::new(31.0, 0.0, 310)], 32);
        assert_eq!(points[1].time, 10);
        assert_eq!(points[31].time, 310);
    }

    #[test]
    fn too_few_points_give_empty_stroke() {
        assert!(Stroke::from_points(&[Point::new(1.0, 1.0, 0)], 0).is_empty());
        assert!(Stroke::from_points(&[Point::new(1.0, 1.0, 0), Point::new(1.0, 1.0, 5)], 0)
            .is_empty());
    }

    #[test]
    fn identical_strokes_score_one() {
        let stroke = Stroke::from_points(&line(50.0, 80.0, 7), 0);
        assert_eq!(stroke.compare(&stroke), 1.0);
    }

    #[test]
    fn score_ignores_translation_and_scale() {
        let small = Stroke::from_points(&line(10.0, 0.0, 4), 0);
        let moved: Vec<Point> = line(300.0, 0.0, 9)
            .into_iter()
            .map(|p| Point::new(p.x + 500.0, p.y + 40.0, p.time))
            .collect();
        let large = Stroke::from_points(&moved, 0);
        assert!(small.compare(&large) > 0.99);
    }

    #[test]
    fn opposite_directions_score_low() {
        let right = Stroke::from_points(&line(100.0, 0.0, 5), 0);
        let left = Stroke::from_points(&line(-100.0, 0.0, 5), 0);
        assert!(right.compare(&left) < 0.1);
    }

    #[test]
    fn button_mismatch_scores_zero() {
        let a = Stroke::from_points(&line(100.0, 0.0, 5), 0);
        let b = a.with_button(2);
        assert_eq!(a.compare(&b), 0.0);
        assert_eq!(b.compare(&b.clone()), 1.0);
    }

    #[test]
    fn empty_strokes_match_only_each_other() {
        let a = Stroke::from_points(&line(100.0, 0.0, 5), 1);
        assert_eq!(a.compare(&Stroke::empty(1)), 0.0);
        assert_eq!(Stroke::empty(1).compare(&a), 0.0);
        assert_eq!(Stroke::empty(1).compare(&Stroke::empty(1)), 1.0);
        assert_eq!(Stroke::empty(1).compare(&Stroke::empty(2)), 0.0);
    }
}
