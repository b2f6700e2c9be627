//! Maps dataset coordinates into view space and clips trajectories
//! against the view rectangle.
//!
//! A trajectory becomes zero or more runs, each a maximal contiguous
//! visible portion of the path. Points are quantized to the resolution
//! grid and adjacent duplicates are dropped, so a run is already the
//! compact polyline that goes on the wire.

use shared::{Point, Trajectory, ViewRequest};

/// Precomputed mapping from dataset space onto the view rectangle.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    origin: Point,
    view: Point,
    x_factor: f64,
    y_factor: f64,
    resolution: i32,
}

impl Projection {
    /// Callers must hand in a request that passed
    /// [`ViewRequest::validate`]; validation guarantees both factors and
    /// the resolution are non-zero.
    pub fn new(request: &ViewRequest) -> Self {
        let x_factor = f64::from(request.frame_bottom.x - request.frame_top.x)
            / f64::from(request.view.x);
        let y_factor = f64::from(request.frame_bottom.y - request.frame_top.y)
            / f64::from(request.view.y);
        Self {
            origin: request.frame_top,
            view: request.view,
            x_factor,
            y_factor,
            resolution: request.resolution,
        }
    }

    /// Maps one sample to screen space and snaps it to the resolution
    /// grid. Flooring division keeps quantization consistent on both
    /// sides of zero.
    pub fn map(&self, sample: Point) -> Point {
        let sx = (f64::from(sample.x - self.origin.x) / self.x_factor).floor() as i32;
        let sy = (f64::from(sample.y - self.origin.y) / self.y_factor).floor() as i32;
        Point::new(
            sx.div_euclid(self.resolution) * self.resolution,
            sy.div_euclid(self.resolution) * self.resolution,
        )
    }

    /// Half-open in-view test, `[0, view.x) x [0, view.y)`.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0 && point.x < self.view.x && point.y >= 0 && point.y < self.view.y
    }
}

/// Runs the clipping state machine over one trajectory.
///
/// The first sample is never evaluated alone; a run can only begin once
/// two consecutive samples exist. On entering the view the previous
/// mapped point is appended first to anchor the entry edge, and on
/// leaving it the first out-of-view mapped point closes the run as the
/// exit anchor. Every push is deduplicated against the run's tail, so
/// no two adjacent points are ever identical.
pub fn clip_trajectory(projection: &Projection, trajectory: &Trajectory) -> Vec<Vec<Point>> {
    let mut runs = Vec::new();
    let mut run: Vec<Point> = Vec::new();
    let mut last: Option<Point> = None;
    let mut inside = false;

    for &sample in trajectory.samples.iter().skip(1) {
        let mapped = projection.map(sample);
        if projection.contains(mapped) {
            if !inside {
                if let Some(previous) = last {
                    push_dedup(&mut run, previous);
                }
            }
            push_dedup(&mut run, mapped);
            inside = true;
        } else {
            if inside {
                // anchor the exit edge on the out-of-view point
                push_dedup(&mut run, mapped);
                runs.push(std::mem::take(&mut run));
            }
            inside = false;
        }
        last = Some(mapped);
    }
    if inside && !run.is_empty() {
        runs.push(run);
    }
    runs
}

fn push_dedup(run: &mut Vec<Point>, point: Point) {
    if run.last() != Some(&point) {
        run.push(point);
    }
}
