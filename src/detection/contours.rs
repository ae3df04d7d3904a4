use image::GrayImage;

use crate::config::TracingConfig;
use crate::models::DetectedRectangle;

/// A connected run of edge pixels discovered by flood fill.
#[derive(Debug, Clone)]
pub struct TracedRegion {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub points: Vec<(u32, u32)>,
}

impl TracedRegion {
    fn from_points(points: Vec<(u32, u32)>) -> Option<Self> {
        let &(x, y) = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
        for &(px, py) in &points {
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            points,
        })
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y
    }

    /// Bounding-box area in square pixels.
    pub fn area(&self) -> f64 {
        self.width() as f64 * self.height() as f64
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width() as f32;
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        w / h
    }

    /// A line or a single pixel; has no usable area.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn to_rectangle(&self, confidence: f64) -> DetectedRectangle {
        DetectedRectangle::axis_aligned(
            self.min_x as f64,
            self.min_y as f64,
            self.max_x as f64,
            self.max_y as f64,
            confidence,
        )
    }
}

/// Per-call flood-fill state. Allocated fresh for each detection pass and
/// dropped with it, so concurrent scans never share a visited set.
struct RegionTracer<'a> {
    edges: &'a GrayImage,
    visited: Vec<bool>,
    step: u32,
    max_points: usize,
}

impl<'a> RegionTracer<'a> {
    fn new(edges: &'a GrayImage, step: u32, max_points: usize) -> Self {
        let (width, height) = edges.dimensions();
        Self {
            edges,
            visited: vec![false; width as usize * height as usize],
            step,
            max_points,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.edges.width() as usize + x as usize
    }

    fn is_edge(&self, x: u32, y: u32) -> bool {
        self.edges.get_pixel(x, y)[0] > 0
    }

    fn is_visited(&self, x: u32, y: u32) -> bool {
        self.visited[self.index(x, y)]
    }

    /// Stack-based 4-directional fill stepping `step` pixels at a time.
    fn trace(&mut self, seed_x: u32, seed_y: u32) -> Vec<(u32, u32)> {
        let (width, height) = self.edges.dimensions();
        let mut points = Vec::new();
        let mut stack = vec![(seed_x, seed_y)];

        while let Some((x, y)) = stack.pop() {
            if points.len() >= self.max_points {
                break;
            }
            if x >= width || y >= height {
                continue;
            }
            let idx = self.index(x, y);
            if self.visited[idx] || !self.is_edge(x, y) {
                continue;
            }
            self.visited[idx] = true;
            points.push((x, y));

            stack.push((x + self.step, y));
            if let Some(left) = x.checked_sub(self.step) {
                stack.push((left, y));
            }
            stack.push((x, y + self.step));
            if let Some(up) = y.checked_sub(self.step) {
                stack.push((x, up));
            }
        }

        points
    }
}

/// Scan the edge map on a sparse grid and trace every unvisited edge pixel
/// hit into its own region.
pub fn trace_regions(edges: &GrayImage, config: &TracingConfig) -> Vec<TracedRegion> {
    let (width, height) = edges.dimensions();
    let stride = config.grid_stride.max(1) as usize;
    let mut tracer = RegionTracer::new(edges, config.flood_step.max(1), config.max_region_points);
    let mut regions = Vec::new();

    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            if !tracer.is_edge(x, y) || tracer.is_visited(x, y) {
                continue;
            }
            let points = tracer.trace(x, y);
            if points.len() < config.min_region_points {
                continue;
            }
            if let Some(region) = TracedRegion::from_points(points) {
                regions.push(region);
            }
        }
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn outline(width: u32, height: u32, left: u32, top: u32, right: u32, bottom: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let on_vertical = (x == left || x == right) && y >= top && y <= bottom;
            let on_horizontal = (y == top || y == bottom) && x >= left && x <= right;
            if on_vertical || on_horizontal {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn config(stride: u32, cap: usize, min_points: usize) -> TracingConfig {
        TracingConfig {
            grid_stride: stride,
            max_region_points: cap,
            min_region_points: min_points,
            ..TracingConfig::default()
        }
    }

    #[test]
    fn test_traces_rectangle_outline() {
        let edges = outline(100, 100, 20, 20, 60, 40);
        let regions = trace_regions(&edges, &config(10, 1000, 1));
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!((region.min_x, region.min_y, region.max_x, region.max_y), (20, 20, 60, 40));
        assert_eq!(region.width(), 40);
        assert_eq!(region.height(), 20);
        // Step 2 visits every other pixel: 2 × 21 top/bottom + 2 × 9 sides.
        assert_eq!(region.point_count(), 60);
    }

    #[test]
    fn test_separate_outlines_become_separate_regions() {
        let mut edges = outline(200, 100, 10, 10, 50, 50);
        let second = outline(200, 100, 100, 20, 180, 80);
        for (x, y, p) in second.enumerate_pixels() {
            if p[0] > 0 {
                edges.put_pixel(x, y, *p);
            }
        }
        let regions = trace_regions(&edges, &config(10, 1000, 1));
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_point_cap_splits_long_outline() {
        let edges = outline(100, 100, 20, 20, 60, 40);
        let regions = trace_regions(&edges, &config(10, 25, 1));
        assert!(regions.iter().all(|r| r.point_count() <= 25));
        assert!(regions.len() > 1);
    }

    #[test]
    fn test_min_points_drops_small_regions() {
        let mut edges = GrayImage::new(50, 50);
        edges.put_pixel(20, 20, Luma([255]));
        edges.put_pixel(22, 20, Luma([255]));
        assert_eq!(trace_regions(&edges, &config(10, 1000, 1)).len(), 1);
        assert!(trace_regions(&edges, &config(10, 1000, 10)).is_empty());
    }

    #[test]
    fn test_off_grid_edges_are_not_seeded() {
        let edges = outline(100, 100, 21, 21, 61, 41);
        assert!(trace_regions(&edges, &config(10, 1000, 1)).is_empty());
    }
}
