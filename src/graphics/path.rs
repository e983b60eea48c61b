/// One element of the current path. Coordinates are device space: path
/// construction operators transform through the CTM at call time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    CurveTo { x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32 },
    ClosePath,
}

/// The current path under construction. `subpath_start` tracks the point a
/// `closepath` returns to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub segments: Vec<PathSegment>,
    pub current_point: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.current_point = None;
        self.subpath_start = None;
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        // consecutive movetos collapse into the last one
        if let Some(PathSegment::MoveTo { x: px, y: py }) = self.segments.last_mut() {
            *px = x;
            *py = y;
        } else {
            self.segments.push(PathSegment::MoveTo { x, y });
        }
        self.current_point = Some((x, y));
        self.subpath_start = Some((x, y));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.segments.push(PathSegment::LineTo { x, y });
        self.current_point = Some((x, y));
    }

    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        self.segments.push(PathSegment::CurveTo { x1, y1, x2, y2, x3, y3 });
        self.current_point = Some((x3, y3));
    }

    pub fn close(&mut self) {
        if self.current_point.is_some() {
            self.segments.push(PathSegment::ClosePath);
            self.current_point = self.subpath_start;
        }
    }

    /// Device-space bounding box over all segment coordinates, control points
    /// included (`pathbbox` semantics for an unflattened path).
    pub fn bounding_box(&self) -> Option<(f32, f32, f32, f32)> {
        let mut bbox: Option<(f32, f32, f32, f32)> = None;

        let mut extend = |x: f32, y: f32| {
            bbox = Some(match bbox {
                None => (x, y, x, y),
                Some((llx, lly, urx, ury)) => {
                    (llx.min(x), lly.min(y), urx.max(x), ury.max(y))
                }
            });
        };

        for segment in &self.segments {
            match *segment {
                PathSegment::MoveTo { x, y } | PathSegment::LineTo { x, y } => extend(x, y),
                PathSegment::CurveTo { x1, y1, x2, y2, x3, y3 } => {
                    extend(x1, y1);
                    extend(x2, y2);
                    extend(x3, y3);
                }
                PathSegment::ClosePath => {}
            }
        }

        bbox
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn close_returns_to_subpath_start() {
        let mut path = Path::new();
        path.move_to(10.0, 20.0);
        path.line_to(30.0, 20.0);
        path.close();

        assert_eq!(path.current_point, Some((10.0, 20.0)));
        assert_eq!(path.segments.last(), Some(&PathSegment::ClosePath));
    }

    #[test]
    fn consecutive_movetos_collapse() {
        let mut path = Path::new();
        path.move_to(1.0, 1.0);
        path.move_to(2.0, 2.0);

        assert_eq!(path.segments, vec![PathSegment::MoveTo { x: 2.0, y: 2.0 }]);
    }

    #[test]
    fn bbox_covers_curve_control_points() {
        let mut path = Path::new();
        path.move_to(0.0, 0.0);
        path.curve_to(50.0, 100.0, -10.0, 20.0, 30.0, 5.0);

        assert_eq!(path.bounding_box(), Some((-10.0, 0.0, 50.0, 100.0)));
    }

    #[test]
    fn empty_path_has_no_bbox() {
        assert_eq!(Path::new().bounding_box(), None);
    }
}
