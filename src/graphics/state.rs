use crate::object::{Object, SaveId};

use super::{
    color::Color,
    display_list::{FillRule, LineCap, LineJoin},
    matrix::Matrix,
    path::{Path, PathSegment},
};

/// The tracked clip region: a device-space path plus the builder version that
/// lets a renderer know when its clip must change (see
/// `DisplayList::sync_clip`).
#[derive(Debug, Clone, PartialEq)]
pub struct ClipState {
    pub segments: Vec<PathSegment>,
    pub rule: FillRule,
    pub version: u64,
}

impl Default for ClipState {
    fn default() -> Self {
        // an empty clip path means the full imageable area
        Self {
            segments: Vec::new(),
            rule: FillRule::NonZero,
            version: 0,
        }
    }
}

/// Halftone screen parameters. Types 2-7 are stored but only Type 1 has any
/// rendering effect downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenParams {
    pub frequency: f32,
    pub angle: f32,
    pub spot_function: Object,
}

/// The graphics state proper. `gsave` pushes a clone; `grestore` pops.
/// The page-device dictionary is deliberately *not* here: it is shared across
/// gsave and lives on the context.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    /// Maps user space to device space. Modified by translate/scale/rotate/
    /// concat; path construction applies it at call time.
    pub ctm: Matrix,

    /// The current path, in device space.
    pub path: Path,

    pub clip: ClipState,

    /// Current color with its space; conversion to device RGB is lazy.
    pub color: Color,

    /// Line width in user space units. Transformed to device space when a
    /// stroke element is built.
    pub line_width: f32,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f32,
    pub dash_array: Vec<f32>,
    pub dash_offset: f32,

    /// Curve-flattening error tolerance in device pixels.
    pub flatness: f32,

    pub stroke_adjustment: bool,

    /// Transfer function; stored, never applied when building elements.
    pub transfer: Option<Object>,

    /// Black generation and undercolor removal; stored only.
    pub black_generation: Option<Object>,
    pub undercolor_removal: Option<Object>,

    pub screen: Option<ScreenParams>,
    pub halftone: Option<Object>,

    /// The current font dictionary, installed by `setfont`.
    pub font: Option<Object>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::identity(),
            path: Path::new(),
            clip: ClipState::default(),
            color: Color::black(),
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
            flatness: 1.0,
            stroke_adjustment: false,
            transfer: None,
            black_generation: None,
            undercolor_removal: None,
            screen: None,
            halftone: None,
            font: None,
        }
    }
}

impl GraphicsState {
    /// `initgraphics`: resets the CTM, path, clip, color and line parameters.
    /// The font and the device-dependent parameters (transfer, screen,
    /// halftone) survive.
    pub fn reset_core(&mut self) {
        self.ctm = Matrix::identity();
        self.path.clear();
        self.clip = ClipState::default();
        self.color = Color::black();
        self.line_width = 1.0;
        self.line_cap = LineCap::Butt;
        self.line_join = LineJoin::Miter;
        self.miter_limit = 10.0;
        self.dash_array.clear();
        self.dash_offset = 0.0;
    }

    /// The inverse CTM, needed by currentpoint and itransform.
    pub fn inverse_ctm(&self) -> Option<Matrix> {
        self.ctm.invert()
    }

    /// Device-space line width: the user-space width scaled by the CTM's
    /// average axis magnification.
    pub fn device_line_width(&self) -> f32 {
        let (dx, dy) = self.ctm.transform_distance(self.line_width, 0.0);
        let wx = (dx * dx + dy * dy).sqrt();
        let (dx, dy) = self.ctm.transform_distance(0.0, self.line_width);
        let wy = (dx * dx + dy * dy).sqrt();
        (wx + wy) / 2.0
    }
}

/// One entry of the graphics-save stack. `save` pushes entries too and tags
/// them, because `grestore` must stop at a save boundary while `restore`
/// consumes it.
#[derive(Debug, Clone)]
pub struct GSaveEntry {
    pub state: GraphicsState,
    pub save_id: Option<SaveId>,
}

impl GSaveEntry {
    pub fn from_gsave(state: GraphicsState) -> Self {
        Self { state, save_id: None }
    }

    pub fn from_save(state: GraphicsState, id: SaveId) -> Self {
        Self { state, save_id: Some(id) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_state_matches_initgraphics() {
        let gs = GraphicsState::default();
        assert_eq!(gs.ctm, Matrix::identity());
        assert_eq!(gs.line_width, 1.0);
        assert_eq!(gs.miter_limit, 10.0);
        assert!(gs.path.is_empty());
        assert!(gs.dash_array.is_empty());
    }

    #[test]
    fn device_line_width_follows_scale() {
        let mut gs = GraphicsState::default();
        gs.ctm = Matrix::scaling(2.0, 2.0);
        gs.line_width = 3.0;
        assert!((gs.device_line_width() - 6.0).abs() < 1e-4);
    }
}
