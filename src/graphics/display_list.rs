use super::path::PathSegment;

/// A resolved device color, always RGB in [0, 1]. The color-space engine
/// produces these lazily, when a painting operator builds an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Stroke properties captured into a Stroke element, already in device space
/// (the line width is transformed through the CTM by the painting operator).
#[derive(Debug, Clone, PartialEq)]
pub struct LineProps {
    pub width: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f32,
    pub dash: Vec<f32>,
    pub dash_offset: f32,
}

impl Default for LineProps {
    fn default() -> Self {
        Self {
            width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: Vec::new(),
            dash_offset: 0.0,
        }
    }
}

/// Sample data for an image element. `data` is the raw sample stream, packed
/// rows of `bits_per_component` samples; `matrix` maps the image's unit square
/// onto user space as given to the operator, combined with the CTM.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: i32,
    pub height: i32,
    pub bits_per_component: i32,
    pub components: i32,
    pub matrix: [f32; 6],
    pub decode: Vec<f32>,
    pub data: Vec<u8>,
}

/// One entry of a page's display list. The list is the output boundary of the
/// interpreter: devices rasterize it, they never see PostScript objects.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayElement {
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    CurveTo { x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32 },
    ClosePath,

    /// Paint the path elements pushed since the previous paint marker.
    Fill { color: Rgb, rule: FillRule },
    Stroke { color: Rgb, line: LineProps },
    PatternFill { pattern_id: usize, rule: FillRule },

    /// Instructs the renderer to replace its clip region. `version` ties the
    /// element to the builder's clip-version counter.
    ClipElement { segments: Vec<PathSegment>, rule: FillRule, version: u64 },

    ImageElement { image: ImageData, color: Rgb },
    ImageMaskElement { image: ImageData, color: Rgb },
    ColorImageElement { image: ImageData },

    /// Structured text for devices that keep text searchable.
    TextObj {
        font_name: Vec<u8>,
        text: Vec<u8>,
        origin: (f32, f32),
        size: f32,
        color: Rgb,
    },
    ActualTextStart { text: Vec<u8> },
    ActualTextEnd,
    GlyphRef { font_name: Vec<u8>, code: u32, origin: (f32, f32) },
    GlyphStart { code: u32 },
    GlyphEnd,

    AxialShadingFill { coords: [f32; 4], stops: Vec<(f32, Rgb)> },
    RadialShadingFill { coords: [f32; 6], stops: Vec<(f32, Rgb)> },
    MeshShadingFill { vertices: Vec<(f32, f32, Rgb)> },
    PatchShadingFill { patches: Vec<[f32; 24]> },
    FunctionShadingFill { domain: [f32; 4], matrix: [f32; 6] },

    /// Page boundary: emitted by showpage/copypage before the device hand-off.
    ErasePage,
}

/// The in-memory page under construction. Owned by one page at a time;
/// `showpage` hands it to the device and clears it.
#[derive(Debug, Default)]
pub struct DisplayList {
    pub elements: Vec<DisplayElement>,

    /// Monotonic version of the builder's clip path. Never reset, so a clip
    /// reinstated by grestore can be told apart from the one a device last saw.
    next_clip_version: u64,

    /// Version of the last ClipElement emitted into `elements`.
    emitted_clip_version: u64,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: DisplayElement) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Allocates the version for a new clip path.
    pub fn bump_clip_version(&mut self) -> u64 {
        self.next_clip_version += 1;
        self.next_clip_version
    }

    /// Emits a ClipElement if the active clip differs from the one the device
    /// last saw. Called by every painting operator before its paint element.
    pub fn sync_clip(&mut self, segments: &[PathSegment], rule: FillRule, version: u64) {
        if version == self.emitted_clip_version {
            return;
        }

        self.elements.push(DisplayElement::ClipElement {
            segments: segments.to_vec(),
            rule,
            version,
        });
        self.emitted_clip_version = version;
    }

    /// Removes and returns the accumulated elements, ending the page.
    pub fn take_page(&mut self) -> Vec<DisplayElement> {
        self.emitted_clip_version = 0;
        std::mem::take(&mut self.elements)
    }

    /// Page contents without ending the page (`copypage`).
    pub fn clone_page(&self) -> Vec<DisplayElement> {
        self.elements.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sync_clip_emits_once_per_version() {
        let mut list = DisplayList::new();
        let version = list.bump_clip_version();

        list.sync_clip(&[], FillRule::NonZero, version);
        list.sync_clip(&[], FillRule::NonZero, version);

        assert_eq!(list.len(), 1);
    }

    #[test]
    fn sync_clip_reemits_after_version_change() {
        let mut list = DisplayList::new();
        let v1 = list.bump_clip_version();
        list.sync_clip(&[], FillRule::NonZero, v1);

        let v2 = list.bump_clip_version();
        list.sync_clip(&[], FillRule::EvenOdd, v2);

        // grestore reinstates v1; a later draw must re-emit it
        list.sync_clip(&[], FillRule::NonZero, v1);

        assert_eq!(list.len(), 3);
    }

    #[test]
    fn take_page_clears_the_list() {
        let mut list = DisplayList::new();
        list.push(DisplayElement::ErasePage);

        let page = list.take_page();
        assert_eq!(page.len(), 1);
        assert!(list.is_empty());
    }
}
