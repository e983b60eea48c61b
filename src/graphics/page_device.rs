use crate::{
    context::Context,
    error::PsResult,
    object::{DictHandle, DictKey, Object, Value},
};

/// How `show` and friends enter the display list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextRenderingMode {
    /// Expand glyphs to filled paths inlined in the list (bitmap devices).
    #[default]
    GlyphPaths,

    /// Emit structured TextObj elements preserving font identity and string
    /// (PDF/SVG devices wanting searchable text).
    TextObjs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrokeMethod {
    /// Expand strokes to fills of the stroke outline.
    StrokePathFill,

    /// Emit Stroke elements and let the renderer stroke.
    #[default]
    Stroke,
}

/// The recognized-keys contract of the page-device dictionary. Unrecognized
/// keys are preserved in the dictionary itself but have no effect here.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDevice {
    pub output_device: Vec<u8>,
    pub page_size: (f32, f32),
    pub hw_resolution: (f32, f32),
    pub media_size: (f32, f32),
    pub margins: (f32, f32),
    pub page_offset: (f32, f32),
    pub num_copies: i32,
    pub install: Option<Object>,
    pub begin_page: Option<Object>,
    pub end_page: Option<Object>,
    pub page_count: i32,
    pub line_width_min: f32,
    pub text_rendering_mode: TextRenderingMode,
    pub stroke_method: StrokeMethod,
}

impl Default for PageDevice {
    fn default() -> Self {
        Self {
            output_device: b"display".to_vec(),
            page_size: (612.0, 792.0),
            hw_resolution: (72.0, 72.0),
            media_size: (612.0, 792.0),
            margins: (0.0, 0.0),
            page_offset: (0.0, 0.0),
            num_copies: 1,
            install: None,
            begin_page: None,
            end_page: None,
            page_count: 0,
            line_width_min: 0.0,
            text_rendering_mode: TextRenderingMode::default(),
            stroke_method: StrokeMethod::default(),
        }
    }
}

impl PageDevice {
    /// Merges the recognized keys of a `setpagedevice` request dictionary.
    pub fn merge_from(&mut self, ctx: &Context, dict: DictHandle) -> PsResult<()> {
        let store = ctx.vm().dict(dict);

        let pair = |obj: &Object| -> PsResult<Option<(f32, f32)>> {
            let slice = obj.array_val()?;
            if slice.len != 2 {
                return Ok(None);
            }
            let entries = ctx.vm().array(slice);
            Ok(Some((entries[0].num_val()?, entries[1].num_val()?)))
        };

        if let Some(obj) = store.get(&DictKey::name(b"OutputDevice")) {
            self.output_device = obj.name_val()?.as_bytes().to_vec();
        }
        if let Some(obj) = store.get(&DictKey::name(b"PageSize")) {
            if let Some(size) = pair(obj)? {
                self.page_size = size;
                self.media_size = size;
            }
        }
        if let Some(obj) = store.get(&DictKey::name(b"HWResolution")) {
            if let Some(res) = pair(obj)? {
                self.hw_resolution = res;
            }
        }
        if let Some(obj) = store.get(&DictKey::name(b"Margins")) {
            if let Some(margins) = pair(obj)? {
                self.margins = margins;
            }
        }
        if let Some(obj) = store.get(&DictKey::name(b"PageOffset")) {
            if let Some(offset) = pair(obj)? {
                self.page_offset = offset;
            }
        }
        if let Some(obj) = store.get(&DictKey::name(b"NumCopies")) {
            self.num_copies = obj.int_val()?;
        }
        if let Some(obj) = store.get(&DictKey::name(b"LineWidthMin")) {
            self.line_width_min = obj.num_val()?;
        }
        if let Some(obj) = store.get(&DictKey::name(b"Install")) {
            self.install = Some(obj.clone());
        }
        if let Some(obj) = store.get(&DictKey::name(b"BeginPage")) {
            self.begin_page = Some(obj.clone());
        }
        if let Some(obj) = store.get(&DictKey::name(b"EndPage")) {
            self.end_page = Some(obj.clone());
        }
        if let Some(obj) = store.get(&DictKey::name(b"TextRenderingMode")) {
            if let Value::Name(name) = &obj.value {
                match name.as_bytes() {
                    b"TextObjs" => self.text_rendering_mode = TextRenderingMode::TextObjs,
                    b"GlyphPaths" => self.text_rendering_mode = TextRenderingMode::GlyphPaths,
                    _ => {}
                }
            }
        }
        if let Some(obj) = store.get(&DictKey::name(b"StrokeMethod")) {
            if let Value::Name(name) = &obj.value {
                match name.as_bytes() {
                    b"StrokePathFill" => self.stroke_method = StrokeMethod::StrokePathFill,
                    b"Stroke" => self.stroke_method = StrokeMethod::Stroke,
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Writes the current configuration into a dictionary for
    /// `currentpagedevice`.
    pub fn write_into(&self, ctx: &mut Context, dict: DictHandle) {
        let page_size = ctx.alloc_array_of_reals(&[self.page_size.0, self.page_size.1]);
        let resolution =
            ctx.alloc_array_of_reals(&[self.hw_resolution.0, self.hw_resolution.1]);
        let media = ctx.alloc_array_of_reals(&[self.media_size.0, self.media_size.1]);
        let output_device = Object::new(Value::Name(crate::object::Name::from_vec(
            self.output_device.clone(),
        )));

        let margins = ctx.alloc_array_of_reals(&[self.margins.0, self.margins.1]);
        let page_offset = ctx.alloc_array_of_reals(&[self.page_offset.0, self.page_offset.1]);

        let store = ctx.vm_mut().dict_mut(dict);
        store.insert(DictKey::name(b"OutputDevice"), output_device);
        store.insert(DictKey::name(b"PageSize"), page_size);
        store.insert(DictKey::name(b"HWResolution"), resolution);
        store.insert(DictKey::name(b"MediaSize"), media);
        store.insert(DictKey::name(b"Margins"), margins);
        store.insert(DictKey::name(b"PageOffset"), page_offset);
        store.insert(DictKey::name(b"NumCopies"), Object::int(self.num_copies));
        store.insert(DictKey::name(b"PageCount"), Object::int(self.page_count));
        store.insert(DictKey::name(b"LineWidthMin"), Object::real(self.line_width_min));
        store.insert(DictKey::name(b".IsPageDevice"), Object::bool(true));
        store.insert(
            DictKey::name(b"TextRenderingMode"),
            Object::literal_name(match self.text_rendering_mode {
                TextRenderingMode::GlyphPaths => b"GlyphPaths",
                TextRenderingMode::TextObjs => b"TextObjs",
            }),
        );
        store.insert(
            DictKey::name(b"StrokeMethod"),
            Object::literal_name(match self.stroke_method {
                StrokeMethod::StrokePathFill => b"StrokePathFill",
                StrokeMethod::Stroke => b"Stroke",
            }),
        );
    }
}
