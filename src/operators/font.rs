//! Character and font operators. Glyph outlines are an external concern: the
//! display list carries font identity and placement (GlyphRef / TextObj), and
//! metrics use the font matrix with a nominal advance per glyph.

use log::warn;

use crate::{
    context::Context,
    engine::{self, LoopFrame},
    error::{ErrorKind, PsResult},
    graphics::{display_list::DisplayElement, matrix::Matrix, page_device::TextRenderingMode},
    object::{DictKey, Name, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "findfont" => findfont,
        "scalefont" => scalefont,
        "makefont" => makefont,
        "setfont" => setfont,
        "currentfont" => currentfont,
        "rootfont" => rootfont,
        "definefont" => definefont,
        "undefinefont" => undefinefont,
        "show" => show,
        "ashow" => ashow,
        "widthshow" => widthshow,
        "awidthshow" => awidthshow,
        "xshow" => xshow,
        "yshow" => yshow,
        "xyshow" => xyshow,
        "kshow" => kshow,
        "cshow" => cshow,
        "glyphshow" => glyphshow,
        "stringwidth" => stringwidth,
        "charpath" => charpath,
        "setcachedevice" => setcachedevice,
        "setcharwidth" => setcharwidth,
    );
}

/// Nominal glyph advance in 1000-unit glyph space; real metrics belong to the
/// glyph renderer.
const NOMINAL_ADVANCE: f32 = 600.0;

fn font_matrix(ctx: &Context, font: &Object) -> PsResult<Matrix> {
    let handle = font.dict_val()?;
    match ctx.vm().dict(handle).get(&DictKey::name(b"FontMatrix")) {
        Some(obj) => super::matrixops::read_matrix(ctx, obj),
        None => Ok(Matrix::new(0.001, 0.0, 0.0, 0.001, 0.0, 0.0)),
    }
}

fn font_name_bytes(ctx: &Context, font: &Object) -> Vec<u8> {
    font.dict_val()
        .ok()
        .and_then(|handle| {
            ctx.vm()
                .dict(handle)
                .get(&DictKey::name(b"FontName"))
                .and_then(|obj| obj.name_val().ok().map(|n| n.as_bytes().to_vec()))
        })
        .unwrap_or_else(|| b"unknown".to_vec())
}

fn current_font(ctx: &mut Context) -> PsResult<Object> {
    if let Some(font) = ctx.gstate.font.clone() {
        return Ok(font);
    }
    anyhow::bail!(ErrorKind::InvalidFont);
}

/// Builds a substitute font dictionary when the requested font is unknown.
fn synthesize_font(ctx: &mut Context, name: &Name) -> PsResult<Object> {
    warn!(
        "font {} not found; substituting",
        String::from_utf8_lossy(name.as_bytes())
    );

    let matrix = ctx.alloc_array_of_reals(&[0.001, 0.0, 0.0, 0.001, 0.0, 0.0]);
    let bbox = ctx.alloc_array_of_reals(&[0.0, -200.0, 1000.0, 900.0]);
    let encoding = ctx
        .lookup_name(b"StandardEncoding")
        .unwrap_or_else(Object::null);

    let handle = ctx.vm_mut().alloc_dict(8);
    ctx.dict_put(handle, DictKey::name(b"FontName"), Object::new(Value::Name(name.clone())))?;
    ctx.dict_put(handle, DictKey::name(b"FontType"), Object::int(1))?;
    ctx.dict_put(handle, DictKey::name(b"FontMatrix"), matrix)?;
    ctx.dict_put(handle, DictKey::name(b"FontBBox"), bbox)?;
    ctx.dict_put(handle, DictKey::name(b"Encoding"), encoding)?;
    Ok(Object::new(Value::Dict(handle)))
}

pub(super) fn findfont(ctx: &mut Context) -> PsResult<()> {
    let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
    let found = ctx.vm().dict(ctx.font_directory).get(&key).cloned();

    let font = match found {
        Some(font) => font,
        None => {
            let name = match &key {
                DictKey::Name(name) => name.clone(),
                _ => anyhow::bail!(ErrorKind::InvalidFont),
            };
            synthesize_font(ctx, &name)?
        }
    };
    ctx.npop(1);
    ctx.push(font)
}

/// Copies a font dictionary, replacing its FontMatrix.
fn refit_font(ctx: &mut Context, font: &Object, matrix: Matrix) -> PsResult<Object> {
    let source = font.dict_val()?;
    let entries: Vec<_> = ctx
        .vm()
        .dict(source)
        .iter_ordered()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let matrix_obj = ctx.alloc_array_of_reals(&matrix.as_array());
    let copy = ctx.vm_mut().alloc_dict(entries.len() + 1);
    for (key, value) in entries {
        ctx.vm_mut().dict_mut(copy).insert(key, value);
    }
    ctx.vm_mut()
        .dict_mut(copy)
        .insert(DictKey::name(b"FontMatrix"), matrix_obj);
    Ok(Object::new(Value::Dict(copy)))
}

fn scalefont(ctx: &mut Context) -> PsResult<()> {
    let scale = ctx.peek_num(0)?;
    let font = ctx.peek(1)?.clone();
    font.dict_val()?;
    let base = font_matrix(ctx, &font)?;
    ctx.npop(2);

    let scaled = refit_font(ctx, &font, Matrix::scaling(scale, scale).concat(base))?;
    ctx.push(scaled)
}

fn makefont(ctx: &mut Context) -> PsResult<()> {
    let matrix = super::matrixops::read_matrix(ctx, ctx.peek(0)?)?;
    let font = ctx.peek(1)?.clone();
    font.dict_val()?;
    let base = font_matrix(ctx, &font)?;
    ctx.npop(2);

    let transformed = refit_font(ctx, &font, matrix.concat(base))?;
    ctx.push(transformed)
}

fn setfont(ctx: &mut Context) -> PsResult<()> {
    let font = ctx.peek(0)?.clone();
    font.dict_val()?;
    ctx.npop(1);
    ctx.gstate.font = Some(font);
    Ok(())
}

fn currentfont(ctx: &mut Context) -> PsResult<()> {
    let font = current_font(ctx)?;
    ctx.push(font)
}

fn rootfont(ctx: &mut Context) -> PsResult<()> {
    // no composite-font chain to walk
    currentfont(ctx)
}

/// key font `definefont` font : registers the font and brands it with a FID.
fn definefont(ctx: &mut Context) -> PsResult<()> {
    let font = ctx.peek(0)?.clone();
    let handle = font.dict_val()?;
    let key = DictKey::from_object(ctx, ctx.peek(1)?)?;
    ctx.npop(2);

    let fid = ctx.next_font_id();
    ctx.vm_mut()
        .dict_mut(handle)
        .insert(DictKey::name(b"FID"), Object::new(Value::Font(fid)));

    let directory = ctx.font_directory;
    ctx.vm_mut().dict_mut(directory).insert(key, font.clone());
    ctx.push(font)
}

fn undefinefont(ctx: &mut Context) -> PsResult<()> {
    let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
    ctx.npop(1);
    let directory = ctx.font_directory;
    ctx.vm_mut().dict_mut(directory).remove(&key);
    Ok(())
}

/// Advance of one glyph in user space (text space through the font matrix).
pub(crate) fn char_width(ctx: &mut Context, _code: u8) -> PsResult<(f32, f32)> {
    let font = current_font(ctx)?;
    let fm = font_matrix(ctx, &font)?;
    Ok(fm.transform_distance(NOMINAL_ADVANCE, 0.0))
}

/// The nominal point size encoded by the font matrix.
fn font_size(fm: &Matrix) -> f32 {
    (fm.a * fm.a + fm.b * fm.b).sqrt() * 1000.0
}

/// Paints one glyph at the current point and advances it. Used by the kshow
/// loop frame and the per-glyph show variants.
pub(crate) fn show_char(ctx: &mut Context, code: u8) -> PsResult<()> {
    show_char_with_extra(ctx, code, 0.0, 0.0)
}

fn show_char_with_extra(ctx: &mut Context, code: u8, ax: f32, ay: f32) -> PsResult<()> {
    let font = current_font(ctx)?;
    let (x, y) = ctx
        .gstate
        .path
        .current_point
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;

    let fm = font_matrix(ctx, &font)?;
    let font_name = font_name_bytes(ctx, &font);

    let clip = ctx.gstate.clip.clone();
    ctx.display_list
        .sync_clip(&clip.segments, clip.rule, clip.version);

    match ctx.page_device.text_rendering_mode {
        TextRenderingMode::GlyphPaths => {
            ctx.display_list.push(DisplayElement::GlyphRef {
                font_name,
                code: code as u32,
                origin: (x, y),
            });
        }
        TextRenderingMode::TextObjs => {
            let color = super::paint::current_rgb(ctx)?;
            ctx.display_list.push(DisplayElement::TextObj {
                font_name,
                text: vec![code],
                origin: (x, y),
                size: font_size(&fm),
                color,
            });
        }
    }

    let (wx, wy) = fm.transform_distance(NOMINAL_ADVANCE, 0.0);
    let (dx, dy) = ctx.gstate.ctm.transform_distance(wx + ax, wy + ay);
    ctx.gstate.path.move_to(x + dx, y + dy);
    Ok(())
}

/// The whole-string show path. In TextObjs mode the string stays one element;
/// in GlyphPaths mode each glyph gets its own reference.
fn show_string(ctx: &mut Context, text: &[u8], ax: f32, ay: f32, widthchar: Option<(u8, f32, f32)>) -> PsResult<()> {
    let font = current_font(ctx)?;
    let (x, y) = ctx
        .gstate
        .path
        .current_point
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;

    let fm = font_matrix(ctx, &font)?;

    if ctx.page_device.text_rendering_mode == TextRenderingMode::TextObjs {
        let font_name = font_name_bytes(ctx, &font);
        let clip = ctx.gstate.clip.clone();
        ctx.display_list
            .sync_clip(&clip.segments, clip.rule, clip.version);
        let color = super::paint::current_rgb(ctx)?;
        ctx.display_list.push(DisplayElement::TextObj {
            font_name,
            text: text.to_vec(),
            origin: (x, y),
            size: font_size(&fm),
            color,
        });

        // advance past the whole run
        let mut total = (0.0, 0.0);
        for &code in text {
            let (wx, wy) = fm.transform_distance(NOMINAL_ADVANCE, 0.0);
            total.0 += wx + ax;
            total.1 += wy + ay;
            if let Some((target, cx, cy)) = widthchar {
                if code == target {
                    total.0 += cx;
                    total.1 += cy;
                }
            }
        }
        let (dx, dy) = ctx.gstate.ctm.transform_distance(total.0, total.1);
        ctx.gstate.path.move_to(x + dx, y + dy);
        return Ok(());
    }

    for &code in text {
        let (mut ex, mut ey) = (ax, ay);
        if let Some((target, cx, cy)) = widthchar {
            if code == target {
                ex += cx;
                ey += cy;
            }
        }
        show_char_with_extra(ctx, code, ex, ey)?;
    }
    Ok(())
}

fn pop_show_string(ctx: &mut Context, at: usize) -> PsResult<Vec<u8>> {
    let slice = ctx.peek_string(at)?;
    ctx.check_readable(ctx.peek(at)?)?;
    Ok(ctx.vm().string_bytes(slice).to_vec())
}

/// Show operators validate the font and current point before consuming any
/// operand, so the error path leaves the stack untouched.
fn check_show_preconditions(ctx: &mut Context) -> PsResult<()> {
    current_font(ctx)?;
    ctx.gstate
        .path
        .current_point
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;
    Ok(())
}

fn show(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    check_show_preconditions(ctx)?;
    ctx.npop(1);
    show_string(ctx, &text, 0.0, 0.0, None)
}

/// ax ay string `ashow` - : extra advance between every glyph.
fn ashow(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    let ay = ctx.peek_num(1)?;
    let ax = ctx.peek_num(2)?;
    check_show_preconditions(ctx)?;
    ctx.npop(3);
    show_string(ctx, &text, ax, ay, None)
}

/// cx cy char string `widthshow` - : extra advance after one specific glyph.
fn widthshow(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    let target = ctx.peek_int(1)?;
    let cy = ctx.peek_num(2)?;
    let cx = ctx.peek_num(3)?;
    if !(0..=255).contains(&target) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    check_show_preconditions(ctx)?;
    ctx.npop(4);
    show_string(ctx, &text, 0.0, 0.0, Some((target as u8, cx, cy)))
}

fn awidthshow(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    let ay = ctx.peek_num(1)?;
    let ax = ctx.peek_num(2)?;
    let target = ctx.peek_int(3)?;
    let cy = ctx.peek_num(4)?;
    let cx = ctx.peek_num(5)?;
    if !(0..=255).contains(&target) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    check_show_preconditions(ctx)?;
    ctx.npop(6);
    show_string(ctx, &text, ax, ay, Some((target as u8, cx, cy)))
}

/// Per-glyph displacement shows; the numbers array supplies x, y, or x/y
/// pairs that *replace* the natural advance.
fn positioned_show(ctx: &mut Context, use_x: bool, use_y: bool) -> PsResult<()> {
    let numbers_slice = ctx.peek_array(0)?;
    ctx.check_readable(ctx.peek(0)?)?;
    let text = pop_show_string(ctx, 1)?;
    let numbers = ctx
        .vm()
        .array(numbers_slice)
        .iter()
        .map(|obj| obj.num_val())
        .collect::<PsResult<Vec<f32>>>()?;

    let per_glyph = usize::from(use_x) + usize::from(use_y);
    if numbers.len() < text.len() * per_glyph {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    check_show_preconditions(ctx)?;
    ctx.npop(2);

    for (i, &code) in text.iter().enumerate() {
        let (x, y) = ctx
            .gstate
            .path
            .current_point
            .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;

        // paint without the natural advance, then apply the supplied one
        show_char_with_extra(ctx, code, 0.0, 0.0)?;

        let mut idx = i * per_glyph;
        let dx = if use_x {
            let v = numbers[idx];
            idx += 1;
            v
        } else {
            0.0
        };
        let dy = if use_y { numbers[idx] } else { 0.0 };

        let (ddx, ddy) = ctx.gstate.ctm.transform_distance(dx, dy);
        ctx.gstate.path.move_to(x + ddx, y + ddy);
    }
    Ok(())
}

fn xshow(ctx: &mut Context) -> PsResult<()> {
    positioned_show(ctx, true, false)
}

fn yshow(ctx: &mut Context) -> PsResult<()> {
    positioned_show(ctx, false, true)
}

fn xyshow(ctx: &mut Context) -> PsResult<()> {
    positioned_show(ctx, true, true)
}

/// proc string `kshow` - : the procedure runs between each glyph pair.
fn kshow(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    let body = ctx.peek_proc(1)?;
    check_show_preconditions(ctx)?;
    ctx.npop(2);

    engine::push_loop(ctx, LoopFrame::Kshow { text, pos: 0, body })
}

/// proc string `cshow` - : the procedure sees each code and its width;
/// nothing is painted.
fn cshow(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    let body = ctx.peek_proc(1)?;
    current_font(ctx)?;
    ctx.npop(2);

    engine::push_loop(ctx, LoopFrame::Cshow { text, pos: 0, body })
}

fn glyphshow(ctx: &mut Context) -> PsResult<()> {
    let glyph = ctx.peek_name(0)?;
    let font = current_font(ctx)?;
    let (x, y) = ctx
        .gstate
        .path
        .current_point
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;
    ctx.npop(1);

    // map the glyph name back through the encoding when possible
    let code = encoding_lookup(ctx, &font, &glyph).unwrap_or(0);
    show_char(ctx, code)
}

fn encoding_lookup(ctx: &Context, font: &Object, glyph: &Name) -> Option<u8> {
    let handle = font.dict_val().ok()?;
    let encoding = ctx.vm().dict(handle).get(&DictKey::name(b"Encoding"))?;
    let slice = encoding.array_val().ok()?;
    ctx.vm()
        .array(slice)
        .iter()
        .position(|entry| match &entry.value {
            Value::Name(name) => name == glyph,
            _ => false,
        })
        .map(|pos| pos as u8)
}

fn stringwidth(ctx: &mut Context) -> PsResult<()> {
    let text = pop_show_string(ctx, 0)?;
    let font = current_font(ctx)?;
    let fm = font_matrix(ctx, &font)?;
    ctx.npop(1);

    let mut total = (0.0f32, 0.0f32);
    for _ in &text {
        let (wx, wy) = fm.transform_distance(NOMINAL_ADVANCE, 0.0);
        total.0 += wx;
        total.1 += wy;
    }
    ctx.push(Object::real(total.0))?;
    ctx.push(Object::real(total.1))
}

/// string bool `charpath` - : appends glyph boundary boxes to the current
/// path; outline extraction belongs to the glyph renderer.
fn charpath(ctx: &mut Context) -> PsResult<()> {
    let _stroked = ctx.peek_bool(0)?;
    let text = pop_show_string(ctx, 1)?;
    let font = current_font(ctx)?;
    let fm = font_matrix(ctx, &font)?;
    check_show_preconditions(ctx)?;
    ctx.npop(2);

    for _ in &text {
        let (x, y) = ctx
            .gstate
            .path
            .current_point
            .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;

        let (wx, wy) = fm.transform_distance(NOMINAL_ADVANCE, 0.0);
        let (hx, hy) = fm.transform_distance(0.0, 700.0);
        let ctm = ctx.gstate.ctm;
        let (dwx, dwy) = ctm.transform_distance(wx, wy);
        let (dhx, dhy) = ctm.transform_distance(hx, hy);

        ctx.gstate.path.move_to(x, y);
        ctx.gstate.path.line_to(x + dwx, y + dwy);
        ctx.gstate.path.line_to(x + dwx + dhx, y + dwy + dhy);
        ctx.gstate.path.line_to(x + dhx, y + dhy);
        ctx.gstate.path.close();
        ctx.gstate.path.move_to(x + dwx, y + dwy);
    }
    Ok(())
}

/// BuildChar metrics: consumed and recorded nowhere, since the glyph cache
/// lives with the renderer.
fn setcachedevice(ctx: &mut Context) -> PsResult<()> {
    for i in 0..6 {
        ctx.peek_num(i)?;
    }
    ctx.npop(6);
    Ok(())
}

fn setcharwidth(ctx: &mut Context) -> PsResult<()> {
    ctx.peek_num(0)?;
    ctx.peek_num(1)?;
    ctx.npop(2);
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::{
        context::Context,
        engine::run_source,
        graphics::display_list::DisplayElement,
        object::Value,
    };

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    const SETUP: &[u8] = b"/Helvetica findfont 12 scalefont setfont ";

    fn with_font(tail: &[u8]) -> Vec<u8> {
        let mut src = SETUP.to_vec();
        src.extend_from_slice(tail);
        src
    }

    #[test]
    fn findfont_substitutes_unknown_fonts() {
        let ctx = run(b"/NoSuchFont findfont /FontName get");
        let name = ctx.op_stack.last().unwrap().name_val().unwrap();
        assert_eq!(name.as_bytes(), b"NoSuchFont");
    }

    #[test]
    fn scalefont_scales_the_matrix() {
        let ctx = run(b"/F findfont 12 scalefont /FontMatrix get 0 get");
        let a = ctx.op_stack.last().unwrap().num_val().unwrap();
        assert!((a - 0.012).abs() < 1e-6);
    }

    #[test]
    fn definefont_brands_with_fid() {
        let ctx = run(b"/MyFont << /FontType 3 /FontMatrix [0.001 0 0 0.001 0 0] >> definefont /FID known");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn defined_fonts_are_found_again() {
        let ctx = run(
            b"/MyFont << /FontType 3 /FontMatrix [0.001 0 0 0.001 0 0] >> definefont pop \
              /MyFont findfont /FontType get",
        );
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(3));
    }

    #[test]
    fn show_emits_glyph_refs_and_advances() {
        let ctx = run(&with_font(b"10 20 moveto (AB) show"));
        let glyphs: Vec<u32> = ctx
            .display_list
            .elements
            .iter()
            .filter_map(|e| match e {
                DisplayElement::GlyphRef { code, .. } => Some(*code),
                _ => None,
            })
            .collect();
        assert_eq!(glyphs, vec![b'A' as u32, b'B' as u32]);

        // advanced by two glyphs of 0.6 em at 12pt
        let (x, _) = ctx.gstate.path.current_point.unwrap();
        assert!((x - (10.0 + 2.0 * 7.2)).abs() < 1e-3);
    }

    #[test]
    fn show_without_current_point_raises() {
        let ctx = run(&with_font(b"{ (A) show } stopped"));
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn show_without_font_is_invalidfont() {
        let ctx = run(b"0 0 moveto { (A) show } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidfont");
    }

    #[test]
    fn textobjs_mode_emits_one_element_per_show() {
        let ctx = run(&with_font(
            b"<< /TextRenderingMode /TextObjs >> setpagedevice 0 0 moveto (hello) show",
        ));
        let texts: Vec<Vec<u8>> = ctx
            .display_list
            .elements
            .iter()
            .filter_map(|e| match e {
                DisplayElement::TextObj { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec![b"hello".to_vec()]);
    }

    #[test]
    fn stringwidth_scales_with_size() {
        let mut ctx = run(&with_font(b"(xx) stringwidth"));
        let wy = ctx.pop().unwrap().num_val().unwrap();
        let wx = ctx.pop().unwrap().num_val().unwrap();
        assert!((wx - 14.4).abs() < 1e-3);
        assert_eq!(wy, 0.0);
    }

    #[test]
    fn kshow_runs_between_pairs() {
        let ctx = run(&with_font(b"0 0 moveto 0 { pop pop 1 add } (abc) kshow"));
        // two pairs: (a,b) and (b,c)
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(2));
    }

    #[test]
    fn cshow_reports_widths_without_painting() {
        let ctx = run(&with_font(b"0 0 moveto { pop pop pop } (ab) cshow"));
        assert!(ctx
            .display_list
            .elements
            .iter()
            .all(|e| !matches!(e, DisplayElement::GlyphRef { .. })));
    }

    #[test]
    fn charpath_appends_to_path() {
        let ctx = run(&with_font(b"0 0 moveto (A) false charpath"));
        assert!(ctx.gstate.path.segments.len() > 2);
    }
}
