//! Painting operators: they consume the current path (or build one), resolve
//! the current color to device RGB, and append display-list elements.

use log::debug;

use crate::{
    context::Context,
    engine,
    error::{ErrorKind, PsResult},
    graphics::{
        color,
        display_list::{DisplayElement, FillRule, ImageData, LineProps, Rgb},
        path::{Path, PathSegment},
    },
    object::{DictKey, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "erasepage" => erasepage,
        "fill" => fill,
        "eofill" => eofill,
        "stroke" => stroke,
        "rectfill" => rectfill,
        "rectstroke" => rectstroke,
        "image" => image,
        "imagemask" => imagemask,
        "colorimage" => colorimage,
        "showpage" => showpage,
        "copypage" => copypage,
        "makepattern" => makepattern,
        "setpattern" => setpattern,
        "execform" => execform,
    );
}

/// Streams the current path into the display list, after making sure the
/// renderer's clip region is current.
fn emit_path(ctx: &mut Context, path: &Path) {
    let clip = ctx.gstate.clip.clone();
    ctx.display_list
        .sync_clip(&clip.segments, clip.rule, clip.version);

    for segment in &path.segments {
        ctx.display_list.push(match *segment {
            PathSegment::MoveTo { x, y } => DisplayElement::MoveTo { x, y },
            PathSegment::LineTo { x, y } => DisplayElement::LineTo { x, y },
            PathSegment::CurveTo { x1, y1, x2, y2, x3, y3 } => {
                DisplayElement::CurveTo { x1, y1, x2, y2, x3, y3 }
            }
            PathSegment::ClosePath => DisplayElement::ClosePath,
        });
    }
}

pub(super) fn current_rgb(ctx: &mut Context) -> PsResult<Rgb> {
    let color = ctx.gstate.color.clone();
    color::to_rgb(ctx, &color)
}

fn fill_with_rule(ctx: &mut Context, rule: FillRule) -> PsResult<()> {
    let path = std::mem::take(&mut ctx.gstate.path);
    if path.is_empty() {
        return Ok(());
    }

    emit_path(ctx, &path);

    let element = match pattern_id(ctx) {
        Some(id) => DisplayElement::PatternFill { pattern_id: id, rule },
        None => DisplayElement::Fill { color: current_rgb(ctx)?, rule },
    };
    ctx.display_list.push(element);
    Ok(())
}

fn pattern_id(ctx: &Context) -> Option<usize> {
    let pattern = ctx.gstate.color.pattern?;
    ctx.vm()
        .dict(pattern)
        .get(&DictKey::name(b"Implementation"))
        .and_then(|obj| obj.int_val().ok())
        .map(|id| id as usize)
}

fn fill(ctx: &mut Context) -> PsResult<()> {
    fill_with_rule(ctx, FillRule::NonZero)
}

fn eofill(ctx: &mut Context) -> PsResult<()> {
    fill_with_rule(ctx, FillRule::EvenOdd)
}

/// Stroke properties in device space, honoring the device's minimum width.
fn device_line_props(ctx: &Context) -> LineProps {
    let gs = &ctx.gstate;
    let scale = {
        let (ax, ay) = gs.ctm.transform_distance(1.0, 0.0);
        let (bx, by) = gs.ctm.transform_distance(0.0, 1.0);
        ((ax * ax + ay * ay).sqrt() + (bx * bx + by * by).sqrt()) / 2.0
    };

    LineProps {
        width: gs.device_line_width().max(ctx.page_device.line_width_min),
        cap: gs.line_cap,
        join: gs.line_join,
        miter_limit: gs.miter_limit,
        dash: gs.dash_array.iter().map(|d| d * scale).collect(),
        dash_offset: gs.dash_offset * scale,
    }
}

fn stroke(ctx: &mut Context) -> PsResult<()> {
    // /StrokeMethod /StrokePathFill expands the stroke to a fill of the pen's
    // swept outline; /Stroke leaves stroking to the renderer
    if ctx.page_device.stroke_method == crate::graphics::page_device::StrokeMethod::StrokePathFill
    {
        let saved_props = device_line_props(ctx);
        super::pathops::expand_stroke_outline(ctx, saved_props.width)?;
        let path = std::mem::take(&mut ctx.gstate.path);
        if path.is_empty() {
            return Ok(());
        }
        emit_path(ctx, &path);
        let element =
            DisplayElement::Fill { color: current_rgb(ctx)?, rule: FillRule::NonZero };
        ctx.display_list.push(element);
        return Ok(());
    }

    let path = std::mem::take(&mut ctx.gstate.path);
    if path.is_empty() {
        return Ok(());
    }

    emit_path(ctx, &path);
    let element = DisplayElement::Stroke { color: current_rgb(ctx)?, line: device_line_props(ctx) };
    ctx.display_list.push(element);
    Ok(())
}

/// Rectangle operands: either four numbers, or an array holding 4n numbers.
fn collect_rects(ctx: &mut Context) -> PsResult<Vec<[f32; 4]>> {
    if let Ok(slice) = ctx.peek(0)?.array_val() {
        ctx.check_readable(ctx.peek(0)?)?;
        if slice.len % 4 != 0 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        let values = ctx
            .vm()
            .array(slice)
            .iter()
            .map(|obj| obj.num_val())
            .collect::<PsResult<Vec<f32>>>()?;
        ctx.npop(1);
        return Ok(values.chunks(4).map(|c| [c[0], c[1], c[2], c[3]]).collect());
    }

    let h = ctx.peek_num(0)?;
    let w = ctx.peek_num(1)?;
    let y = ctx.peek_num(2)?;
    let x = ctx.peek_num(3)?;
    ctx.npop(4);
    Ok(vec![[x, y, w, h]])
}

fn rect_path(ctx: &Context, rect: [f32; 4]) -> Path {
    let [x, y, w, h] = rect;
    let ctm = ctx.gstate.ctm;
    let mut path = Path::new();
    let corners = [
        ctm.transform(x, y),
        ctm.transform(x + w, y),
        ctm.transform(x + w, y + h),
        ctm.transform(x, y + h),
    ];
    path.move_to(corners[0].0, corners[0].1);
    for &(cx, cy) in &corners[1..] {
        path.line_to(cx, cy);
    }
    path.close();
    path
}

/// Paints rectangles without disturbing the current path.
fn rectfill(ctx: &mut Context) -> PsResult<()> {
    let rects = collect_rects(ctx)?;
    for rect in rects {
        let path = rect_path(ctx, rect);
        emit_path(ctx, &path);
        let element = match pattern_id(ctx) {
            Some(id) => DisplayElement::PatternFill { pattern_id: id, rule: FillRule::NonZero },
            None => DisplayElement::Fill { color: current_rgb(ctx)?, rule: FillRule::NonZero },
        };
        ctx.display_list.push(element);
    }
    Ok(())
}

fn rectstroke(ctx: &mut Context) -> PsResult<()> {
    let rects = collect_rects(ctx)?;
    for rect in rects {
        let path = rect_path(ctx, rect);
        emit_path(ctx, &path);
        let element =
            DisplayElement::Stroke { color: current_rgb(ctx)?, line: device_line_props(ctx) };
        ctx.display_list.push(element);
    }
    Ok(())
}

/// Pulls sample bytes from an image data source: a string, a file, or a
/// procedure returning successive string chunks (empty string means EOF).
fn collect_image_data(ctx: &mut Context, source: &Object, needed: usize) -> PsResult<Vec<u8>> {
    let mut data = Vec::with_capacity(needed);

    match &source.value {
        Value::String(slice) => data.extend_from_slice(ctx.vm().string_bytes(*slice)),
        Value::File(id) => {
            let mut buffer = vec![0u8; needed];
            let count = ctx.files_mut().read_into(*id, &mut buffer)?;
            buffer.truncate(count);
            data = buffer;
        }
        _ if source.is_procedure() => {
            while data.len() < needed {
                engine::call_procedure(ctx, source.clone())?;
                let chunk = ctx.pop()?;
                let slice = chunk.string_val()?;
                if slice.len == 0 {
                    break;
                }
                data.extend_from_slice(ctx.vm().string_bytes(slice));
            }
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }

    data.truncate(needed);
    Ok(data)
}

fn row_bytes(width: i32, bits: i32, components: i32) -> usize {
    ((width as usize * bits as usize * components as usize) + 7) / 8
}

struct ImageArgs {
    width: i32,
    height: i32,
    bits: i32,
    matrix: [f32; 6],
    source: Object,
    decode: Vec<f32>,
}

/// The five-operand Level 1 form shared by image and imagemask.
fn stack_image_args(ctx: &mut Context, mask: bool) -> PsResult<ImageArgs> {
    let source = ctx.peek(0)?.clone();
    let matrix = super::matrixops::read_matrix(ctx, ctx.peek(1)?)?;
    let (bits, decode) = if mask {
        let polarity = ctx.peek_bool(2)?;
        (1, if polarity { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
    } else {
        (ctx.peek_int(2)?, vec![0.0, 1.0])
    };
    let height = ctx.peek_int(3)?;
    let width = ctx.peek_int(4)?;

    if width < 0 || height < 0 || !matches!(bits, 1 | 2 | 4 | 8 | 12) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }

    ctx.npop(5);
    Ok(ImageArgs { width, height, bits, matrix: matrix.as_array(), source, decode })
}

/// The Level 2 dictionary form.
fn dict_image_args(ctx: &mut Context) -> PsResult<ImageArgs> {
    let handle = ctx.peek_dict(0)?;
    let store = ctx.vm().dict(handle);

    let get_int = |key: &[u8]| -> PsResult<i32> {
        store
            .get(&DictKey::name(key))
            .ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))?
            .int_val()
    };

    let width = get_int(b"Width")?;
    let height = get_int(b"Height")?;
    let bits = get_int(b"BitsPerComponent")?;
    let matrix_obj = store
        .get(&DictKey::name(b"ImageMatrix"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))?;
    let source = store
        .get(&DictKey::name(b"DataSource"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))?;
    let decode = match store.get(&DictKey::name(b"Decode")) {
        Some(obj) => {
            let slice = obj.array_val()?;
            ctx.vm()
                .array(slice)
                .iter()
                .map(|o| o.num_val())
                .collect::<PsResult<Vec<f32>>>()?
        }
        None => vec![0.0, 1.0],
    };

    let matrix = super::matrixops::read_matrix(ctx, &matrix_obj)?;
    ctx.npop(1);
    Ok(ImageArgs { width, height, bits, matrix: matrix.as_array(), source, decode })
}

fn build_image(ctx: &mut Context, args: ImageArgs, components: i32) -> PsResult<ImageData> {
    let needed = args.height as usize * row_bytes(args.width, args.bits, components);
    let data = collect_image_data(ctx, &args.source, needed)?;

    // the image matrix maps the unit square; combine with the CTM at call time
    let ctm = ctx.gstate.ctm;
    let m = crate::graphics::matrix::Matrix::from_array(args.matrix)
        .invert()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?
        .concat(ctm);

    Ok(ImageData {
        width: args.width,
        height: args.height,
        bits_per_component: args.bits,
        components,
        matrix: m.as_array(),
        decode: args.decode,
        data,
    })
}

fn image(ctx: &mut Context) -> PsResult<()> {
    let args = match ctx.peek(0)?.value {
        Value::Dict(_) => dict_image_args(ctx)?,
        _ => stack_image_args(ctx, false)?,
    };

    debug!("image: {}x{}x{}", args.width, args.height, args.bits);
    let image = build_image(ctx, args, 1)?;
    let clip = ctx.gstate.clip.clone();
    ctx.display_list
        .sync_clip(&clip.segments, clip.rule, clip.version);
    let color = current_rgb(ctx)?;
    ctx.display_list
        .push(DisplayElement::ImageElement { image, color });
    Ok(())
}

fn imagemask(ctx: &mut Context) -> PsResult<()> {
    let args = match ctx.peek(0)?.value {
        Value::Dict(_) => dict_image_args(ctx)?,
        _ => stack_image_args(ctx, true)?,
    };

    let image = build_image(ctx, args, 1)?;
    let clip = ctx.gstate.clip.clone();
    ctx.display_list
        .sync_clip(&clip.segments, clip.rule, clip.version);
    let color = current_rgb(ctx)?;
    ctx.display_list
        .push(DisplayElement::ImageMaskElement { image, color });
    Ok(())
}

/// width height bits matrix datasrc(s) multi ncomp `colorimage` -
fn colorimage(ctx: &mut Context) -> PsResult<()> {
    let ncomp = ctx.peek_int(0)?;
    let multi = ctx.peek_bool(1)?;
    if !matches!(ncomp, 1 | 3 | 4) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    if multi {
        // separate data sources per component are not produced by the
        // supported front ends
        anyhow::bail!(ErrorKind::LimitCheck);
    }

    let source = ctx.peek(2)?.clone();
    let matrix = super::matrixops::read_matrix(ctx, ctx.peek(3)?)?;
    let bits = ctx.peek_int(4)?;
    let height = ctx.peek_int(5)?;
    let width = ctx.peek_int(6)?;
    if width < 0 || height < 0 || !matches!(bits, 1 | 2 | 4 | 8 | 12) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(7);

    let args = ImageArgs {
        width,
        height,
        bits,
        matrix: matrix.as_array(),
        source,
        decode: vec![0.0, 1.0].repeat(ncomp as usize),
    };
    let image = build_image(ctx, args, ncomp)?;
    let clip = ctx.gstate.clip.clone();
    ctx.display_list
        .sync_clip(&clip.segments, clip.rule, clip.version);
    ctx.display_list
        .push(DisplayElement::ColorImageElement { image });
    Ok(())
}

fn erasepage(ctx: &mut Context) -> PsResult<()> {
    ctx.display_list.push(DisplayElement::ErasePage);
    Ok(())
}

/// Ends the page: appends the page marker, hands the list to the device, and
/// reinstates an initial graphics state.
fn showpage(ctx: &mut Context) -> PsResult<()> {
    if let Some(end_page) = ctx.page_device.end_page.clone() {
        ctx.push(Object::int(ctx.page_device.page_count))?;
        ctx.push(Object::int(0))?;
        engine::call_procedure(ctx, end_page)?;
        // the EndPage result says whether to transmit; drop it and transmit
        let _ = ctx.pop();
    }

    ctx.display_list.push(DisplayElement::ErasePage);
    crate::device::hand_off_page(ctx, false)?;
    ctx.page_device.page_count += 1;

    ctx.gstate.reset_core();
    if let Some(begin_page) = ctx.page_device.begin_page.clone() {
        ctx.push(Object::int(ctx.page_device.page_count))?;
        engine::call_procedure(ctx, begin_page)?;
    }
    Ok(())
}

/// Transmits the page but keeps both the list and the graphics state.
fn copypage(ctx: &mut Context) -> PsResult<()> {
    crate::device::hand_off_page(ctx, true)?;
    Ok(())
}

/// dict matrix `makepattern` pattern : instantiates a pattern, recording the
/// matrix that maps pattern space to current user space.
fn makepattern(ctx: &mut Context) -> PsResult<()> {
    let matrix = super::matrixops::read_matrix(ctx, ctx.peek(0)?)?;
    let proto = ctx.peek_dict(1)?;

    let store = ctx.vm().dict(proto);
    let pattern_type = store
        .get(&DictKey::name(b"PatternType"))
        .map(|obj| obj.int_val())
        .transpose()?
        .unwrap_or(1);
    if pattern_type != 1 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    if !store.contains(&DictKey::name(b"PaintProc")) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }

    ctx.npop(2);

    // instantiate: copy the prototype and tag it with its slot
    let entries: Vec<_> = ctx
        .vm()
        .dict(proto)
        .iter_ordered()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let instance = ctx.vm_mut().alloc_dict(entries.len() + 1);
    for (key, value) in entries {
        ctx.vm_mut().dict_mut(instance).insert(key, value);
    }

    let combined = matrix.concat(ctx.gstate.ctm);
    let id = ctx.patterns.len();
    ctx.patterns.push(crate::context::PatternInstance {
        dict: instance,
        matrix: combined.as_array(),
    });
    ctx.vm_mut()
        .dict_mut(instance)
        .insert(DictKey::name(b"Implementation"), Object::int(id as i32));

    ctx.push(Object::new(Value::Dict(instance)))
}

/// Installs a pattern as the current color (shorthand for a Pattern color
/// space plus setcolor).
fn setpattern(ctx: &mut Context) -> PsResult<()> {
    let pattern = ctx.peek_dict(0)?;
    if !ctx
        .vm()
        .dict(pattern)
        .contains(&DictKey::name(b"Implementation"))
    {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);

    if !matches!(ctx.gstate.color.space, color::ColorSpace::Pattern { .. }) {
        ctx.gstate.color = color::Color {
            space: color::ColorSpace::Pattern { base: None },
            components: Vec::new(),
            pattern: None,
            source: None,
        };
    }
    ctx.gstate.color.pattern = Some(pattern);
    Ok(())
}

/// Executes a form's PaintProc bracketed in its own graphics context.
fn execform(ctx: &mut Context) -> PsResult<()> {
    let form = ctx.peek_dict(0)?;
    let store = ctx.vm().dict(form);

    let form_type = store
        .get(&DictKey::name(b"FormType"))
        .map(|obj| obj.int_val())
        .transpose()?
        .unwrap_or(1);
    if form_type != 1 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    let matrix_obj = store
        .get(&DictKey::name(b"Matrix"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))?;
    let paint_proc = store
        .get(&DictKey::name(b"PaintProc"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))?;
    let matrix = super::matrixops::read_matrix(ctx, &matrix_obj)?;

    // the form dict stays for PaintProc to consume
    let snapshot = ctx.gstate.clone();
    ctx.gsave_push(crate::graphics::state::GSaveEntry::from_gsave(snapshot))?;
    ctx.gstate.ctm = matrix.concat(ctx.gstate.ctm);

    let result = engine::call_procedure(ctx, paint_proc);
    ctx.grestore();
    result
}

#[cfg(test)]
mod test {
    use crate::{
        context::Context,
        engine::run_source,
        graphics::display_list::{DisplayElement, FillRule, Rgb},
    };

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    #[test]
    fn triangle_fill_display_list() {
        let ctx = run(b"0 0 moveto 100 0 lineto 100 100 lineto closepath fill showpage");
        assert_eq!(ctx.pages.len(), 1);
        assert_eq!(
            ctx.pages[0],
            vec![
                DisplayElement::MoveTo { x: 0.0, y: 0.0 },
                DisplayElement::LineTo { x: 100.0, y: 0.0 },
                DisplayElement::LineTo { x: 100.0, y: 100.0 },
                DisplayElement::ClosePath,
                DisplayElement::Fill { color: Rgb::BLACK, rule: FillRule::NonZero },
                DisplayElement::ErasePage,
            ]
        );
    }

    #[test]
    fn fill_clears_the_path() {
        let ctx = run(b"0 0 moveto 10 0 lineto fill");
        assert!(ctx.gstate.path.is_empty());
    }

    #[test]
    fn stroke_captures_line_properties() {
        let ctx = run(b"4 setlinewidth 1 setlinecap 0 0 moveto 50 0 lineto stroke");
        let stroke = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DisplayElement::Stroke { line, .. } => Some(line.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(stroke.width, 4.0);
        assert_eq!(stroke.cap, crate::graphics::display_list::LineCap::Round);
    }

    #[test]
    fn stroke_width_scales_with_ctm() {
        let ctx = run(b"2 2 scale 3 setlinewidth 0 0 moveto 5 0 lineto stroke");
        let stroke = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DisplayElement::Stroke { line, .. } => Some(line.clone()),
                _ => None,
            })
            .unwrap();
        assert!((stroke.width - 6.0).abs() < 1e-4);
    }

    #[test]
    fn rectfill_leaves_current_path_alone() {
        let ctx = run(b"0 0 moveto 1 1 lineto 10 10 20 20 rectfill");
        assert_eq!(ctx.gstate.path.segments.len(), 2);
        assert!(ctx
            .display_list
            .elements
            .iter()
            .any(|e| matches!(e, DisplayElement::Fill { .. })));
    }

    #[test]
    fn color_resolves_at_paint_time() {
        let ctx = run(b"0 0 1 setrgbcolor 0 0 10 10 rectfill");
        let fill = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DisplayElement::Fill { color, .. } => Some(*color),
                _ => None,
            })
            .unwrap();
        assert_eq!(fill, Rgb::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn showpage_clears_list_and_resets_state() {
        let ctx = run(b"5 setlinewidth 0 0 10 10 rectfill showpage");
        assert!(ctx.display_list.is_empty());
        assert_eq!(ctx.gstate.line_width, 1.0);
        assert_eq!(ctx.pages.len(), 1);
    }

    #[test]
    fn copypage_keeps_list() {
        let ctx = run(b"0 0 10 10 rectfill copypage");
        assert_eq!(ctx.pages.len(), 1);
        assert!(!ctx.display_list.is_empty());
    }

    #[test]
    fn image_element_collects_sample_data() {
        let ctx = run(b"2 2 8 [2 0 0 2 0 0] <FF00AA55> image");
        let image = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DisplayElement::ImageElement { image, .. } => Some(image.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(image.width, 2);
        assert_eq!(image.data, vec![0xff, 0x00, 0xaa, 0x55]);
    }

    #[test]
    fn image_procedure_source_is_called_until_filled() {
        let ctx = run(b"2 2 8 [2 0 0 2 0 0] { <FF00> } image");
        let image = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DisplayElement::ImageElement { image, .. } => Some(image.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(image.data, vec![0xff, 0x00, 0xff, 0x00]);
    }

    #[test]
    fn pattern_fill_references_instance() {
        let ctx = run(
            b"<< /PatternType 1 /PaintProc { pop } /BBox [0 0 1 1] /XStep 1 /YStep 1 >> \
              matrix makepattern setpattern 0 0 10 10 rectfill",
        );
        assert!(ctx
            .display_list
            .elements
            .iter()
            .any(|e| matches!(e, DisplayElement::PatternFill { pattern_id: 0, .. })));
    }

    #[test]
    fn execform_runs_paintproc_in_isolated_gstate() {
        let ctx = run(
            b"/f << /FormType 1 /Matrix [2 0 0 2 0 0] /BBox [0 0 10 10] \
              /PaintProc { pop 0 0 moveto 1 0 lineto stroke } >> def f execform currentlinewidth",
        );
        // PaintProc stroked under a scaled CTM; outer state is untouched
        assert_eq!(
            ctx.op_stack.last().unwrap().num_val().unwrap(),
            1.0
        );
        assert!(ctx
            .display_list
            .elements
            .iter()
            .any(|e| matches!(e, DisplayElement::LineTo { x, .. } if (*x - 2.0).abs() < 1e-4)));
    }
}
