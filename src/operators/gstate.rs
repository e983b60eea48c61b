//! Graphics-state operators, device-independent and device-dependent.

use log::warn;

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    graphics::{
        color::{self, Color, ColorSpace},
        display_list::{LineCap, LineJoin},
        state::{GSaveEntry, ScreenParams},
    },
    object::{DictKey, GStateId, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "gsave" => gsave,
        "grestore" => grestore,
        "grestoreall" => grestoreall,
        "initgraphics" => initgraphics,
        "setlinewidth" => setlinewidth,
        "currentlinewidth" => currentlinewidth,
        "setlinecap" => setlinecap,
        "currentlinecap" => currentlinecap,
        "setlinejoin" => setlinejoin,
        "currentlinejoin" => currentlinejoin,
        "setmiterlimit" => setmiterlimit,
        "currentmiterlimit" => currentmiterlimit,
        "setdash" => setdash,
        "currentdash" => currentdash,
        "setflat" => setflat,
        "currentflat" => currentflat,
        "setstrokeadjust" => setstrokeadjust,
        "currentstrokeadjust" => currentstrokeadjust,
        "setgray" => setgray,
        "currentgray" => currentgray,
        "setrgbcolor" => setrgbcolor,
        "currentrgbcolor" => currentrgbcolor,
        "sethsbcolor" => sethsbcolor,
        "currenthsbcolor" => currenthsbcolor,
        "setcmykcolor" => setcmykcolor,
        "currentcmykcolor" => currentcmykcolor,
        "setcolor" => setcolor,
        "currentcolor" => currentcolor,
        "setcolorspace" => setcolorspace,
        "currentcolorspace" => currentcolorspace,
        "settransfer" => settransfer,
        "currenttransfer" => currenttransfer,
        "setblackgeneration" => setblackgeneration,
        "currentblackgeneration" => currentblackgeneration,
        "setundercolorremoval" => setundercolorremoval,
        "currentundercolorremoval" => currentundercolorremoval,
        "setscreen" => setscreen,
        "currentscreen" => currentscreen,
        "sethalftone" => sethalftone,
        "currenthalftone" => currenthalftone,
        "gstate" => gstate,
        "setgstate" => setgstate,
        "currentgstate" => currentgstate,
    );
}

fn gsave(ctx: &mut Context) -> PsResult<()> {
    let snapshot = ctx.gstate.clone();
    ctx.gsave_push(GSaveEntry::from_gsave(snapshot))
}

fn grestore(ctx: &mut Context) -> PsResult<()> {
    ctx.grestore();
    Ok(())
}

fn grestoreall(ctx: &mut Context) -> PsResult<()> {
    ctx.grestore_all();
    Ok(())
}

/// Resets the device-independent core of the graphics state; the font, the
/// device-dependent parameters and the shared page device survive.
fn initgraphics(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.reset_core();
    Ok(())
}

fn setlinewidth(ctx: &mut Context) -> PsResult<()> {
    let width = ctx.peek_num(0)?;
    if width < 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);
    ctx.gstate.line_width = width;
    Ok(())
}

fn currentlinewidth(ctx: &mut Context) -> PsResult<()> {
    let width = ctx.gstate.line_width;
    ctx.push(Object::real(width))
}

fn setlinecap(ctx: &mut Context) -> PsResult<()> {
    let code = ctx.peek_int(0)?;
    let cap = match code {
        0 => LineCap::Butt,
        1 => LineCap::Round,
        2 => LineCap::Square,
        _ => anyhow::bail!(ErrorKind::RangeCheck),
    };
    ctx.npop(1);
    ctx.gstate.line_cap = cap;
    Ok(())
}

fn currentlinecap(ctx: &mut Context) -> PsResult<()> {
    let code = ctx.gstate.line_cap as i32;
    ctx.push(Object::int(code))
}

fn setlinejoin(ctx: &mut Context) -> PsResult<()> {
    let code = ctx.peek_int(0)?;
    let join = match code {
        0 => LineJoin::Miter,
        1 => LineJoin::Round,
        2 => LineJoin::Bevel,
        _ => anyhow::bail!(ErrorKind::RangeCheck),
    };
    ctx.npop(1);
    ctx.gstate.line_join = join;
    Ok(())
}

fn currentlinejoin(ctx: &mut Context) -> PsResult<()> {
    let code = ctx.gstate.line_join as i32;
    ctx.push(Object::int(code))
}

fn setmiterlimit(ctx: &mut Context) -> PsResult<()> {
    let limit = ctx.peek_num(0)?;
    if limit < 1.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);
    ctx.gstate.miter_limit = limit;
    Ok(())
}

fn currentmiterlimit(ctx: &mut Context) -> PsResult<()> {
    let limit = ctx.gstate.miter_limit;
    ctx.push(Object::real(limit))
}

/// array offset `setdash` -
fn setdash(ctx: &mut Context) -> PsResult<()> {
    let offset = ctx.peek_num(0)?;
    let slice = ctx.peek_array(1)?;
    ctx.check_readable(ctx.peek(1)?)?;

    let mut dash = Vec::with_capacity(slice.len);
    let mut sum = 0.0;
    for element in ctx.vm().array(slice) {
        let value = element.num_val()?;
        if value < 0.0 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        sum += value;
        dash.push(value);
    }
    if !dash.is_empty() && sum == 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }

    ctx.npop(2);
    ctx.gstate.dash_array = dash;
    ctx.gstate.dash_offset = offset;
    Ok(())
}

fn currentdash(ctx: &mut Context) -> PsResult<()> {
    let dash = ctx.gstate.dash_array.clone();
    let offset = ctx.gstate.dash_offset;
    let arr = ctx.alloc_array_of_reals(&dash);
    ctx.push(arr)?;
    ctx.push(Object::real(offset))
}

fn setflat(ctx: &mut Context) -> PsResult<()> {
    let flatness = ctx.peek_num(0)?;
    ctx.npop(1);
    ctx.gstate.flatness = flatness.clamp(0.2, 100.0);
    Ok(())
}

fn currentflat(ctx: &mut Context) -> PsResult<()> {
    let flatness = ctx.gstate.flatness;
    ctx.push(Object::real(flatness))
}

fn setstrokeadjust(ctx: &mut Context) -> PsResult<()> {
    let enabled = ctx.peek_bool(0)?;
    ctx.npop(1);
    ctx.gstate.stroke_adjustment = enabled;
    Ok(())
}

fn currentstrokeadjust(ctx: &mut Context) -> PsResult<()> {
    let enabled = ctx.gstate.stroke_adjustment;
    ctx.push(Object::bool(enabled))
}

// -- color ------------------------------------------------------------------

fn setgray(ctx: &mut Context) -> PsResult<()> {
    let gray = ctx.peek_num(0)?.clamp(0.0, 1.0);
    ctx.npop(1);
    ctx.gstate.color = Color {
        space: ColorSpace::DeviceGray,
        components: vec![gray],
        pattern: None,
        source: None,
    };
    Ok(())
}

/// The current color expressed as gray, converting when necessary.
fn currentgray(ctx: &mut Context) -> PsResult<()> {
    let current = ctx.gstate.color.clone();
    let rgb = color::to_rgb(ctx, &current)?;
    ctx.push(Object::real(color::rgb_to_gray(rgb)))
}

fn setrgbcolor(ctx: &mut Context) -> PsResult<()> {
    let b = ctx.peek_num(0)?.clamp(0.0, 1.0);
    let g = ctx.peek_num(1)?.clamp(0.0, 1.0);
    let r = ctx.peek_num(2)?.clamp(0.0, 1.0);
    ctx.npop(3);
    ctx.gstate.color = Color::device_rgb(r, g, b);
    Ok(())
}

fn currentrgbcolor(ctx: &mut Context) -> PsResult<()> {
    let current = ctx.gstate.color.clone();
    let rgb = color::to_rgb(ctx, &current)?;
    ctx.push(Object::real(rgb.r))?;
    ctx.push(Object::real(rgb.g))?;
    ctx.push(Object::real(rgb.b))
}

fn hsb_to_rgb(h: f32, s: f32, b: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (b, b, b);
    }
    let h = (h.fract() + 1.0).fract() * 6.0;
    let sector = h.floor() as i32 % 6;
    let f = h - h.floor();
    let p = b * (1.0 - s);
    let q = b * (1.0 - s * f);
    let t = b * (1.0 - s * (1.0 - f));
    match sector {
        0 => (b, t, p),
        1 => (q, b, p),
        2 => (p, b, t),
        3 => (p, q, b),
        4 => (t, p, b),
        _ => (b, p, q),
    }
}

fn rgb_to_hsb(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let brightness = max;
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        (((b - r) / delta) + 2.0) / 6.0
    } else {
        (((r - g) / delta) + 4.0) / 6.0
    };

    (hue, saturation, brightness)
}

fn sethsbcolor(ctx: &mut Context) -> PsResult<()> {
    let b = ctx.peek_num(0)?.clamp(0.0, 1.0);
    let s = ctx.peek_num(1)?.clamp(0.0, 1.0);
    let h = ctx.peek_num(2)?.clamp(0.0, 1.0);
    ctx.npop(3);
    let (r, g, b) = hsb_to_rgb(h, s, b);
    ctx.gstate.color = Color::device_rgb(r, g, b);
    Ok(())
}

fn currenthsbcolor(ctx: &mut Context) -> PsResult<()> {
    let current = ctx.gstate.color.clone();
    let rgb = color::to_rgb(ctx, &current)?;
    let (h, s, b) = rgb_to_hsb(rgb.r, rgb.g, rgb.b);
    ctx.push(Object::real(h))?;
    ctx.push(Object::real(s))?;
    ctx.push(Object::real(b))
}

fn setcmykcolor(ctx: &mut Context) -> PsResult<()> {
    let k = ctx.peek_num(0)?.clamp(0.0, 1.0);
    let y = ctx.peek_num(1)?.clamp(0.0, 1.0);
    let m = ctx.peek_num(2)?.clamp(0.0, 1.0);
    let c = ctx.peek_num(3)?.clamp(0.0, 1.0);
    ctx.npop(4);
    ctx.gstate.color = Color {
        space: ColorSpace::DeviceCmyk,
        components: vec![c, m, y, k],
        pattern: None,
        source: None,
    };
    Ok(())
}

fn currentcmykcolor(ctx: &mut Context) -> PsResult<()> {
    let current = ctx.gstate.color.clone();
    let (c, m, y, k) = match (&current.space, current.components.as_slice()) {
        (ColorSpace::DeviceCmyk, [c, m, y, k]) => (*c, *m, *y, *k),
        _ => {
            let rgb = color::to_rgb(ctx, &current)?;
            color::rgb_to_cmyk(rgb)
        }
    };
    ctx.push(Object::real(c))?;
    ctx.push(Object::real(m))?;
    ctx.push(Object::real(y))?;
    ctx.push(Object::real(k))
}

/// Stores components (and a pattern dictionary for Pattern spaces) in the
/// graphics state; device conversion stays lazy.
fn setcolor(ctx: &mut Context) -> PsResult<()> {
    let space = ctx.gstate.color.space.clone();

    if let ColorSpace::Pattern { ref base } = space {
        let pattern = ctx.peek_dict(0)?;
        let n = base.as_ref().map_or(0, |base| base.components());
        let mut components = vec![0.0; n];
        for (i, slot) in components.iter_mut().rev().enumerate() {
            *slot = ctx.peek_num(1 + i)?;
        }
        ctx.npop(1 + n);
        ctx.gstate.color.components = components;
        ctx.gstate.color.pattern = Some(pattern);
        return Ok(());
    }

    let n = space.components().max(1);
    let mut components = vec![0.0; n];
    for (i, slot) in components.iter_mut().rev().enumerate() {
        *slot = ctx.peek_num(i)?;
    }
    ctx.npop(n);
    ctx.gstate.color.components = components;
    ctx.gstate.color.pattern = None;
    Ok(())
}

fn currentcolor(ctx: &mut Context) -> PsResult<()> {
    let color = ctx.gstate.color.clone();
    for component in &color.components {
        ctx.push(Object::real(*component))?;
    }
    if let Some(pattern) = color.pattern {
        ctx.push(Object::new(Value::Dict(pattern)))?;
    }
    Ok(())
}

fn setcolorspace(ctx: &mut Context) -> PsResult<()> {
    let operand = ctx.peek(0)?.clone();
    let space = color::from_object(ctx, &operand)?;
    ctx.npop(1);

    let components = space.initial_components();
    ctx.gstate.color = Color { space, components, pattern: None, source: Some(operand) };
    Ok(())
}

fn currentcolorspace(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate.color.source.clone() {
        Some(obj) => ctx.push(obj),
        None => {
            let name = ctx.gstate.color.space.name().as_bytes().to_vec();
            let arr = {
                let entry = Object::literal_name(&name);
                ctx.alloc_array_obj(vec![entry])
            };
            ctx.push(arr)
        }
    }
}

// -- device-dependent parameters -------------------------------------------

fn settransfer(ctx: &mut Context) -> PsResult<()> {
    let proc = ctx.peek_proc(0)?;
    ctx.npop(1);
    ctx.gstate.transfer = Some(proc);
    Ok(())
}

fn currenttransfer(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate.transfer.clone() {
        Some(proc) => ctx.push(proc),
        None => {
            let empty = ctx.alloc_proc_obj(Vec::new());
            ctx.push(empty)
        }
    }
}

fn setblackgeneration(ctx: &mut Context) -> PsResult<()> {
    let proc = ctx.peek_proc(0)?;
    ctx.npop(1);
    ctx.gstate.black_generation = Some(proc);
    Ok(())
}

fn currentblackgeneration(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate.black_generation.clone() {
        Some(proc) => ctx.push(proc),
        None => {
            let empty = ctx.alloc_proc_obj(Vec::new());
            ctx.push(empty)
        }
    }
}

fn setundercolorremoval(ctx: &mut Context) -> PsResult<()> {
    let proc = ctx.peek_proc(0)?;
    ctx.npop(1);
    ctx.gstate.undercolor_removal = Some(proc);
    Ok(())
}

fn currentundercolorremoval(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate.undercolor_removal.clone() {
        Some(proc) => ctx.push(proc),
        None => {
            let empty = ctx.alloc_proc_obj(Vec::new());
            ctx.push(empty)
        }
    }
}

fn setscreen(ctx: &mut Context) -> PsResult<()> {
    let spot = ctx.peek_proc(0)?;
    let angle = ctx.peek_num(1)?;
    let frequency = ctx.peek_num(2)?;
    if frequency <= 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(3);
    ctx.gstate.screen = Some(ScreenParams { frequency, angle, spot_function: spot });
    Ok(())
}

fn currentscreen(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate.screen.clone() {
        Some(screen) => {
            ctx.push(Object::real(screen.frequency))?;
            ctx.push(Object::real(screen.angle))?;
            ctx.push(screen.spot_function)
        }
        None => {
            ctx.push(Object::real(60.0))?;
            ctx.push(Object::real(0.0))?;
            let empty = ctx.alloc_proc_obj(Vec::new());
            ctx.push(empty)
        }
    }
}

/// Halftone dictionaries of all types are accepted and stored; only Type 1
/// participates in rendering downstream.
fn sethalftone(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(0)?;
    let halftone_type = ctx
        .vm()
        .dict(handle)
        .get(&DictKey::name(b"HalftoneType"))
        .map(|obj| obj.int_val())
        .transpose()?
        .unwrap_or(1);
    if !(1..=7).contains(&halftone_type) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    if halftone_type != 1 {
        warn!("halftone type {} stored but not rendered", halftone_type);
    }

    let obj = ctx.peek(0)?.clone();
    ctx.npop(1);
    ctx.gstate.halftone = Some(obj);
    Ok(())
}

fn currenthalftone(ctx: &mut Context) -> PsResult<()> {
    match ctx.gstate.halftone.clone() {
        Some(obj) => ctx.push(obj),
        None => {
            // a minimal Type 1 description of the default screen
            let spot = ctx.alloc_proc_obj(Vec::new());
            let handle = ctx.vm_mut().alloc_dict(4);
            ctx.dict_put(handle, DictKey::name(b"HalftoneType"), Object::int(1))?;
            ctx.dict_put(handle, DictKey::name(b"Frequency"), Object::real(60.0))?;
            ctx.dict_put(handle, DictKey::name(b"Angle"), Object::real(0.0))?;
            ctx.dict_put(handle, DictKey::name(b"SpotFunction"), spot)?;
            ctx.push(Object::new(Value::Dict(handle)))
        }
    }
}

// -- gstate objects ---------------------------------------------------------

/// Allocates a gstate object holding a snapshot of the current state. These
/// live outside VM, like other host resources.
fn gstate(ctx: &mut Context) -> PsResult<()> {
    let snapshot = ctx.gstate.clone();
    ctx.gstate_objects.push(snapshot);
    let id = GStateId(ctx.gstate_objects.len() - 1);
    ctx.push(Object::new(Value::GState(id)))
}

fn setgstate(ctx: &mut Context) -> PsResult<()> {
    let id = match ctx.peek(0)?.value {
        Value::GState(id) => id,
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    let state = ctx
        .gstate_objects
        .get(id.0)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))?;
    ctx.npop(1);
    ctx.gstate = state;
    Ok(())
}

fn currentgstate(ctx: &mut Context) -> PsResult<()> {
    let id = match ctx.peek(0)?.value {
        Value::GState(id) => id,
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    if id.0 >= ctx.gstate_objects.len() {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    let snapshot = ctx.gstate.clone();
    ctx.gstate_objects[id.0] = snapshot;
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source, object::Value};

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    fn top_nums(ctx: &Context, n: usize) -> Vec<f32> {
        ctx.op_stack[ctx.op_stack.len() - n..]
            .iter()
            .map(|o| o.num_val().unwrap())
            .collect()
    }

    #[test]
    fn gsave_grestore_round_trips_state() {
        let ctx = run(b"3 setlinewidth gsave 9 setlinewidth grestore currentlinewidth");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Real(3.0));
    }

    #[test]
    fn setgray_converts_to_rgb() {
        let ctx = run(b"0.5 setgray currentrgbcolor");
        assert_eq!(top_nums(&ctx, 3), vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn rgb_reports_ntsc_gray() {
        let ctx = run(b"1 0 0 setrgbcolor currentgray");
        let gray = ctx.op_stack.last().unwrap().num_val().unwrap();
        assert!((gray - 0.3).abs() < 1e-4);
    }

    #[test]
    fn cmyk_round_trip() {
        let ctx = run(b"0.1 0.2 0.3 0.4 setcmykcolor currentcmykcolor");
        let nums = top_nums(&ctx, 4);
        assert!((nums[0] - 0.1).abs() < 1e-5);
        assert!((nums[3] - 0.4).abs() < 1e-5);
    }

    #[test]
    fn hsb_primaries() {
        let ctx = run(b"0 1 1 sethsbcolor currentrgbcolor");
        assert_eq!(top_nums(&ctx, 3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn setcolorspace_installs_initial_color() {
        let ctx = run(b"/DeviceCMYK setcolorspace currentcolor");
        assert_eq!(top_nums(&ctx, 4), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn currentcolorspace_echoes_operand() {
        let ctx = run(b"[/DeviceRGB] setcolorspace currentcolorspace 0 get");
        let name = ctx.op_stack.last().unwrap().name_val().unwrap();
        assert_eq!(name.as_bytes(), b"DeviceRGB");
    }

    #[test]
    fn setcolor_in_separation_runs_tint_lazily() {
        let ctx = run(
            b"[/Separation /Gold /DeviceRGB { dup dup }] setcolorspace 0.25 setcolor currentrgbcolor",
        );
        assert_eq!(top_nums(&ctx, 3), vec![0.25, 0.25, 0.25]);
    }

    #[test]
    fn dash_round_trip() {
        let ctx = run(b"[4 2] 1 setdash currentdash");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Real(1.0));
        let arr = ctx.op_stack[ctx.op_stack.len() - 2].array_val().unwrap();
        assert_eq!(arr.len, 2);
    }

    #[test]
    fn gstate_objects_snapshot_and_restore() {
        let ctx = run(b"5 setlinewidth gstate 1 setlinewidth setgstate currentlinewidth");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Real(5.0));
    }

    #[test]
    fn halftone_types_are_accepted_but_stored() {
        let ctx = run(b"<< /HalftoneType 5 >> sethalftone currenthalftone /HalftoneType get");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(5));
    }

    #[test]
    fn transfer_is_stored_not_applied() {
        let ctx = run(b"{ 1 exch sub } settransfer 0 setgray currentrgbcolor");
        // still black: transfer functions do not touch display-list colors
        assert_eq!(top_nums(&ctx, 3), vec![0.0, 0.0, 0.0]);
    }
}
