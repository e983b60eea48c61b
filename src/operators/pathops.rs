//! Path construction operators. Coordinates are transformed through the CTM
//! at call time; the stored path is device space.

use crate::{
    context::Context,
    engine::{self, LoopFrame},
    error::{ErrorKind, PsResult},
    graphics::{
        display_list::FillRule,
        path::{Path, PathSegment},
    },
    object::{Object, Operator},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "newpath" => newpath,
        "currentpoint" => currentpoint,
        "moveto" => moveto,
        "rmoveto" => rmoveto,
        "lineto" => lineto,
        "rlineto" => rlineto,
        "curveto" => curveto,
        "rcurveto" => rcurveto,
        "arc" => arc,
        "arcn" => arcn,
        "arct" => arct,
        "arcto" => arcto,
        "closepath" => closepath,
        "pathbbox" => pathbbox,
        "pathforall" => pathforall,
        "flattenpath" => flattenpath,
        "reversepath" => reversepath,
        "strokepath" => strokepath,
        "clippath" => clippath,
        "initclip" => initclip,
        "clip" => clip,
        "eoclip" => eoclip,
        "rectclip" => rectclip,
        "infill" => infill,
        "ineofill" => ineofill,
        "instroke" => instroke,
    );
}

fn newpath(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.path.clear();
    Ok(())
}

/// Reports the current point in user space, through the inverse CTM.
fn currentpoint(ctx: &mut Context) -> PsResult<()> {
    let (dx, dy) = ctx
        .gstate
        .path
        .current_point
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;
    let inverse = ctx
        .gstate
        .inverse_ctm()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;
    let (x, y) = inverse.transform(dx, dy);
    ctx.push(Object::real(x))?;
    ctx.push(Object::real(y))
}

fn moveto(ctx: &mut Context) -> PsResult<()> {
    let y = ctx.peek_num(0)?;
    let x = ctx.peek_num(1)?;
    ctx.npop(2);
    let (dx, dy) = ctx.gstate.ctm.transform(x, y);
    ctx.gstate.path.move_to(dx, dy);
    Ok(())
}

fn relative(ctx: &mut Context) -> PsResult<(f32, f32)> {
    ctx.gstate
        .path
        .current_point
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))
}

fn rmoveto(ctx: &mut Context) -> PsResult<()> {
    let dy = ctx.peek_num(0)?;
    let dx = ctx.peek_num(1)?;
    let (cx, cy) = relative(ctx)?;
    ctx.npop(2);
    let (ddx, ddy) = ctx.gstate.ctm.transform_distance(dx, dy);
    ctx.gstate.path.move_to(cx + ddx, cy + ddy);
    Ok(())
}

fn lineto(ctx: &mut Context) -> PsResult<()> {
    let y = ctx.peek_num(0)?;
    let x = ctx.peek_num(1)?;
    relative(ctx)?;
    ctx.npop(2);
    let (dx, dy) = ctx.gstate.ctm.transform(x, y);
    ctx.gstate.path.line_to(dx, dy);
    Ok(())
}

fn rlineto(ctx: &mut Context) -> PsResult<()> {
    let dy = ctx.peek_num(0)?;
    let dx = ctx.peek_num(1)?;
    let (cx, cy) = relative(ctx)?;
    ctx.npop(2);
    let (ddx, ddy) = ctx.gstate.ctm.transform_distance(dx, dy);
    ctx.gstate.path.line_to(cx + ddx, cy + ddy);
    Ok(())
}

fn curveto(ctx: &mut Context) -> PsResult<()> {
    let y3 = ctx.peek_num(0)?;
    let x3 = ctx.peek_num(1)?;
    let y2 = ctx.peek_num(2)?;
    let x2 = ctx.peek_num(3)?;
    let y1 = ctx.peek_num(4)?;
    let x1 = ctx.peek_num(5)?;
    relative(ctx)?;
    ctx.npop(6);

    let ctm = ctx.gstate.ctm;
    let (dx1, dy1) = ctm.transform(x1, y1);
    let (dx2, dy2) = ctm.transform(x2, y2);
    let (dx3, dy3) = ctm.transform(x3, y3);
    ctx.gstate.path.curve_to(dx1, dy1, dx2, dy2, dx3, dy3);
    Ok(())
}

fn rcurveto(ctx: &mut Context) -> PsResult<()> {
    let dy3 = ctx.peek_num(0)?;
    let dx3 = ctx.peek_num(1)?;
    let dy2 = ctx.peek_num(2)?;
    let dx2 = ctx.peek_num(3)?;
    let dy1 = ctx.peek_num(4)?;
    let dx1 = ctx.peek_num(5)?;
    let (cx, cy) = relative(ctx)?;
    ctx.npop(6);

    let ctm = ctx.gstate.ctm;
    let (ox, oy) = (cx, cy);
    let (tx1, ty1) = ctm.transform_distance(dx1, dy1);
    let (tx2, ty2) = ctm.transform_distance(dx2, dy2);
    let (tx3, ty3) = ctm.transform_distance(dx3, dy3);
    ctx.gstate
        .path
        .curve_to(ox + tx1, oy + ty1, ox + tx2, oy + ty2, ox + tx3, oy + ty3);
    Ok(())
}

/// Appends a circular arc as cubic segments of at most a quarter turn,
/// constructed in user space and transformed pointwise.
fn append_arc(ctx: &mut Context, x: f32, y: f32, r: f32, a1: f32, a2: f32, clockwise: bool) -> PsResult<()> {
    if r < 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }

    let mut start = a1.to_radians();
    let mut end = a2.to_radians();
    if clockwise {
        while end > start {
            end -= std::f32::consts::TAU;
        }
    } else {
        while end < start {
            end += std::f32::consts::TAU;
        }
    }

    let ctm = ctx.gstate.ctm;
    let point_at = |angle: f32| (x + r * angle.cos(), y + r * angle.sin());

    let (sx, sy) = point_at(start);
    let (dsx, dsy) = ctm.transform(sx, sy);
    if ctx.gstate.path.current_point.is_some() {
        ctx.gstate.path.line_to(dsx, dsy);
    } else {
        ctx.gstate.path.move_to(dsx, dsy);
    }

    let total = end - start;
    let steps = ((total.abs() / std::f32::consts::FRAC_PI_2).ceil() as usize).max(1);
    let delta = total / steps as f32;

    for _ in 0..steps {
        let next = start + delta;
        // cubic approximation constant for a circular sweep of `delta`
        let k = 4.0 / 3.0 * (delta / 4.0).tan();

        let (x0, y0) = point_at(start);
        let (x3, y3) = point_at(next);
        let (c0, s0) = (start.cos(), start.sin());
        let (c3, s3) = (next.cos(), next.sin());

        let p1 = (x0 - k * r * s0, y0 + k * r * c0);
        let p2 = (x3 + k * r * s3, y3 - k * r * c3);

        let (dx1, dy1) = ctm.transform(p1.0, p1.1);
        let (dx2, dy2) = ctm.transform(p2.0, p2.1);
        let (dx3, dy3) = ctm.transform(x3, y3);
        ctx.gstate.path.curve_to(dx1, dy1, dx2, dy2, dx3, dy3);

        start = next;
    }

    Ok(())
}

fn arc(ctx: &mut Context) -> PsResult<()> {
    let a2 = ctx.peek_num(0)?;
    let a1 = ctx.peek_num(1)?;
    let r = ctx.peek_num(2)?;
    let y = ctx.peek_num(3)?;
    let x = ctx.peek_num(4)?;
    ctx.npop(5);
    append_arc(ctx, x, y, r, a1, a2, false)
}

fn arcn(ctx: &mut Context) -> PsResult<()> {
    let a2 = ctx.peek_num(0)?;
    let a1 = ctx.peek_num(1)?;
    let r = ctx.peek_num(2)?;
    let y = ctx.peek_num(3)?;
    let x = ctx.peek_num(4)?;
    ctx.npop(5);
    append_arc(ctx, x, y, r, a1, a2, true)
}

/// Shared geometry of arct/arcto: the tangent points of the arc of radius r
/// fitted into the corner (p0, p1, p2).
fn tangent_arc(ctx: &mut Context) -> PsResult<(f32, f32, f32, f32)> {
    let r = ctx.peek_num(0)?;
    let y2 = ctx.peek_num(1)?;
    let x2 = ctx.peek_num(2)?;
    let y1 = ctx.peek_num(3)?;
    let x1 = ctx.peek_num(4)?;
    let (dcx, dcy) = relative(ctx)?;
    if r < 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }

    let inverse = ctx
        .gstate
        .inverse_ctm()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;
    let (x0, y0) = inverse.transform(dcx, dcy);

    // unit vectors along both legs of the corner
    let (ux1, uy1) = (x0 - x1, y0 - y1);
    let (ux2, uy2) = (x2 - x1, y2 - y1);
    let l1 = (ux1 * ux1 + uy1 * uy1).sqrt();
    let l2 = (ux2 * ux2 + uy2 * uy2).sqrt();
    if l1 == 0.0 || l2 == 0.0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    let (ux1, uy1) = (ux1 / l1, uy1 / l1);
    let (ux2, uy2) = (ux2 / l2, uy2 / l2);

    let cos2a = ux1 * ux2 + uy1 * uy2;
    let half_angle = (cos2a.clamp(-1.0, 1.0)).acos() / 2.0;
    if half_angle.sin() == 0.0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    let dist = r / half_angle.tan();

    let (t1x, t1y) = (x1 + ux1 * dist, y1 + uy1 * dist);
    let (t2x, t2y) = (x1 + ux2 * dist, y1 + uy2 * dist);

    // arc center sits along the angle bisector
    let (bx, by) = (ux1 + ux2, uy1 + uy2);
    let bl = (bx * bx + by * by).sqrt();
    let center_dist = (dist * dist + r * r).sqrt();
    let (cx, cy) = (x1 + bx / bl * center_dist, y1 + by / bl * center_dist);

    let a1 = (t1y - cy).atan2(t1x - cx).to_degrees();
    let a2 = (t2y - cy).atan2(t2x - cx).to_degrees();

    ctx.npop(5);

    let ctm = ctx.gstate.ctm;
    let (dt1x, dt1y) = ctm.transform(t1x, t1y);
    ctx.gstate.path.line_to(dt1x, dt1y);

    // sweep whichever way is shorter
    let sweep = (a2 - a1).rem_euclid(360.0);
    append_arc(ctx, cx, cy, r, a1, a2, sweep > 180.0)?;

    Ok((t1x, t1y, t2x, t2y))
}

fn arct(ctx: &mut Context) -> PsResult<()> {
    tangent_arc(ctx)?;
    Ok(())
}

/// Like arct but also returns the two tangent points.
fn arcto(ctx: &mut Context) -> PsResult<()> {
    let (t1x, t1y, t2x, t2y) = tangent_arc(ctx)?;
    ctx.push(Object::real(t1x))?;
    ctx.push(Object::real(t1y))?;
    ctx.push(Object::real(t2x))?;
    ctx.push(Object::real(t2y))
}

fn closepath(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.path.close();
    Ok(())
}

/// User-space bounding box of the current path.
fn pathbbox(ctx: &mut Context) -> PsResult<()> {
    let bbox = ctx
        .gstate
        .path
        .bounding_box()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::NoCurrentPoint))?;
    let inverse = ctx
        .gstate
        .inverse_ctm()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;

    let corners = [
        inverse.transform(bbox.0, bbox.1),
        inverse.transform(bbox.2, bbox.1),
        inverse.transform(bbox.0, bbox.3),
        inverse.transform(bbox.2, bbox.3),
    ];
    let llx = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min);
    let lly = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min);
    let urx = corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max);
    let ury = corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max);

    ctx.push(Object::real(llx))?;
    ctx.push(Object::real(lly))?;
    ctx.push(Object::real(urx))?;
    ctx.push(Object::real(ury))
}

fn pathforall(ctx: &mut Context) -> PsResult<()> {
    let close_proc = ctx.peek_proc(0)?;
    let curve_proc = ctx.peek_proc(1)?;
    let line_proc = ctx.peek_proc(2)?;
    let move_proc = ctx.peek_proc(3)?;
    let inverse_ctm = ctx
        .gstate
        .inverse_ctm()
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;
    ctx.npop(4);

    let segments = ctx.gstate.path.segments.clone();
    engine::push_loop(
        ctx,
        LoopFrame::PathForall {
            segments,
            pos: 0,
            inverse_ctm,
            move_proc,
            line_proc,
            curve_proc,
            close_proc,
        },
    )
}

fn flatten_segments(segments: &[PathSegment]) -> Vec<PathSegment> {
    const STEPS: usize = 16;

    let mut out = Vec::with_capacity(segments.len());
    let mut current = (0.0f32, 0.0f32);

    for segment in segments {
        match *segment {
            PathSegment::MoveTo { x, y } => {
                current = (x, y);
                out.push(*segment);
            }
            PathSegment::LineTo { x, y } => {
                current = (x, y);
                out.push(*segment);
            }
            PathSegment::CurveTo { x1, y1, x2, y2, x3, y3 } => {
                let (x0, y0) = current;
                for i in 1..=STEPS {
                    let t = i as f32 / STEPS as f32;
                    let mt = 1.0 - t;
                    let x = mt * mt * mt * x0
                        + 3.0 * mt * mt * t * x1
                        + 3.0 * mt * t * t * x2
                        + t * t * t * x3;
                    let y = mt * mt * mt * y0
                        + 3.0 * mt * mt * t * y1
                        + 3.0 * mt * t * t * y2
                        + t * t * t * y3;
                    out.push(PathSegment::LineTo { x, y });
                }
                current = (x3, y3);
            }
            PathSegment::ClosePath => out.push(*segment),
        }
    }

    out
}

fn flattenpath(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.path.segments = flatten_segments(&ctx.gstate.path.segments);
    Ok(())
}

fn reversepath(ctx: &mut Context) -> PsResult<()> {
    let segments = std::mem::take(&mut ctx.gstate.path.segments);
    let mut reversed = Vec::with_capacity(segments.len());

    // rebuild each subpath with its points in reverse order
    let mut subpath: Vec<(f32, f32)> = Vec::new();
    let mut closed = false;
    let mut flush = |subpath: &mut Vec<(f32, f32)>, closed: &mut bool, out: &mut Vec<PathSegment>| {
        if subpath.is_empty() {
            return;
        }
        let mut points = std::mem::take(subpath);
        points.reverse();
        out.push(PathSegment::MoveTo { x: points[0].0, y: points[0].1 });
        for &(x, y) in &points[1..] {
            out.push(PathSegment::LineTo { x, y });
        }
        if *closed {
            out.push(PathSegment::ClosePath);
        }
        *closed = false;
    };

    for segment in flatten_segments(&segments) {
        match segment {
            PathSegment::MoveTo { x, y } => {
                flush(&mut subpath, &mut closed, &mut reversed);
                subpath.push((x, y));
            }
            PathSegment::LineTo { x, y } => subpath.push((x, y)),
            PathSegment::ClosePath => closed = true,
            PathSegment::CurveTo { .. } => unreachable!("flattened above"),
        }
    }
    flush(&mut subpath, &mut closed, &mut reversed);

    ctx.gstate.path.segments = reversed;
    Ok(())
}

/// Replaces the path with an outline of its stroke: each flattened segment
/// becomes the quad swept by the pen.
fn strokepath(ctx: &mut Context) -> PsResult<()> {
    let width = ctx.gstate.device_line_width().max(0.01);
    expand_stroke_outline(ctx, width)
}

/// The shared pen-sweep expansion, also used by the StrokePathFill stroke
/// method.
pub(super) fn expand_stroke_outline(ctx: &mut Context, width: f32) -> PsResult<()> {
    let half = width.max(0.01) / 2.0;

    let mut outline = Path::new();
    let mut current = (0.0f32, 0.0f32);

    for segment in flatten_segments(&ctx.gstate.path.segments) {
        match segment {
            PathSegment::MoveTo { x, y } => current = (x, y),
            PathSegment::LineTo { x, y } => {
                let (sx, sy) = current;
                let (dx, dy) = (x - sx, y - sy);
                let len = (dx * dx + dy * dy).sqrt();
                if len > 0.0 {
                    // normal of the segment, scaled to half the pen width
                    let (nx, ny) = (-dy / len * half, dx / len * half);
                    outline.move_to(sx + nx, sy + ny);
                    outline.line_to(x + nx, y + ny);
                    outline.line_to(x - nx, y - ny);
                    outline.line_to(sx - nx, sy - ny);
                    outline.close();
                }
                current = (x, y);
            }
            PathSegment::ClosePath => {}
            PathSegment::CurveTo { .. } => unreachable!("flattened above"),
        }
    }

    ctx.gstate.path = outline;
    Ok(())
}

/// Installs the clip boundary as the current path.
fn clippath(ctx: &mut Context) -> PsResult<()> {
    let mut path = Path::new();
    if ctx.gstate.clip.segments.is_empty() {
        // unclipped: the page boundary
        let (w, h) = ctx.page_device.page_size;
        path.move_to(0.0, 0.0);
        path.line_to(w, 0.0);
        path.line_to(w, h);
        path.line_to(0.0, h);
        path.close();
    } else {
        for segment in &ctx.gstate.clip.segments {
            path.segments.push(*segment);
        }
        path.current_point = ctx.gstate.clip.segments.iter().rev().find_map(|s| match *s {
            PathSegment::MoveTo { x, y } | PathSegment::LineTo { x, y } => Some((x, y)),
            PathSegment::CurveTo { x3, y3, .. } => Some((x3, y3)),
            PathSegment::ClosePath => None,
        });
    }
    ctx.gstate.path = path;
    Ok(())
}

fn install_clip(ctx: &mut Context, segments: Vec<PathSegment>, rule: FillRule) -> PsResult<()> {
    let version = ctx.display_list.bump_clip_version();
    ctx.gstate.clip.segments = segments;
    ctx.gstate.clip.rule = rule;
    ctx.gstate.clip.version = version;
    ctx.display_list
        .sync_clip(&ctx.gstate.clip.segments, rule, version);
    Ok(())
}

fn initclip(ctx: &mut Context) -> PsResult<()> {
    install_clip(ctx, Vec::new(), FillRule::NonZero)
}

/// The clip operators leave the current path untouched.
fn clip(ctx: &mut Context) -> PsResult<()> {
    let segments = ctx.gstate.path.segments.clone();
    install_clip(ctx, segments, FillRule::NonZero)
}

fn eoclip(ctx: &mut Context) -> PsResult<()> {
    let segments = ctx.gstate.path.segments.clone();
    install_clip(ctx, segments, FillRule::EvenOdd)
}

/// x y w h `rectclip` - : clips to the rectangle and clears the path.
fn rectclip(ctx: &mut Context) -> PsResult<()> {
    let h = ctx.peek_num(0)?;
    let w = ctx.peek_num(1)?;
    let y = ctx.peek_num(2)?;
    let x = ctx.peek_num(3)?;
    ctx.npop(4);

    let ctm = ctx.gstate.ctm;
    let mut rect = Path::new();
    let corners = [
        ctm.transform(x, y),
        ctm.transform(x + w, y),
        ctm.transform(x + w, y + h),
        ctm.transform(x, y + h),
    ];
    rect.move_to(corners[0].0, corners[0].1);
    for &(cx, cy) in &corners[1..] {
        rect.line_to(cx, cy);
    }
    rect.close();

    install_clip(ctx, rect.segments, FillRule::NonZero)?;
    ctx.gstate.path.clear();
    Ok(())
}

/// Ray-casting insideness test over the flattened path. Crossing parity for
/// even-odd, signed crossing count for non-zero winding.
fn point_in_segments(segments: &[PathSegment], px: f32, py: f32, even_odd: bool) -> bool {
    let mut winding: i32 = 0;
    let mut crossings: u32 = 0;

    let mut start = (0.0f32, 0.0f32);
    let mut current = (0.0f32, 0.0f32);

    let mut edge = |a: (f32, f32), b: (f32, f32)| {
        let (x1, y1) = a;
        let (x2, y2) = b;
        if (y1 <= py) != (y2 <= py) {
            let t = (py - y1) / (y2 - y1);
            let x = x1 + t * (x2 - x1);
            if x > px {
                crossings += 1;
                winding += if y2 > y1 { 1 } else { -1 };
            }
        }
    };

    for segment in flatten_segments(segments) {
        match segment {
            PathSegment::MoveTo { x, y } => {
                start = (x, y);
                current = (x, y);
            }
            PathSegment::LineTo { x, y } => {
                edge(current, (x, y));
                current = (x, y);
            }
            PathSegment::ClosePath => {
                edge(current, start);
                current = start;
            }
            PathSegment::CurveTo { .. } => unreachable!("flattened above"),
        }
    }
    // implicitly close an open trailing subpath
    edge(current, start);

    if even_odd {
        crossings % 2 == 1
    } else {
        winding != 0
    }
}

fn insideness(ctx: &mut Context, even_odd: bool, stroked: bool) -> PsResult<()> {
    let y = ctx.peek_num(0)?;
    let x = ctx.peek_num(1)?;
    ctx.npop(2);

    let (dx, dy) = ctx.gstate.ctm.transform(x, y);
    let inside = if stroked {
        // test against the pen's swept outline
        let saved = ctx.gstate.path.clone();
        strokepath(ctx)?;
        let result = point_in_segments(&ctx.gstate.path.segments, dx, dy, false);
        ctx.gstate.path = saved;
        result
    } else {
        point_in_segments(&ctx.gstate.path.segments, dx, dy, even_odd)
    };

    ctx.push(Object::bool(inside))
}

/// x y `infill` bool : would the point be painted by fill?
fn infill(ctx: &mut Context) -> PsResult<()> {
    insideness(ctx, false, false)
}

fn ineofill(ctx: &mut Context) -> PsResult<()> {
    insideness(ctx, true, false)
}

fn instroke(ctx: &mut Context) -> PsResult<()> {
    insideness(ctx, false, true)
}

#[cfg(test)]
mod test {
    use crate::{
        context::Context,
        engine::run_source,
        graphics::path::PathSegment,
    };

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
    fn path_records_device_coordinates() {
        let ctx = run(b"10 0 translate 0 0 moveto 5 5 lineto");
        assert_eq!(
            ctx.gstate.path.segments,
            vec![
                PathSegment::MoveTo { x: 10.0, y: 0.0 },
                PathSegment::LineTo { x: 15.0, y: 5.0 }
            ]
        );
    }

    #[test]
    fn ctm_at_call_time_applies() {
        // the scale after moveto does not retroactively move the point
        let ctx = run(b"1 1 moveto 10 10 scale 1 1 lineto");
        assert_eq!(
            ctx.gstate.path.segments,
            vec![
                PathSegment::MoveTo { x: 1.0, y: 1.0 },
                PathSegment::LineTo { x: 10.0, y: 10.0 }
            ]
        );
    }

    #[test]
    fn currentpoint_reports_user_space() {
        let ctx = run(b"5 7 translate 1 2 moveto currentpoint");
        let nums = top_nums(&ctx, 2);
        assert!((nums[0] - 1.0).abs() < 1e-4);
        assert!((nums[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn currentpoint_without_path_raises() {
        let ctx = run(b"{ currentpoint } stopped");
        assert_eq!(
            ctx.op_stack.last().unwrap().value,
            crate::object::Value::Bool(true)
        );
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"nocurrentpoint");
    }

    #[test]
    fn lineto_without_current_point_raises() {
        let ctx = run(b"{ 3 4 lineto } stopped");
        assert_eq!(
            ctx.op_stack.last().unwrap().value,
            crate::object::Value::Bool(true)
        );
    }

    #[test]
    fn closepath_closes_subpath() {
        let ctx = run(b"0 0 moveto 10 0 lineto 10 10 lineto closepath");
        assert_eq!(ctx.gstate.path.segments.last(), Some(&PathSegment::ClosePath));
        assert_eq!(ctx.gstate.path.current_point, Some((0.0, 0.0)));
    }

    #[test]
    fn arc_starts_with_move_when_path_empty() {
        let ctx = run(b"0 0 10 0 90 arc");
        assert!(matches!(
            ctx.gstate.path.segments[0],
            PathSegment::MoveTo { x, .. } if (x - 10.0).abs() < 1e-3
        ));
        // quarter circle fits one cubic
        assert!(matches!(ctx.gstate.path.segments[1], PathSegment::CurveTo { .. }));
        assert_eq!(ctx.gstate.path.segments.len(), 2);
    }

    #[test]
    fn arc_endpoint_is_on_circle() {
        let ctx = run(b"0 0 10 0 90 arc");
        let (x, y) = ctx.gstate.path.current_point.unwrap();
        assert!(x.abs() < 1e-2);
        assert!((y - 10.0).abs() < 1e-2);
    }

    #[test]
    fn pathbbox_covers_path() {
        let ctx = run(b"0 0 moveto 100 0 lineto 100 100 lineto pathbbox");
        assert_eq!(top_nums(&ctx, 4), vec![0.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn pathforall_replays_segments() {
        let ctx = run(
            b"0 0 moveto 10 0 lineto closepath 0 { } { } { } { 1 } pathforall",
        );
        // moveto pushed 2 coords, lineto 2, closepath pushed 1
        let nums = top_nums(&ctx, 6);
        assert_eq!(nums, vec![0.0, 0.0, 0.0, 10.0, 0.0, 1.0]);
    }

    #[test]
    fn flattenpath_removes_curves() {
        let ctx = run(b"0 0 moveto 1 1 2 1 3 0 curveto flattenpath");
        assert!(ctx
            .gstate
            .path
            .segments
            .iter()
            .all(|s| !matches!(s, PathSegment::CurveTo { .. })));
    }

    #[test]
    fn clip_does_not_clear_path() {
        let ctx = run(b"0 0 moveto 10 0 lineto 10 10 lineto closepath clip");
        assert!(!ctx.gstate.path.is_empty());
        assert!(!ctx.gstate.clip.segments.is_empty());
    }

    #[test]
    fn clip_emits_display_element() {
        let ctx = run(b"0 0 moveto 10 0 lineto 10 10 lineto closepath clip");
        assert!(matches!(
            ctx.display_list.elements.last(),
            Some(crate::graphics::display_list::DisplayElement::ClipElement { .. })
        ));
    }

    #[test]
    fn clippath_defaults_to_page_boundary() {
        let ctx = run(b"clippath pathbbox");
        let nums = top_nums(&ctx, 4);
        assert_eq!(nums, vec![0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn infill_inside_and_outside() {
        let setup = b"0 0 moveto 10 0 lineto 10 10 lineto 0 10 lineto closepath ";
        let mut inside = setup.to_vec();
        inside.extend_from_slice(b"5 5 infill");
        let ctx = run(&inside);
        assert_eq!(ctx.op_stack.last().unwrap().value, crate::object::Value::Bool(true));

        let mut outside = setup.to_vec();
        outside.extend_from_slice(b"15 5 infill");
        let ctx = run(&outside);
        assert_eq!(ctx.op_stack.last().unwrap().value, crate::object::Value::Bool(false));
    }

    #[test]
    fn instroke_tracks_the_pen() {
        let ctx = run(b"4 setlinewidth 0 0 moveto 10 0 lineto 5 1 instroke");
        assert_eq!(ctx.op_stack.last().unwrap().value, crate::object::Value::Bool(true));
        let ctx = run(b"4 setlinewidth 0 0 moveto 10 0 lineto 5 8 instroke");
        assert_eq!(ctx.op_stack.last().unwrap().value, crate::object::Value::Bool(false));
    }
}
