//! Matrix and coordinate-system operators.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    graphics::matrix::Matrix,
    object::{ArraySlice, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "matrix" => matrix,
        "initmatrix" => initmatrix,
        "identmatrix" => identmatrix,
        "defaultmatrix" => defaultmatrix,
        "currentmatrix" => currentmatrix,
        "setmatrix" => setmatrix,
        "translate" => translate,
        "scale" => scale,
        "rotate" => rotate,
        "concat" => concat,
        "concatmatrix" => concatmatrix,
        "transform" => transform,
        "dtransform" => dtransform,
        "itransform" => itransform,
        "idtransform" => idtransform,
        "invertmatrix" => invertmatrix,
    );
}

/// Reads a six-element numeric array as a matrix.
pub(super) fn read_matrix(ctx: &Context, obj: &Object) -> PsResult<Matrix> {
    let slice = obj.array_val()?;
    ctx.check_readable(obj)?;
    if slice.len != 6 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    let mut values = [0.0f32; 6];
    for (i, element) in ctx.vm().array(slice).iter().enumerate() {
        values[i] = element.num_val()?;
    }
    Ok(Matrix::from_array(values))
}

/// Writes a matrix into a six-element array and returns the array object.
pub(super) fn fill_matrix(ctx: &mut Context, slice: ArraySlice, m: Matrix) -> PsResult<Object> {
    if slice.len != 6 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    let values = m.as_array();
    for (slot, value) in ctx.vm_mut().array_mut(slice).iter_mut().zip(values) {
        *slot = Object::real(value);
    }
    Ok(Object::new(Value::Array(slice)))
}

fn matrix(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.alloc_array_of_reals(&Matrix::identity().as_array());
    ctx.push(obj)
}

/// The device default CTM; for the display-list device, user space and device
/// space coincide.
fn device_default(_ctx: &Context) -> Matrix {
    Matrix::identity()
}

fn initmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.ctm = device_default(ctx);
    Ok(())
}

fn identmatrix(ctx: &mut Context) -> PsResult<()> {
    let slice = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    ctx.npop(1);
    let filled = fill_matrix(ctx, slice, Matrix::identity())?;
    ctx.push(filled)
}

fn defaultmatrix(ctx: &mut Context) -> PsResult<()> {
    let slice = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    ctx.npop(1);
    let m = device_default(ctx);
    let filled = fill_matrix(ctx, slice, m)?;
    ctx.push(filled)
}

fn currentmatrix(ctx: &mut Context) -> PsResult<()> {
    let slice = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    ctx.npop(1);
    let m = ctx.gstate.ctm;
    let filled = fill_matrix(ctx, slice, m)?;
    ctx.push(filled)
}

fn setmatrix(ctx: &mut Context) -> PsResult<()> {
    let m = read_matrix(ctx, ctx.peek(0)?)?;
    ctx.npop(1);
    ctx.gstate.ctm = m;
    Ok(())
}

/// Two forms: `tx ty translate` updates the CTM; `tx ty matrix translate`
/// fills the matrix instead.
fn translate(ctx: &mut Context) -> PsResult<()> {
    if let Ok(slice) = ctx.peek_array(0) {
        let ty = ctx.peek_num(1)?;
        let tx = ctx.peek_num(2)?;
        ctx.check_writable(ctx.peek(0)?)?;
        ctx.npop(3);
        let filled = fill_matrix(ctx, slice, Matrix::translation(tx, ty))?;
        return ctx.push(filled);
    }

    let ty = ctx.peek_num(0)?;
    let tx = ctx.peek_num(1)?;
    ctx.npop(2);
    ctx.gstate.ctm = Matrix::translation(tx, ty).concat(ctx.gstate.ctm);
    Ok(())
}

fn scale(ctx: &mut Context) -> PsResult<()> {
    if let Ok(slice) = ctx.peek_array(0) {
        let sy = ctx.peek_num(1)?;
        let sx = ctx.peek_num(2)?;
        ctx.check_writable(ctx.peek(0)?)?;
        ctx.npop(3);
        let filled = fill_matrix(ctx, slice, Matrix::scaling(sx, sy))?;
        return ctx.push(filled);
    }

    let sy = ctx.peek_num(0)?;
    let sx = ctx.peek_num(1)?;
    ctx.npop(2);
    ctx.gstate.ctm = Matrix::scaling(sx, sy).concat(ctx.gstate.ctm);
    Ok(())
}

fn rotate(ctx: &mut Context) -> PsResult<()> {
    if let Ok(slice) = ctx.peek_array(0) {
        let angle = ctx.peek_num(1)?;
        ctx.check_writable(ctx.peek(0)?)?;
        ctx.npop(2);
        let filled = fill_matrix(ctx, slice, Matrix::rotation(angle))?;
        return ctx.push(filled);
    }

    let angle = ctx.peek_num(0)?;
    ctx.npop(1);
    ctx.gstate.ctm = Matrix::rotation(angle).concat(ctx.gstate.ctm);
    Ok(())
}

fn concat(ctx: &mut Context) -> PsResult<()> {
    let m = read_matrix(ctx, ctx.peek(0)?)?;
    ctx.npop(1);
    ctx.gstate.ctm = m.concat(ctx.gstate.ctm);
    Ok(())
}

/// m1 m2 m3 `concatmatrix` m3 : m3 = m1 × m2.
fn concatmatrix(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let m2 = read_matrix(ctx, ctx.peek(1)?)?;
    let m1 = read_matrix(ctx, ctx.peek(2)?)?;
    ctx.npop(3);
    let filled = fill_matrix(ctx, target, m1.concat(m2))?;
    ctx.push(filled)
}

fn point_op(
    ctx: &mut Context,
    apply: impl Fn(&Matrix, f32, f32) -> PsResult<(f32, f32)>,
) -> PsResult<()> {
    // with an explicit matrix operand, the CTM is not involved
    if ctx.peek(0)?.array_val().is_ok() {
        let m = read_matrix(ctx, ctx.peek(0)?)?;
        let y = ctx.peek_num(1)?;
        let x = ctx.peek_num(2)?;
        let (rx, ry) = apply(&m, x, y)?;
        ctx.npop(3);
        ctx.push(Object::real(rx))?;
        return ctx.push(Object::real(ry));
    }

    let y = ctx.peek_num(0)?;
    let x = ctx.peek_num(1)?;
    let ctm = ctx.gstate.ctm;
    let (rx, ry) = apply(&ctm, x, y)?;
    ctx.npop(2);
    ctx.push(Object::real(rx))?;
    ctx.push(Object::real(ry))
}

fn transform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| Ok(m.transform(x, y)))
}

fn dtransform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| Ok(m.transform_distance(x, y)))
}

fn itransform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| {
        let inv = m.invert().ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;
        Ok(inv.transform(x, y))
    })
}

fn idtransform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| {
        let inv = m.invert().ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;
        Ok(inv.transform_distance(x, y))
    })
}

/// m1 m2 `invertmatrix` m2
fn invertmatrix(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let m = read_matrix(ctx, ctx.peek(1)?)?;
    let inverse = m.invert().ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))?;
    ctx.npop(2);
    let filled = fill_matrix(ctx, target, inverse)?;
    ctx.push(filled)
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source};

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
    fn translate_moves_origin() {
        let ctx = run(b"10 20 translate 0 0 transform");
        assert_eq!(top_nums(&ctx, 2), vec![10.0, 20.0]);
    }

    #[test]
    fn scale_multiplies_axes() {
        let ctx = run(b"2 3 scale 5 5 transform");
        assert_eq!(top_nums(&ctx, 2), vec![10.0, 15.0]);
    }

    #[test]
    fn transforms_compose_in_order() {
        let ctx = run(b"10 0 translate 2 2 scale 1 1 transform");
        assert_eq!(top_nums(&ctx, 2), vec![12.0, 2.0]);
    }

    #[test]
    fn itransform_inverts_transform() {
        let ctx = run(b"3 4 translate 2 2 scale 7 9 transform itransform");
        let nums = top_nums(&ctx, 2);
        assert!((nums[0] - 7.0).abs() < 1e-4);
        assert!((nums[1] - 9.0).abs() < 1e-4);
    }

    #[test]
    fn dtransform_ignores_translation() {
        let ctx = run(b"100 100 translate 1 2 dtransform");
        assert_eq!(top_nums(&ctx, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn explicit_matrix_form_leaves_ctm_alone() {
        let ctx = run(b"1 1 [2.0 0.0 0.0 2.0 0.0 0.0] transform 0 0 transform");
        assert_eq!(top_nums(&ctx, 4), vec![2.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn matrix_pushes_identity() {
        let ctx = run(b"matrix aload pop");
        assert_eq!(top_nums(&ctx, 6), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn concatmatrix_multiplies() {
        let ctx = run(b"[2 0 0 2 0 0] [1 0 0 1 3 0] matrix concatmatrix aload pop");
        assert_eq!(top_nums(&ctx, 6), vec![2.0, 0.0, 0.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn setmatrix_replaces_ctm() {
        let ctx = run(b"[1.0 0.0 0.0 1.0 5.0 6.0] setmatrix 0 0 transform");
        assert_eq!(top_nums(&ctx, 2), vec![5.0, 6.0]);
    }
}
