//! Operand-stack manipulation operators.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "pop" => pop,
        "exch" => exch,
        "dup" => dup,
        "copy" => copy,
        "index" => index,
        "roll" => roll,
        "clear" => clear,
        "count" => count,
        "mark" => mark,
        "[" => mark,
        "<<" => mark,
        "cleartomark" => cleartomark,
        "counttomark" => counttomark,
    );
}

fn pop(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    ctx.npop(1);
    Ok(())
}

fn exch(ctx: &mut Context) -> PsResult<()> {
    ctx.require(2)?;
    let len = ctx.op_stack.len();
    ctx.op_stack.swap(len - 1, len - 2);
    Ok(())
}

fn dup(ctx: &mut Context) -> PsResult<()> {
    let top = ctx.peek(0)?.clone();
    ctx.push(top)
}

/// Both forms: `n copy` duplicates the top n objects; the composite forms
/// copy contents between arrays, strings and dictionaries.
fn copy(ctx: &mut Context) -> PsResult<()> {
    match &ctx.peek(0)?.value {
        Value::Int(_) => {
            let n = ctx.peek_usize(0)?;
            ctx.require(1 + n)?;
            ctx.npop(1);

            let len = ctx.op_stack.len();
            for i in 0..n {
                let obj = ctx.op_stack[len - n + i].clone();
                ctx.push(obj)?;
            }
            Ok(())
        }

        Value::Array(_) => {
            let dst = ctx.peek_array(0)?;
            let src = ctx.peek(1)?.array_val()?;
            ctx.check_writable(ctx.peek(0)?)?;
            ctx.check_readable(ctx.peek(1)?)?;
            if src.len > dst.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let dst_attrib = ctx.peek(0)?.attrib;
            let dst_access = ctx.peek(0)?.access;
            ctx.npop(2);

            let contents = ctx.vm().array(src).to_vec();
            ctx.vm_mut().array_mut(dst)[..contents.len()].clone_from_slice(&contents);

            let sub = crate::object::ArraySlice { len: src.len, ..dst };
            let mut result = Object::new(Value::Array(sub));
            result.attrib = dst_attrib;
            result.access = dst_access;
            ctx.push(result)
        }

        Value::String(_) => {
            let dst = ctx.peek_string(0)?;
            let src = ctx.peek(1)?.string_val()?;
            ctx.check_writable(ctx.peek(0)?)?;
            ctx.check_readable(ctx.peek(1)?)?;
            if src.len > dst.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            ctx.npop(2);

            let bytes = ctx.vm().string_bytes(src).to_vec();
            ctx.vm_mut().string_mut(dst)[..bytes.len()].copy_from_slice(&bytes);

            let sub = crate::object::StringSlice { len: src.len, ..dst };
            ctx.push(Object::new(Value::String(sub)))
        }

        Value::Dict(_) => {
            let dst = ctx.peek_dict(0)?;
            let src = ctx.peek(1)?.dict_val()?;
            ctx.check_writable(ctx.peek(0)?)?;
            ctx.check_readable(ctx.peek(1)?)?;
            ctx.npop(2);

            let entries: Vec<_> = ctx
                .vm()
                .dict(src)
                .iter_ordered()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in entries {
                ctx.vm_mut().dict_mut(dst).insert(key, value);
            }
            ctx.push(Object::new(Value::Dict(dst)))
        }

        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn index(ctx: &mut Context) -> PsResult<()> {
    let n = ctx.peek_usize(0)?;
    let obj = ctx.peek(1 + n)?.clone();
    ctx.npop(1);
    ctx.push(obj)
}

fn roll(ctx: &mut Context) -> PsResult<()> {
    let j = ctx.peek_int(0)?;
    let n = ctx.peek_usize(1)?;
    ctx.require(2 + n)?;
    ctx.npop(2);

    if n == 0 {
        return Ok(());
    }

    let len = ctx.op_stack.len();
    let window = &mut ctx.op_stack[len - n..];
    let shift = j.rem_euclid(n as i32) as usize;
    window.rotate_right(shift);
    Ok(())
}

fn clear(ctx: &mut Context) -> PsResult<()> {
    ctx.op_stack.clear();
    Ok(())
}

fn count(ctx: &mut Context) -> PsResult<()> {
    let n = ctx.op_stack.len() as i32;
    ctx.push(Object::int(n))
}

/// All marks are identical; the operand stack may hold any number of them.
fn mark(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::mark())
}

/// Index (from the top) of the topmost mark.
pub(super) fn find_mark(ctx: &Context) -> PsResult<usize> {
    ctx.op_stack
        .iter()
        .rev()
        .position(|obj| matches!(obj.value, Value::Mark))
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::UnmatchedMark))
}

fn cleartomark(ctx: &mut Context) -> PsResult<()> {
    let depth = find_mark(ctx)?;
    ctx.npop(depth + 1);
    Ok(())
}

fn counttomark(ctx: &mut Context) -> PsResult<()> {
    let depth = find_mark(ctx)?;
    ctx.push(Object::int(depth as i32))
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source, object::Value};

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    fn ints(ctx: &Context) -> Vec<i32> {
        ctx.op_stack
            .iter()
            .map(|obj| obj.int_val().unwrap())
            .collect()
    }

    #[test]
    fn exch_swaps() {
        assert_eq!(ints(&run(b"1 2 exch")), vec![2, 1]);
    }

    #[test]
    fn copy_duplicates_top_n() {
        assert_eq!(ints(&run(b"1 2 3 2 copy")), vec![1, 2, 3, 2, 3]);
        assert_eq!(ints(&run(b"1 2 3 0 copy")), vec![1, 2, 3]);
    }

    #[test]
    fn index_reaches_down() {
        assert_eq!(ints(&run(b"10 20 30 2 index")), vec![10, 20, 30, 10]);
    }

    #[test]
    fn roll_in_both_directions() {
        assert_eq!(ints(&run(b"1 2 3 3 1 roll")), vec![3, 1, 2]);
        assert_eq!(ints(&run(b"1 2 3 3 -1 roll")), vec![2, 3, 1]);
    }

    #[test]
    fn counttomark_counts_above_mark() {
        let ctx = run(b"mark 5 6 counttomark");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(2));
    }

    #[test]
    fn cleartomark_removes_through_mark() {
        let ctx = run(b"1 mark 5 6 cleartomark");
        assert_eq!(ints(&ctx), vec![1]);
    }

    #[test]
    fn copy_into_larger_array_returns_subarray() {
        let ctx = run(b"[1 2 3] 5 array copy length");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(3));
    }

    #[test]
    fn stackunderflow_keeps_stack() {
        let ctx = run(b"7 { exch } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        assert_eq!(ctx.op_stack[0].value, Value::Int(7));
    }
}
