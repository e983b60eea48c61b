//! Relational, boolean and bitwise operators.

use std::cmp::Ordering;

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "eq" => eq,
        "ne" => ne,
        "gt" => gt,
        "ge" => ge,
        "lt" => lt,
        "le" => le,
        "and" => and,
        "or" => or,
        "xor" => xor,
        "not" => not,
        "bitshift" => bitshift,
        "true" => true_op,
        "false" => false_op,
    );
}

fn eq(ctx: &mut Context) -> PsResult<()> {
    ctx.require(2)?;
    let b = ctx.pop()?;
    let a = ctx.pop()?;
    let result = ctx.objects_equal(&a, &b);
    ctx.push(Object::bool(result))
}

fn ne(ctx: &mut Context) -> PsResult<()> {
    ctx.require(2)?;
    let b = ctx.pop()?;
    let a = ctx.pop()?;
    let result = !ctx.objects_equal(&a, &b);
    ctx.push(Object::bool(result))
}

fn ordering(ctx: &mut Context, accept: impl Fn(Ordering) -> bool) -> PsResult<()> {
    let b = ctx.peek(0)?;
    let a = ctx.peek(1)?;
    ctx.check_readable(a)?;
    ctx.check_readable(b)?;
    let order = ctx.objects_compare(a, b)?;
    ctx.npop(2);
    ctx.push(Object::bool(accept(order)))
}

fn gt(ctx: &mut Context) -> PsResult<()> {
    ordering(ctx, |o| o == Ordering::Greater)
}

fn ge(ctx: &mut Context) -> PsResult<()> {
    ordering(ctx, |o| o != Ordering::Less)
}

fn lt(ctx: &mut Context) -> PsResult<()> {
    ordering(ctx, |o| o == Ordering::Less)
}

fn le(ctx: &mut Context) -> PsResult<()> {
    ordering(ctx, |o| o != Ordering::Greater)
}

/// Logical on booleans, bitwise on integers.
fn bitwise(
    ctx: &mut Context,
    logical: impl Fn(bool, bool) -> bool,
    bits: impl Fn(i32, i32) -> i32,
) -> PsResult<()> {
    let b = ctx.peek(0)?;
    let a = ctx.peek(1)?;

    match (&a.value, &b.value) {
        (Value::Bool(x), Value::Bool(y)) => {
            let result = logical(*x, *y);
            ctx.npop(2);
            ctx.push(Object::bool(result))
        }
        (Value::Int(x), Value::Int(y)) => {
            let result = bits(*x, *y);
            ctx.npop(2);
            ctx.push(Object::int(result))
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn and(ctx: &mut Context) -> PsResult<()> {
    bitwise(ctx, |a, b| a && b, |a, b| a & b)
}

fn or(ctx: &mut Context) -> PsResult<()> {
    bitwise(ctx, |a, b| a || b, |a, b| a | b)
}

fn xor(ctx: &mut Context) -> PsResult<()> {
    bitwise(ctx, |a, b| a != b, |a, b| a ^ b)
}

fn not(ctx: &mut Context) -> PsResult<()> {
    let top = ctx.peek(0)?;
    match top.value {
        Value::Bool(b) => {
            ctx.npop(1);
            ctx.push(Object::bool(!b))
        }
        Value::Int(n) => {
            ctx.npop(1);
            ctx.push(Object::int(!n))
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

/// Positive shift is left; negative is a zero-fill right shift over the
/// 32-bit pattern, not an arithmetic one.
fn bitshift(ctx: &mut Context) -> PsResult<()> {
    let shift = ctx.peek_int(0)?;
    let value = ctx.peek_int(1)?;
    ctx.npop(2);

    let result = if shift >= 0 {
        value.wrapping_shl(shift as u32)
    } else {
        ((value as u32).wrapping_shr((-shift) as u32)) as i32
    };
    ctx.push(Object::int(result))
}

fn true_op(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::bool(true))
}

fn false_op(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::bool(false))
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source, object::Value};

    fn top(src: &[u8]) -> Value {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx.op_stack.last().unwrap().value.clone()
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(top(b"4 4.0 eq"), Value::Bool(true));
        assert_eq!(top(b"4 4.5 ne"), Value::Bool(true));
    }

    #[test]
    fn string_and_name_compare_by_content() {
        assert_eq!(top(b"(abc) /abc eq"), Value::Bool(true));
        assert_eq!(top(b"(abc) (abd) lt"), Value::Bool(true));
    }

    #[test]
    fn separate_array_values_are_unequal() {
        assert_eq!(top(b"[1 2] [1 2] eq"), Value::Bool(false));
        assert_eq!(top(b"[1 2] dup eq"), Value::Bool(true));
    }

    #[test]
    fn bitwise_and_logical_forms() {
        assert_eq!(top(b"true false and"), Value::Bool(false));
        assert_eq!(top(b"12 10 and"), Value::Int(8));
        assert_eq!(top(b"12 10 xor"), Value::Int(6));
        assert_eq!(top(b"52 not"), Value::Int(-53));
    }

    #[test]
    fn bitshift_direction() {
        assert_eq!(top(b"7 3 bitshift"), Value::Int(56));
        assert_eq!(top(b"142 -3 bitshift"), Value::Int(17));
    }

    #[test]
    fn negative_value_right_shift_is_zero_fill() {
        assert_eq!(top(b"-8 -1 bitshift"), Value::Int(2147483644));
        assert_eq!(top(b"-1 -28 bitshift"), Value::Int(15));
    }
}
