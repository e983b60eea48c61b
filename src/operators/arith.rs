//! Arithmetic and math operators.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "add" => add,
        "sub" => sub,
        "mul" => mul,
        "div" => div,
        "idiv" => idiv,
        "mod" => mod_op,
        "abs" => abs,
        "neg" => neg,
        "ceiling" => ceiling,
        "floor" => floor,
        "round" => round,
        "truncate" => truncate,
        "sqrt" => sqrt,
        "atan" => atan,
        "cos" => cos,
        "sin" => sin,
        "exp" => exp,
        "ln" => ln,
        "log" => log,
        "rand" => rand,
        "srand" => srand,
        "rrand" => rrand,
    );
}

/// Integer arithmetic with overflow spill into reals.
fn binary(
    ctx: &mut Context,
    checked: impl Fn(i32, i32) -> Option<i32>,
    real: impl Fn(f32, f32) -> f32,
) -> PsResult<()> {
    let b = ctx.peek(0)?;
    let a = ctx.peek(1)?;

    if a.is_int() && b.is_int() {
        let x = a.int_val()?;
        let y = b.int_val()?;
        ctx.npop(2);
        return match checked(x, y) {
            Some(result) => ctx.push(Object::int(result)),
            None => ctx.push(Object::real(real(x as f32, y as f32))),
        };
    }

    let x = a.num_val()?;
    let y = b.num_val()?;
    ctx.npop(2);
    ctx.push(Object::real(real(x, y)))
}

fn add(ctx: &mut Context) -> PsResult<()> {
    binary(ctx, i32::checked_add, |a, b| a + b)
}

fn sub(ctx: &mut Context) -> PsResult<()> {
    binary(ctx, i32::checked_sub, |a, b| a - b)
}

fn mul(ctx: &mut Context) -> PsResult<()> {
    binary(ctx, i32::checked_mul, |a, b| a * b)
}

/// Always produces a real, even for integer operands.
fn div(ctx: &mut Context) -> PsResult<()> {
    let y = ctx.peek_num(0)?;
    let x = ctx.peek_num(1)?;
    if y == 0.0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    ctx.npop(2);
    ctx.push(Object::real(x / y))
}

fn idiv(ctx: &mut Context) -> PsResult<()> {
    let y = ctx.peek_int(0)?;
    let x = ctx.peek_int(1)?;
    if y == 0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    ctx.npop(2);
    ctx.push(Object::int(x.wrapping_div(y)))
}

fn mod_op(ctx: &mut Context) -> PsResult<()> {
    let y = ctx.peek_int(0)?;
    let x = ctx.peek_int(1)?;
    if y == 0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    ctx.npop(2);
    ctx.push(Object::int(x.wrapping_rem(y)))
}

fn abs(ctx: &mut Context) -> PsResult<()> {
    let top = ctx.peek(0)?;
    match top.value {
        Value::Int(n) => {
            ctx.npop(1);
            match n.checked_abs() {
                Some(v) => ctx.push(Object::int(v)),
                None => ctx.push(Object::real(-(n as f32))),
            }
        }
        Value::Real(r) => {
            ctx.npop(1);
            ctx.push(Object::real(r.abs()))
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn neg(ctx: &mut Context) -> PsResult<()> {
    let top = ctx.peek(0)?;
    match top.value {
        Value::Int(n) => {
            ctx.npop(1);
            match n.checked_neg() {
                Some(v) => ctx.push(Object::int(v)),
                None => ctx.push(Object::real(-(n as f32))),
            }
        }
        Value::Real(r) => {
            ctx.npop(1);
            ctx.push(Object::real(-r))
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

/// Rounding family: the result type follows the operand type.
fn rounding(ctx: &mut Context, f: impl Fn(f32) -> f32) -> PsResult<()> {
    let top = ctx.peek(0)?;
    match top.value {
        Value::Int(_) => Ok(()),
        Value::Real(r) => {
            ctx.npop(1);
            ctx.push(Object::real(f(r)))
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn ceiling(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, f32::ceil)
}

fn floor(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, f32::floor)
}

fn round(ctx: &mut Context) -> PsResult<()> {
    // ties round toward positive infinity
    rounding(ctx, |r| (r + 0.5).floor())
}

fn truncate(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, f32::trunc)
}

fn sqrt(ctx: &mut Context) -> PsResult<()> {
    let x = ctx.peek_num(0)?;
    if x < 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);
    ctx.push(Object::real(x.sqrt()))
}

/// num den atan => angle in degrees, 0 <= angle < 360.
fn atan(ctx: &mut Context) -> PsResult<()> {
    let den = ctx.peek_num(0)?;
    let num = ctx.peek_num(1)?;
    if num == 0.0 && den == 0.0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    ctx.npop(2);
    let degrees = num.atan2(den).to_degrees();
    ctx.push(Object::real(if degrees < 0.0 { degrees + 360.0 } else { degrees }))
}

fn cos(ctx: &mut Context) -> PsResult<()> {
    let x = ctx.peek_num(0)?;
    ctx.npop(1);
    ctx.push(Object::real(x.to_radians().cos()))
}

fn sin(ctx: &mut Context) -> PsResult<()> {
    let x = ctx.peek_num(0)?;
    ctx.npop(1);
    ctx.push(Object::real(x.to_radians().sin()))
}

/// base exponent exp => base^exponent, always a real.
fn exp(ctx: &mut Context) -> PsResult<()> {
    let exponent = ctx.peek_num(0)?;
    let base = ctx.peek_num(1)?;
    if base < 0.0 && exponent.fract() != 0.0 {
        anyhow::bail!(ErrorKind::UndefinedResult);
    }
    ctx.npop(2);
    ctx.push(Object::real(base.powf(exponent)))
}

fn ln(ctx: &mut Context) -> PsResult<()> {
    let x = ctx.peek_num(0)?;
    if x <= 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);
    ctx.push(Object::real(x.ln()))
}

fn log(ctx: &mut Context) -> PsResult<()> {
    let x = ctx.peek_num(0)?;
    if x <= 0.0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);
    ctx.push(Object::real(x.log10()))
}

fn rand(ctx: &mut Context) -> PsResult<()> {
    let value = ctx.rand();
    ctx.push(Object::int(value))
}

fn srand(ctx: &mut Context) -> PsResult<()> {
    let seed = ctx.peek_int(0)?;
    ctx.npop(1);
    ctx.srand(seed);
    Ok(())
}

fn rrand(ctx: &mut Context) -> PsResult<()> {
    let value = ctx.rrand();
    ctx.push(Object::int(value))
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
    fn integer_add() {
        assert_eq!(top(b"3 4 add"), Value::Int(7));
    }

    #[test]
    fn mixed_add_is_real() {
        assert_eq!(top(b"9.9 1.1 add"), Value::Real(11.0));
        assert_eq!(top(b"1 2.0 add"), Value::Real(3.0));
    }

    #[test]
    fn integer_overflow_spills_to_real() {
        assert_eq!(top(b"2147483647 1 add"), Value::Real(2147483648.0));
    }

    #[test]
    fn div_always_real() {
        assert_eq!(top(b"3 2 div"), Value::Real(1.5));
        assert_eq!(top(b"4 2 div"), Value::Real(2.0));
    }

    #[test]
    fn idiv_discards_fraction() {
        assert_eq!(top(b"7 2 idiv"), Value::Int(3));
        assert_eq!(top(b"-7 2 idiv"), Value::Int(-3));
    }

    #[test]
    fn mod_follows_dividend_sign() {
        assert_eq!(top(b"7 3 mod"), Value::Int(1));
        assert_eq!(top(b"-7 3 mod"), Value::Int(-1));
    }

    #[test]
    fn rounding_preserves_int_type() {
        assert_eq!(top(b"5 ceiling"), Value::Int(5));
        assert_eq!(top(b"4.2 ceiling"), Value::Real(5.0));
        assert_eq!(top(b"-4.5 round"), Value::Real(-4.0));
        assert_eq!(top(b"4.5 round"), Value::Real(5.0));
    }

    #[test]
    fn atan_full_circle() {
        assert_eq!(top(b"1 0 atan"), Value::Real(90.0));
        assert_eq!(top(b"-1 0 atan"), Value::Real(270.0));
    }

    #[test]
    fn division_by_zero_is_undefinedresult() {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, b"{ 1 0 div } stopped").unwrap();
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn srand_makes_rand_reproducible() {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, b"42 srand rand 42 srand rand").unwrap();
        let b = ctx.pop().unwrap().int_val().unwrap();
        let a = ctx.pop().unwrap().int_val().unwrap();
        assert_eq!(a, b);
        assert!(a >= 0);
    }
}
