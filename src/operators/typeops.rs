//! Type, attribute and conversion operators.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{Access, Attrib, Name, Object, Operator, StringSlice, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "type" => type_op,
        "cvlit" => cvlit,
        "cvx" => cvx,
        "xcheck" => xcheck,
        "executeonly" => executeonly,
        "noaccess" => noaccess,
        "readonly" => readonly,
        "rcheck" => rcheck,
        "wcheck" => wcheck,
        "cvi" => cvi,
        "cvn" => cvn,
        "cvr" => cvr,
        "cvrs" => cvrs,
        "cvs" => cvs,
        "null" => null,
    );
}

fn type_op(ctx: &mut Context) -> PsResult<()> {
    let name = ctx.peek(0)?.type_name();
    ctx.npop(1);
    ctx.push(Object::executable_name(name))
}

/// Attribute changes operate on the popped copy; a value fetched from a
/// dictionary is never itself modified.
fn cvlit(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let mut obj = ctx.pop()?;
    obj.attrib = Attrib::Literal;
    ctx.push(obj)
}

fn cvx(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let mut obj = ctx.pop()?;
    obj.attrib = Attrib::Executable;
    ctx.push(obj)
}

fn xcheck(ctx: &mut Context) -> PsResult<()> {
    let executable = ctx.peek(0)?.is_executable();
    ctx.npop(1);
    ctx.push(Object::bool(executable))
}

fn set_access(ctx: &mut Context, requested: Access) -> PsResult<()> {
    let obj = ctx.peek(0)?;
    match &obj.value {
        Value::Dict(handle) => {
            // dictionary access lives on the shared store
            let handle = *handle;
            let current = ctx.vm().dict(handle).access;
            ctx.vm_mut().dict_mut(handle).access = current.tightened_to(requested);
            Ok(())
        }
        Value::Array(_) | Value::PackedArray(_) | Value::String(_) | Value::File(_) => {
            let mut obj = ctx.pop()?;
            obj.access = obj.access.tightened_to(requested);
            ctx.push(obj)
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn executeonly(ctx: &mut Context) -> PsResult<()> {
    // execute-only does not apply to dictionaries
    if matches!(ctx.peek(0)?.value, Value::Dict(_)) {
        anyhow::bail!(ErrorKind::TypeCheck);
    }
    set_access(ctx, Access::ExecuteOnly)
}

fn noaccess(ctx: &mut Context) -> PsResult<()> {
    set_access(ctx, Access::None)
}

fn readonly(ctx: &mut Context) -> PsResult<()> {
    set_access(ctx, Access::ReadOnly)
}

fn rcheck(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?;
    let access = match &obj.value {
        Value::Dict(handle) => ctx.vm().dict(*handle).access,
        Value::Array(_) | Value::PackedArray(_) | Value::String(_) | Value::File(_) => obj.access,
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    ctx.npop(1);
    ctx.push(Object::bool(access.allows(Access::ReadOnly)))
}

fn wcheck(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?;
    let access = match &obj.value {
        Value::Dict(handle) => ctx.vm().dict(*handle).access,
        Value::Array(_) | Value::PackedArray(_) | Value::String(_) | Value::File(_) => obj.access,
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    ctx.npop(1);
    ctx.push(Object::bool(access.allows(Access::Unlimited)))
}

fn parse_numeric_string(ctx: &Context, slice: StringSlice) -> PsResult<f32> {
    let bytes = ctx.vm().string_bytes(slice);
    let text = std::str::from_utf8(bytes)
        .map_err(|_| anyhow::anyhow!(ErrorKind::TypeCheck))?
        .trim();
    text.parse::<f32>()
        .map_err(|_| anyhow::anyhow!(ErrorKind::TypeCheck))
}

/// Truncation toward zero; a real outside integer range is undefinedresult.
fn cvi(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?;
    let value = match &obj.value {
        Value::Int(n) => {
            let n = *n;
            ctx.npop(1);
            return ctx.push(Object::int(n));
        }
        Value::Real(r) => *r,
        Value::String(slice) => {
            ctx.check_readable(obj)?;
            parse_numeric_string(ctx, *slice)?
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };

    let truncated = value.trunc();
    if truncated < i32::MIN as f32 || truncated > i32::MAX as f32 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);
    ctx.push(Object::int(truncated as i32))
}

fn cvr(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?;
    let value = match &obj.value {
        Value::Int(n) => *n as f32,
        Value::Real(r) => *r,
        Value::String(slice) => {
            ctx.check_readable(obj)?;
            parse_numeric_string(ctx, *slice)?
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    ctx.npop(1);
    ctx.push(Object::real(value))
}

fn cvn(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?;
    let slice = obj.string_val()?;
    ctx.check_readable(obj)?;
    let attrib = obj.attrib;
    let bytes = ctx.vm().string_bytes(slice).to_vec();
    ctx.npop(1);

    let mut name = Object::new(Value::Name(Name::from_vec(bytes)));
    name.attrib = attrib;
    ctx.push(name)
}

/// any string `cvs` substring : writes the text form into the supplied string
/// and returns the filled prefix.
fn cvs(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_string(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let text = ctx.to_text_repr(ctx.peek(1)?);
    if text.len() > target.len {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(2);

    ctx.vm_mut().string_mut(target)[..text.len()].copy_from_slice(&text);
    let sub = StringSlice { len: text.len(), ..target };
    ctx.push(Object::new(Value::String(sub)))
}

/// num radix string `cvrs` substring : radix conversion of the integer value,
/// digits above 9 as uppercase letters.
fn cvrs(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_string(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let radix = ctx.peek_int(1)?;
    if !(2..=36).contains(&radix) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    let number = ctx.peek(2)?;
    if !number.is_number() {
        anyhow::bail!(ErrorKind::TypeCheck);
    }

    let text = if radix == 10 {
        ctx.to_text_repr(number)
    } else {
        // non-decimal radixes render the 32-bit two's-complement value
        let value = match number.value {
            Value::Int(n) => n as u32,
            Value::Real(r) => r.trunc() as i64 as u32,
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        };
        radix_digits(value, radix as u32)
    };

    if text.len() > target.len {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(3);

    ctx.vm_mut().string_mut(target)[..text.len()].copy_from_slice(&text);
    let sub = StringSlice { len: text.len(), ..target };
    ctx.push(Object::new(Value::String(sub)))
}

fn radix_digits(mut value: u32, radix: u32) -> Vec<u8> {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return b"0".to_vec();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % radix) as usize]);
        value /= radix;
    }
    out.reverse();
    out
}

fn null(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::null())
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source, object::Value};

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    fn top(src: &[u8]) -> Value {
        run(src).op_stack.last().unwrap().value.clone()
    }

    fn top_string(src: &[u8]) -> Vec<u8> {
        let ctx = run(src);
        let slice = ctx.op_stack.last().unwrap().string_val().unwrap();
        ctx.vm().string_bytes(slice).to_vec()
    }

    #[test]
    fn type_names() {
        let ctx = run(b"42 type 4.2 type (s) type /n type [1] type");
        let names: Vec<_> = ctx
            .op_stack
            .iter()
            .map(|o| o.name_val().unwrap().as_bytes().to_vec())
            .collect();
        assert_eq!(
            names,
            vec![
                b"integertype".to_vec(),
                b"realtype".to_vec(),
                b"stringtype".to_vec(),
                b"nametype".to_vec(),
                b"arraytype".to_vec()
            ]
        );
    }

    #[test]
    fn cvx_cvlit_round_trips_attribute() {
        assert_eq!(top(b"/x cvx xcheck"), Value::Bool(true));
        assert_eq!(top(b"/x cvx cvlit xcheck"), Value::Bool(false));
    }

    #[test]
    fn cvlit_does_not_mutate_dictionary_entry() {
        // the copy fetched by the name lookup is modified, not the binding
        let ctx = run(b"/p {1} def /p load cvlit pop p");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(1));
    }

    #[test]
    fn cvi_truncates() {
        assert_eq!(top(b"3.7 cvi"), Value::Int(3));
        assert_eq!(top(b"-3.7 cvi"), Value::Int(-3));
        assert_eq!(top(b"(42) cvi"), Value::Int(42));
    }

    #[test]
    fn cvr_widens() {
        assert_eq!(top(b"7 cvr"), Value::Real(7.0));
        assert_eq!(top(b"(1.5) cvr"), Value::Real(1.5));
    }

    #[test]
    fn cvs_writes_prefix() {
        assert_eq!(top_string(b"123 10 string cvs"), b"123");
        assert_eq!(top_string(b"true 10 string cvs"), b"true");
        assert_eq!(top_string(b"7.0 10 string cvs"), b"7.0");
    }

    #[test]
    fn cvrs_hex() {
        assert_eq!(top_string(b"255 16 5 string cvrs"), b"FF");
        assert_eq!(top_string(b"-1 16 10 string cvrs"), b"FFFFFFFF");
    }

    #[test]
    fn readonly_after_executeonly_stays_executeonly() {
        assert_eq!(top(b"[1] executeonly readonly rcheck"), Value::Bool(false));
    }

    #[test]
    fn noaccess_blocks_reads() {
        let ctx = run(b"{ [1 2] noaccess 0 get } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn cvn_preserves_attribute() {
        assert_eq!(top(b"(abc) cvx cvn xcheck"), Value::Bool(true));
        assert_eq!(top(b"(abc) cvn xcheck"), Value::Bool(false));
    }
}
