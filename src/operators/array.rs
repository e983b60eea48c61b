//! Array and packed-array operators, plus the polymorphic container access
//! operators (length/get/put/getinterval/putinterval) they share with
//! dictionaries and strings.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{Access, ArraySlice, DictKey, Object, Operator, StringSlice, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "array" => array,
        "]" => array_close,
        "length" => length,
        "get" => get,
        "put" => put,
        "getinterval" => getinterval,
        "putinterval" => putinterval,
        "aload" => aload,
        "astore" => astore,
        "packedarray" => packedarray,
        "setpacking" => setpacking,
        "currentpacking" => currentpacking,
    );
}

fn array(ctx: &mut Context) -> PsResult<()> {
    let len = ctx.peek_usize(0)?;
    ctx.npop(1);
    let obj = ctx.alloc_array_obj(vec![Object::null(); len]);
    ctx.push(obj)
}

/// `]`: builds an array from the operand stack down to the matching mark.
fn array_close(ctx: &mut Context) -> PsResult<()> {
    let depth = super::stackops::find_mark(ctx)?;
    let len = ctx.op_stack.len();
    let elements: Vec<Object> = ctx.op_stack[len - depth..].to_vec();
    ctx.npop(depth + 1);
    let obj = ctx.alloc_array_obj(elements);
    ctx.push(obj)
}

fn length(ctx: &mut Context) -> PsResult<()> {
    let top = ctx.peek(0)?;
    ctx.check_readable(top)?;
    let len = match &top.value {
        Value::Array(slice) | Value::PackedArray(slice) => slice.len,
        Value::String(slice) => slice.len,
        Value::Dict(handle) => ctx.vm().dict(*handle).len(),
        Value::Name(name) => name.len(),
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    ctx.npop(1);
    ctx.push(Object::int(len as i32))
}

fn get(ctx: &mut Context) -> PsResult<()> {
    let container = ctx.peek(1)?;
    ctx.check_readable(container)?;

    match &container.value {
        Value::Array(slice) | Value::PackedArray(slice) => {
            let slice = *slice;
            let index = ctx.peek_usize(0)?;
            if index >= slice.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let element = ctx.vm().array(slice)[index].clone();
            ctx.npop(2);
            ctx.push(element)
        }
        Value::String(slice) => {
            let slice = *slice;
            let index = ctx.peek_usize(0)?;
            if index >= slice.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let byte = ctx.vm().string_bytes(slice)[index];
            ctx.npop(2);
            ctx.push(Object::int(byte as i32))
        }
        Value::Dict(handle) => {
            let handle = *handle;
            let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
            let value = ctx
                .vm()
                .dict(handle)
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!(ErrorKind::Undefined))?;
            ctx.npop(2);
            ctx.push(value)
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn put(ctx: &mut Context) -> PsResult<()> {
    let container = ctx.peek(2)?;
    ctx.check_writable(container)?;

    match &container.value {
        Value::Array(slice) => {
            let slice = *slice;
            let index = ctx.peek_usize(1)?;
            if index >= slice.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let value = ctx.peek(0)?.clone();
            if slice.global && value.is_composite() && !value.is_global() {
                anyhow::bail!(ErrorKind::InvalidAccess);
            }
            ctx.npop(3);
            ctx.vm_mut().array_mut(slice)[index] = value;
            Ok(())
        }
        Value::String(slice) => {
            let slice = *slice;
            let index = ctx.peek_usize(1)?;
            if index >= slice.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let byte = ctx.peek_int(0)?;
            if !(0..=255).contains(&byte) {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            ctx.npop(3);
            ctx.vm_mut().string_mut(slice)[index] = byte as u8;
            Ok(())
        }
        Value::Dict(handle) => {
            let handle = *handle;
            let key = DictKey::from_object(ctx, ctx.peek(1)?)?;
            let value = ctx.peek(0)?.clone();
            ctx.npop(3);
            ctx.dict_put(handle, key, value)
        }
        Value::PackedArray(_) => anyhow::bail!(ErrorKind::InvalidAccess),
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

/// Yields a view sharing the backing store.
fn getinterval(ctx: &mut Context) -> PsResult<()> {
    let container = ctx.peek(2)?;
    ctx.check_readable(container)?;
    let count = ctx.peek_usize(0)?;
    let index = ctx.peek_usize(1)?;

    match &container.value {
        Value::Array(slice) | Value::PackedArray(slice) => {
            let slice = *slice;
            if index + count > slice.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let packed = matches!(container.value, Value::PackedArray(_));
            let attrib = container.attrib;
            let access = container.access;
            ctx.npop(3);

            let sub = ArraySlice { start: slice.start + index, len: count, ..slice };
            let mut obj = Object::new(if packed {
                Value::PackedArray(sub)
            } else {
                Value::Array(sub)
            });
            obj.attrib = attrib;
            obj.access = access;
            ctx.push(obj)
        }
        Value::String(slice) => {
            let slice = *slice;
            if index + count > slice.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            let access = container.access;
            ctx.npop(3);

            let sub = StringSlice { start: slice.start + index, len: count, ..slice };
            let mut obj = Object::new(Value::String(sub));
            obj.access = access;
            ctx.push(obj)
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

fn putinterval(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek(2)?;
    ctx.check_writable(target)?;
    let source = ctx.peek(0)?;
    ctx.check_readable(source)?;
    let index = ctx.peek_usize(1)?;

    match (&target.value, &source.value) {
        (Value::Array(dst), Value::Array(src) | Value::PackedArray(src)) => {
            let (dst, src) = (*dst, *src);
            if index + src.len > dst.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            ctx.npop(3);
            let elements = ctx.vm().array(src).to_vec();
            ctx.vm_mut().array_mut(dst)[index..index + elements.len()]
                .clone_from_slice(&elements);
            Ok(())
        }
        (Value::String(dst), Value::String(src)) => {
            let (dst, src) = (*dst, *src);
            if index + src.len > dst.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            ctx.npop(3);
            let bytes = ctx.vm().string_bytes(src).to_vec();
            ctx.vm_mut().string_mut(dst)[index..index + bytes.len()].copy_from_slice(&bytes);
            Ok(())
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

/// Pushes every element, then the array itself.
fn aload(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?.clone();
    ctx.check_readable(&obj)?;
    let slice = obj.array_val()?;
    ctx.require(1)?;
    ctx.npop(1);

    let elements = ctx.vm().array(slice).to_vec();
    for element in elements {
        ctx.push(element)?;
    }
    ctx.push(obj)
}

/// Stores the len topmost objects into the array.
fn astore(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.peek(0)?.clone();
    ctx.check_writable(&obj)?;
    let slice = match obj.value {
        Value::Array(slice) => slice,
        Value::PackedArray(_) => anyhow::bail!(ErrorKind::InvalidAccess),
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };
    ctx.require(1 + slice.len)?;
    ctx.npop(1);

    let base = ctx.op_stack.len() - slice.len;
    let elements: Vec<Object> = ctx.op_stack[base..].to_vec();
    ctx.npop(slice.len);
    ctx.vm_mut().array_mut(slice).clone_from_slice(&elements);
    ctx.push(obj)
}

/// `n packedarray`: builds a read-only packed array from the top n objects.
fn packedarray(ctx: &mut Context) -> PsResult<()> {
    let n = ctx.peek_usize(0)?;
    ctx.require(1 + n)?;
    ctx.npop(1);

    let base = ctx.op_stack.len() - n;
    let elements: Vec<Object> = ctx.op_stack[base..].to_vec();
    ctx.npop(n);

    let slice = ctx.vm_mut().alloc_array(elements);
    let mut obj = Object::new(Value::PackedArray(slice));
    obj.access = Access::ReadOnly;
    ctx.push(obj)
}

fn setpacking(ctx: &mut Context) -> PsResult<()> {
    let mode = ctx.peek_bool(0)?;
    ctx.npop(1);
    ctx.packing_mode = mode;
    Ok(())
}

fn currentpacking(ctx: &mut Context) -> PsResult<()> {
    let mode = ctx.packing_mode;
    ctx.push(Object::bool(mode))
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

    #[test]
    fn bracket_syntax_builds_array() {
        assert_eq!(top(b"[1 2 3] length"), Value::Int(3));
    }

    #[test]
    fn operators_inside_brackets_execute() {
        assert_eq!(top(b"[1 2 add] 0 get"), Value::Int(3));
    }

    #[test]
    fn get_and_put_round_trip() {
        assert_eq!(top(b"3 array dup 1 /x put 1 get"), Value::Name(crate::object::Name::new(b"x")));
    }

    #[test]
    fn getinterval_shares_backing() {
        // mutating through the view is visible through the original
        assert_eq!(top(b"[10 20 30 40] dup 1 2 getinterval 0 99 put dup 1 get"), Value::Int(99));
    }

    #[test]
    fn putinterval_on_shared_string() {
        let ctx = run(b"(hello) dup 0 (H) putinterval");
        let slice = ctx.op_stack.last().unwrap().string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"Hello");
    }

    #[test]
    fn aload_spreads_elements() {
        let ctx = run(b"[1 2 3] aload pop");
        let ints: Vec<i32> = ctx.op_stack.iter().map(|o| o.int_val().unwrap()).collect();
        assert_eq!(ints, vec![1, 2, 3]);
    }

    #[test]
    fn astore_collects_elements() {
        assert_eq!(top(b"10 20 30 3 array astore 2 get"), Value::Int(30));
    }

    #[test]
    fn out_of_bounds_get_is_rangecheck() {
        let ctx = run(b"{ [1 2] 5 get } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"rangecheck");
    }

    #[test]
    fn packed_arrays_are_read_only() {
        let ctx = run(b"{ 1 2 2 packedarray 0 99 put } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidaccess");
    }

    #[test]
    fn setpacking_makes_scanner_emit_packed_procs() {
        let ctx = run(b"true setpacking { 1 } true setpacking");
        let proc = &ctx.op_stack[0];
        assert!(matches!(proc.value, Value::PackedArray(_)));
    }
}
