//! Miscellaneous and environment operators: bind, interpreter identity,
//! timers, internaldict and the eexec filter.

use log::debug;

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    filters,
    object::{Access, ArraySlice, DictKey, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "bind" => bind,
        "version" => version,
        "realtime" => realtime,
        "usertime" => usertime,
        "languagelevel" => languagelevel,
        "product" => product,
        "revision" => revision,
        "serialnumber" => serialnumber,
        "internaldict" => internaldict,
        "eexec" => eexec,
    );
}

/// Replaces executable operator names in a procedure with the operators
/// themselves, recursing into nested procedures. Read-only arrays are left
/// alone; packed arrays are processed despite their access.
fn bind(ctx: &mut Context) -> PsResult<()> {
    let proc = ctx.peek_proc(0)?;
    let slice = proc.array_val()?;
    let skip = matches!(proc.value, Value::Array(_)) && !proc.access.allows(Access::Unlimited);
    if !skip {
        bind_procedure(ctx, slice)?;
    }
    Ok(())
}

fn bind_procedure(ctx: &mut Context, slice: ArraySlice) -> PsResult<()> {
    let elements = ctx.vm().array(slice).to_vec();

    for (i, element) in elements.into_iter().enumerate() {
        match &element.value {
            Value::Name(name) if element.is_executable() => {
                if let Some(bound) = ctx.lookup(&DictKey::Name(name.clone())) {
                    if matches!(bound.value, Value::Operator(_)) {
                        ctx.vm_mut().array_mut(slice)[i] = bound;
                    }
                }
            }
            Value::Array(nested) if element.is_executable() => {
                let nested = *nested;
                if element.access.allows(Access::Unlimited) {
                    bind_procedure(ctx, nested)?;
                    let slot = &mut ctx.vm_mut().array_mut(slice)[i];
                    slot.access = slot.access.tightened_to(Access::ReadOnly);
                }
            }
            Value::PackedArray(nested) if element.is_executable() => {
                bind_procedure(ctx, *nested)?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn version(ctx: &mut Context) -> PsResult<()> {
    let obj = ctx.alloc_string_obj(b"3010".to_vec());
    ctx.push(obj)
}

fn realtime(ctx: &mut Context) -> PsResult<()> {
    let t = ctx.realtime();
    ctx.push(Object::int(t))
}

fn usertime(ctx: &mut Context) -> PsResult<()> {
    let t = ctx.usertime();
    ctx.push(Object::int(t))
}

fn languagelevel(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::int(2))
}

fn product(ctx: &mut Context) -> PsResult<()> {
    let mut obj = ctx.alloc_string_obj(b"PostForge".to_vec());
    obj.access = Access::ReadOnly;
    ctx.push(obj)
}

fn revision(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::int(1))
}

fn serialnumber(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::int(0))
}

const INTERNALDICT_KEY: i32 = 1_183_615_869;

fn internaldict(ctx: &mut Context) -> PsResult<()> {
    let key = ctx.peek_int(0)?;
    if key != INTERNALDICT_KEY {
        anyhow::bail!(ErrorKind::InvalidAccess);
    }
    ctx.npop(1);
    let handle = ctx.internal_dict;
    ctx.push(Object::new(Value::Dict(handle)))
}

/// Switches the operand source to its eexec-decrypted remainder. Used by
/// Type 1 font programs; charstring interpretation stays external.
fn eexec(ctx: &mut Context) -> PsResult<()> {
    match &ctx.peek(0)?.value {
        Value::File(id) => {
            let id = *id;
            ctx.npop(1);

            let cursor = ctx.files().cursor(id)?;
            let mut remainder = Vec::new();
            let mut pos = cursor;
            while let Some(byte) = ctx.files().byte_at(id, pos) {
                remainder.push(byte);
                pos += 1;
            }

            // skip the single whitespace separating eexec from its data
            let start = remainder
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(remainder.len());
            let body = &remainder[start..];

            let cipher = if filters::eexec_section_is_hex(body) {
                filters::decode_hex_body(body)?
            } else {
                body.to_vec()
            };

            debug!("eexec: decrypting {} bytes", cipher.len());
            let plain = filters::eexec_decrypt(&cipher);
            ctx.files_mut().splice_input(id, plain)
        }
        Value::String(slice) => {
            let slice = *slice;
            ctx.npop(1);

            let body = ctx.vm().string_bytes(slice).to_vec();
            let cipher = if filters::eexec_section_is_hex(&body) {
                filters::decode_hex_body(&body)?
            } else {
                body
            };
            let plain = filters::eexec_decrypt(&cipher);

            let id = ctx.files_mut().open_input(b"%eexec".to_vec(), plain);
            ctx.push_exec(Object::executable(Value::File(id)))
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
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
    fn bind_replaces_operator_names() {
        let ctx = run(b"{ 1 2 add } bind");
        let slice = ctx.op_stack.last().unwrap().array_val().unwrap();
        let body = ctx.vm().array(slice);
        assert!(matches!(body[2].value, Value::Operator(op) if op.name == "add"));
    }

    #[test]
    fn bind_leaves_non_operator_names() {
        let ctx = run(b"/myproc { 1 } def { myproc } bind");
        let slice = ctx.op_stack.last().unwrap().array_val().unwrap();
        let body = ctx.vm().array(slice);
        assert!(matches!(body[0].value, Value::Name(_)));
    }

    #[test]
    fn bind_recurses_and_seals_nested_procs() {
        let ctx = run(b"{ { add } exec } bind");
        // after bind, the nested proc's add became an operator, so exec of it
        // still works
        assert_eq!(top(b"{ { 1 2 add } exec } bind exec"), Value::Int(3));
        drop(ctx);
    }

    #[test]
    fn languagelevel_is_two() {
        assert_eq!(top(b"languagelevel"), Value::Int(2));
    }

    #[test]
    fn internaldict_needs_magic_number() {
        assert!(matches!(top(b"1183615869 internaldict"), Value::Dict(_)));
        let ctx = run(b"{ 1 internaldict } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn usertime_is_monotonic() {
        let ctx = run(b"usertime usertime");
        let later = ctx.op_stack[1].int_val().unwrap();
        let earlier = ctx.op_stack[0].int_val().unwrap();
        assert!(later >= earlier);
    }
}
