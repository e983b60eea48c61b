//! Dictionary and dictionary-stack operators.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{DictKey, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "dict" => dict,
        ">>" => dict_close,
        "begin" => begin,
        "end" => end,
        "def" => def,
        "load" => load,
        "store" => store,
        "undef" => undef,
        "known" => known,
        "where" => where_op,
        "currentdict" => currentdict,
        "countdictstack" => countdictstack,
        "dictstack" => dictstack,
        "cleardictstack" => cleardictstack,
        "maxlength" => maxlength,
    );
}

fn dict(ctx: &mut Context) -> PsResult<()> {
    let capacity = ctx.peek_usize(0)?;
    ctx.npop(1);
    let obj = ctx.alloc_dict_obj(capacity);
    ctx.push(obj)
}

/// `>>`: builds a dictionary from key/value pairs down to the mark.
fn dict_close(ctx: &mut Context) -> PsResult<()> {
    let depth = super::stackops::find_mark(ctx)?;
    if depth % 2 != 0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }

    let len = ctx.op_stack.len();
    let pairs: Vec<Object> = ctx.op_stack[len - depth..].to_vec();

    let mut entries = Vec::with_capacity(depth / 2);
    for pair in pairs.chunks(2) {
        let key = DictKey::from_object(ctx, &pair[0])?;
        entries.push((key, pair[1].clone()));
    }

    ctx.npop(depth + 1);
    let handle = ctx.vm_mut().alloc_dict(entries.len());
    for (key, value) in entries {
        ctx.dict_put(handle, key, value)?;
    }
    ctx.push(Object::new(Value::Dict(handle)))
}

fn begin(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(0)?;
    ctx.check_readable(ctx.peek(0)?)?;
    ctx.npop(1);
    ctx.begin_dict(handle)
}

fn end(ctx: &mut Context) -> PsResult<()> {
    ctx.end_dict()
}

/// key value `def` - : associates key with value in the current dictionary.
fn def(ctx: &mut Context) -> PsResult<()> {
    ctx.require(2)?;
    let key = DictKey::from_object(ctx, ctx.peek(1)?)?;
    let value = ctx.peek(0)?.clone();
    ctx.define(key, value)?;
    ctx.npop(2);
    Ok(())
}

/// Like the name-resolution path but leaves the value on the operand stack
/// without executing it.
fn load(ctx: &mut Context) -> PsResult<()> {
    let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
    let value = ctx
        .lookup(&key)
        .ok_or_else(|| anyhow::anyhow!(ErrorKind::Undefined))?;
    ctx.npop(1);
    ctx.push(value)
}

/// Replaces the topmost existing binding, or defines in the current dict.
fn store(ctx: &mut Context) -> PsResult<()> {
    ctx.require(2)?;
    let key = DictKey::from_object(ctx, ctx.peek(1)?)?;
    let value = ctx.peek(0)?.clone();

    let target = ctx.where_defined(&key).unwrap_or_else(|| ctx.current_dict());
    ctx.dict_put(target, key, value)?;
    ctx.npop(2);
    Ok(())
}

fn undef(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(1)?;
    ctx.check_writable(ctx.peek(1)?)?;
    let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
    ctx.npop(2);
    ctx.vm_mut().dict_mut(handle).remove(&key);
    Ok(())
}

fn known(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(1)?;
    ctx.check_readable(ctx.peek(1)?)?;
    let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
    ctx.npop(2);
    let contains = ctx.vm().dict(handle).contains(&key);
    ctx.push(Object::bool(contains))
}

/// key `where` dict true | false
fn where_op(ctx: &mut Context) -> PsResult<()> {
    let key = DictKey::from_object(ctx, ctx.peek(0)?)?;
    ctx.npop(1);
    match ctx.where_defined(&key) {
        Some(handle) => {
            ctx.push(Object::new(Value::Dict(handle)))?;
            ctx.push(Object::bool(true))
        }
        None => ctx.push(Object::bool(false)),
    }
}

fn currentdict(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.current_dict();
    ctx.push(Object::new(Value::Dict(handle)))
}

fn countdictstack(ctx: &mut Context) -> PsResult<()> {
    let n = ctx.dict_stack.len() as i32;
    ctx.push(Object::int(n))
}

/// Fills a supplied array with the dictionary stack, bottom first.
fn dictstack(ctx: &mut Context) -> PsResult<()> {
    let slice = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let depth = ctx.dict_stack.len();
    if depth > slice.len {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);

    let dicts: Vec<Object> = ctx
        .dict_stack
        .iter()
        .map(|&handle| Object::new(Value::Dict(handle)))
        .collect();
    ctx.vm_mut().array_mut(slice)[..depth].clone_from_slice(&dicts);

    let sub = crate::object::ArraySlice { len: depth, ..slice };
    ctx.push(Object::new(Value::Array(sub)))
}

/// Pops down to the three permanent dictionaries.
fn cleardictstack(ctx: &mut Context) -> PsResult<()> {
    while ctx.dict_stack.len() > 3 {
        ctx.dict_stack.pop();
    }
    Ok(())
}

fn maxlength(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(0)?;
    ctx.check_readable(ctx.peek(0)?)?;
    ctx.npop(1);
    let capacity = ctx.vm().dict(handle).max_length() as i32;
    ctx.push(Object::int(capacity))
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
    fn def_and_load() {
        assert_eq!(top(b"/x 10 def /x load 5 add"), Value::Int(15));
    }

    #[test]
    fn def_targets_userdict_by_default() {
        let ctx = run(b"/x 10 def");
        let dict = ctx.vm().dict(ctx.user_dict);
        let value = dict.get(&crate::object::DictKey::name(b"x")).unwrap();
        assert_eq!(value.value, Value::Int(10));
    }

    #[test]
    fn begin_end_scoping() {
        assert_eq!(
            top(b"/x 1 def 4 dict begin /x 2 def x end x"),
            Value::Int(1)
        );
    }

    #[test]
    fn known_reports_membership() {
        assert_eq!(top(b"/d 4 dict def d /total 0 put d /total known"), Value::Bool(true));
        assert_eq!(top(b"/d 4 dict def d /nope known"), Value::Bool(false));
    }

    #[test]
    fn where_finds_the_holding_dict() {
        let ctx = run(b"/x 10 def /x where");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let dict = ctx.op_stack[ctx.op_stack.len() - 2].dict_val().unwrap();
        assert_eq!(dict, ctx.user_dict);
    }

    #[test]
    fn store_replaces_existing_binding() {
        assert_eq!(
            top(b"/x 1 def 4 dict begin /x 2 store end x"),
            Value::Int(2)
        );
    }

    #[test]
    fn double_angle_syntax_builds_dict() {
        assert_eq!(top(b"<< /a 1 /b 2 >> /b get"), Value::Int(2));
    }

    #[test]
    fn dict_keys_convert_strings_to_names() {
        assert_eq!(top(b"<< (key) 7 >> /key get"), Value::Int(7));
    }

    #[test]
    fn integer_and_real_keys_coincide() {
        assert_eq!(top(b"<< 1 /one >> 1.0 get"), Value::Name(crate::object::Name::new(b"one")));
    }

    #[test]
    fn systemdict_is_read_only() {
        let ctx = run(b"{ systemdict /foo 1 put } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidaccess");
    }

    #[test]
    fn undefined_load_raises() {
        let ctx = run(b"{ /missing load } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }
}
