//! String operators. The polymorphic element accessors live with the array
//! operators; here are the string-only ones.

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    object::{Object, Operator, StringSlice, Value},
    token,
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "string" => string,
        "search" => search,
        "anchorsearch" => anchorsearch,
        "token" => token_op,
    );
}

fn string(ctx: &mut Context) -> PsResult<()> {
    let len = ctx.peek_usize(0)?;
    ctx.npop(1);
    let slice = ctx.vm_mut().alloc_string(vec![0; len]);
    ctx.push(Object::new(Value::String(slice)))
}

fn subslice(slice: StringSlice, start: usize, len: usize) -> StringSlice {
    StringSlice { start: slice.start + start, len, ..slice }
}

/// string seek `search` post match pre true  |  string false
fn search(ctx: &mut Context) -> PsResult<()> {
    let seek = ctx.peek_string(0)?;
    let haystack = ctx.peek_string(1)?;
    ctx.check_readable(ctx.peek(0)?)?;
    ctx.check_readable(ctx.peek(1)?)?;

    let needle = ctx.vm().string_bytes(seek).to_vec();
    let bytes = ctx.vm().string_bytes(haystack);

    let found = if needle.is_empty() {
        Some(0)
    } else {
        bytes.windows(needle.len()).position(|w| w == needle)
    };

    match found {
        Some(pos) => {
            ctx.npop(2);
            let post = subslice(haystack, pos + needle.len(), haystack.len - pos - needle.len());
            let matched = subslice(haystack, pos, needle.len());
            let pre = subslice(haystack, 0, pos);
            ctx.push(Object::new(Value::String(post)))?;
            ctx.push(Object::new(Value::String(matched)))?;
            ctx.push(Object::new(Value::String(pre)))?;
            ctx.push(Object::bool(true))
        }
        None => {
            ctx.npop(1);
            ctx.push(Object::bool(false))
        }
    }
}

/// string seek `anchorsearch` post match true  |  string false
fn anchorsearch(ctx: &mut Context) -> PsResult<()> {
    let seek = ctx.peek_string(0)?;
    let haystack = ctx.peek_string(1)?;
    ctx.check_readable(ctx.peek(0)?)?;
    ctx.check_readable(ctx.peek(1)?)?;

    let needle = ctx.vm().string_bytes(seek).to_vec();
    let matches = ctx.vm().string_bytes(haystack).starts_with(&needle);

    if matches {
        ctx.npop(2);
        let post = subslice(haystack, needle.len(), haystack.len - needle.len());
        let matched = subslice(haystack, 0, needle.len());
        ctx.push(Object::new(Value::String(post)))?;
        ctx.push(Object::new(Value::String(matched)))?;
        ctx.push(Object::bool(true))
    } else {
        ctx.npop(1);
        ctx.push(Object::bool(false))
    }
}

/// Runs the tokenizer once against a string or file operand:
/// string `token` post any true | false
/// file `token` any true | false
fn token_op(ctx: &mut Context) -> PsResult<()> {
    match &ctx.peek(0)?.value {
        Value::String(slice) => {
            let slice = *slice;
            ctx.check_readable(ctx.peek(0)?)?;
            ctx.npop(1);
            match token::token_from_string(ctx, slice)? {
                Some((tok, rest)) => {
                    ctx.push(Object::new(Value::String(rest)))?;
                    ctx.push(tok)?;
                    ctx.push(Object::bool(true))
                }
                None => ctx.push(Object::bool(false)),
            }
        }
        Value::File(id) => {
            let id = *id;
            ctx.npop(1);
            let mut tokenizer = token::Tokenizer::for_file(ctx, id)?;
            match tokenizer.next_token(ctx)? {
                Some(tok) => {
                    ctx.push(tok)?;
                    ctx.push(Object::bool(true))
                }
                None => ctx.push(Object::bool(false)),
            }
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

    fn string_at(ctx: &Context, n: usize) -> Vec<u8> {
        let obj = &ctx.op_stack[ctx.op_stack.len() - 1 - n];
        ctx.vm().string_bytes(obj.string_val().unwrap()).to_vec()
    }

    #[test]
    fn search_splits_at_first_match() {
        let ctx = run(b"(abbc) (bb) search");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        assert_eq!(string_at(&ctx, 1), b"a");
        assert_eq!(string_at(&ctx, 2), b"bb");
        assert_eq!(string_at(&ctx, 3), b"c");
    }

    #[test]
    fn search_miss_leaves_string() {
        let ctx = run(b"(abc) (xy) search");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
        assert_eq!(string_at(&ctx, 1), b"abc");
    }

    #[test]
    fn anchorsearch_only_matches_prefix() {
        let ctx = run(b"(abc) (ab) anchorsearch");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        assert_eq!(string_at(&ctx, 1), b"ab");
        assert_eq!(string_at(&ctx, 2), b"c");

        let ctx = run(b"(abc) (bc) anchorsearch");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
    }

    #[test]
    fn token_reads_one_object() {
        let ctx = run(b"(15 moveto) token");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        assert_eq!(ctx.op_stack[ctx.op_stack.len() - 2].value, Value::Int(15));
        assert_eq!(string_at(&ctx, 2), b" moveto");
    }

    #[test]
    fn token_on_empty_string_reports_false() {
        let ctx = run(b"(   ) token");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
        assert_eq!(ctx.op_stack.len(), 1);
    }

    #[test]
    fn string_allocates_zeroed() {
        let ctx = run(b"4 string");
        assert_eq!(string_at(&ctx, 0), &[0, 0, 0, 0]);
    }
}
