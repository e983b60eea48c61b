//! Control-flow operators. The looping constructs install marker frames on
//! the execution stack; the engine advances them one iteration per dispatch.

use crate::{
    context::Context,
    engine::{self, LoopFrame},
    error::{ErrorKind, PsResult},
    file::STDIN,
    object::{Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "exec" => exec,
        "if" => if_op,
        "ifelse" => ifelse,
        "for" => for_op,
        "repeat" => repeat,
        "loop" => loop_op,
        "forall" => forall,
        "exit" => exit,
        "stop" => stop,
        "stopped" => stopped,
        "countexecstack" => countexecstack,
        "execstack" => execstack,
        "quit" => quit,
        "start" => start,
    );
}

fn exec(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let obj = ctx.pop()?;
    ctx.push_exec(obj)
}

fn if_op(ctx: &mut Context) -> PsResult<()> {
    let proc = ctx.peek_proc(0)?;
    let condition = ctx.peek_bool(1)?;
    ctx.npop(2);

    if condition {
        ctx.push_exec(proc)?;
    }
    Ok(())
}

fn ifelse(ctx: &mut Context) -> PsResult<()> {
    let else_proc = ctx.peek_proc(0)?;
    let then_proc = ctx.peek_proc(1)?;
    let condition = ctx.peek_bool(2)?;
    ctx.npop(3);

    ctx.push_exec(if condition { then_proc } else { else_proc })
}

/// initial increment limit proc `for` - : the control variable stays an
/// integer exactly when all three controlling operands are integers.
fn for_op(ctx: &mut Context) -> PsResult<()> {
    let body = ctx.peek_proc(0)?;
    let limit = ctx.peek_num(1)? as f64;
    let increment = ctx.peek_num(2)? as f64;
    let initial = ctx.peek_num(3)? as f64;
    let int_mode =
        ctx.peek(1)?.is_int() && ctx.peek(2)?.is_int() && ctx.peek(3)?.is_int();
    ctx.npop(4);

    engine::push_loop(
        ctx,
        LoopFrame::For { control: initial, increment, limit, int_mode, body },
    )
}

fn repeat(ctx: &mut Context) -> PsResult<()> {
    let body = ctx.peek_proc(0)?;
    let count = ctx.peek_int(1)?;
    if count < 0 {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(2);

    engine::push_loop(ctx, LoopFrame::Repeat { remaining: count, body })
}

fn loop_op(ctx: &mut Context) -> PsResult<()> {
    let body = ctx.peek_proc(0)?;
    ctx.npop(1);
    engine::push_loop(ctx, LoopFrame::Loop { body })
}

fn forall(ctx: &mut Context) -> PsResult<()> {
    let body = ctx.peek_proc(0)?;
    let container = ctx.peek(1)?;
    ctx.check_readable(container)?;

    let frame = match &container.value {
        Value::Array(slice) | Value::PackedArray(slice) => {
            LoopFrame::ForallArray { slice: *slice, pos: 0, body }
        }
        Value::String(slice) => LoopFrame::ForallString { slice: *slice, pos: 0, body },
        Value::Dict(handle) => {
            let entries: Vec<(Object, Object)> = ctx
                .vm()
                .dict(*handle)
                .iter_ordered()
                .map(|(key, value)| (key_object(key), value.clone()))
                .collect();
            LoopFrame::ForallDict { entries, pos: 0, body }
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };

    ctx.npop(2);
    engine::push_loop(ctx, frame)
}

fn key_object(key: &crate::object::DictKey) -> Object {
    match key {
        crate::object::DictKey::Name(name) => Object::new(Value::Name(name.clone())),
        crate::object::DictKey::Int(n) => Object::int(*n),
        crate::object::DictKey::RealBits(bits) => Object::real(f32::from_bits(*bits)),
        crate::object::DictKey::Bool(b) => Object::bool(*b),
    }
}

fn exit(ctx: &mut Context) -> PsResult<()> {
    engine::exit_unwind(ctx)
}

fn stop(ctx: &mut Context) -> PsResult<()> {
    engine::stop_unwind(ctx);
    Ok(())
}

/// any `stopped` bool : executes the object inside a boundary the engine
/// recognizes; `stop` (and the error protocol) unwinds to it.
fn stopped(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let obj = ctx.pop()?;
    ctx.push_exec(Object::new(Value::Stopped))?;
    ctx.push_exec(obj)
}

fn countexecstack(ctx: &mut Context) -> PsResult<()> {
    let n = ctx.exec_stack.len() as i32;
    ctx.push(Object::int(n))
}

/// Fills the supplied array with the execution stack; internal marker frames
/// are reported as null.
fn execstack(ctx: &mut Context) -> PsResult<()> {
    let slice = ctx.peek_array(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let depth = ctx.exec_stack.len();
    if depth > slice.len {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(1);

    let frames: Vec<Object> = ctx
        .exec_stack
        .iter()
        .map(|frame| match frame.value {
            Value::Stopped | Value::Loop(_) | Value::HardReturn => Object::null(),
            _ => frame.clone(),
        })
        .collect();
    ctx.vm_mut().array_mut(slice)[..depth].clone_from_slice(&frames);

    let sub = crate::object::ArraySlice { len: depth, ..slice };
    ctx.push(Object::new(Value::Array(sub)))
}

fn quit(ctx: &mut Context) -> PsResult<()> {
    ctx.quit_requested = true;
    Ok(())
}

/// Runs the standard input stream as a program.
fn start(ctx: &mut Context) -> PsResult<()> {
    ctx.push_exec(Object::executable(Value::File(STDIN)))
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

    fn ints(ctx: &Context) -> Vec<i32> {
        ctx.op_stack.iter().map(|o| o.int_val().unwrap()).collect()
    }

    #[test]
    fn ifelse_picks_branch() {
        assert_eq!(top(b"true {1} {2} ifelse"), Value::Int(1));
        assert_eq!(top(b"false {1} {2} ifelse"), Value::Int(2));
    }

    #[test]
    fn for_accumulates() {
        assert_eq!(top(b"0 1 1 4 {add} for"), Value::Int(10));
    }

    #[test]
    fn for_leaves_control_values() {
        assert_eq!(ints(&run(b"1 2 6 { } for")), vec![1, 3, 5]);
    }

    #[test]
    fn for_control_is_real_when_any_operand_is() {
        let ctx = run(b"3 -.5 1 { } for");
        assert_eq!(ctx.op_stack.len(), 5);
        assert!(matches!(ctx.op_stack[0].value, Value::Real(v) if v == 3.0));
        assert!(matches!(ctx.op_stack[4].value, Value::Real(v) if v == 1.0));
    }

    #[test]
    fn for_control_stays_int_for_int_operands() {
        let ctx = run(b"1 1 3 { } for");
        assert_eq!(ints(&ctx), vec![1, 2, 3]);
        assert!(ctx.op_stack.iter().all(|o| o.is_int()));
    }

    #[test]
    fn repeat_runs_n_times() {
        assert_eq!(ints(&run(b"3 { 7 } repeat")), vec![7, 7, 7]);
    }

    #[test]
    fn exit_breaks_nearest_loop() {
        assert_eq!(ints(&run(b"0 { 1 add dup 3 ge { exit } if } loop")), vec![3]);
    }

    #[test]
    fn exit_breaks_only_inner_loop() {
        let ctx = run(b"2 { 1 { exit } loop 9 } repeat");
        assert_eq!(ints(&ctx), vec![1, 9, 1, 9]);
    }

    #[test]
    fn forall_over_array_dict_string() {
        assert_eq!(top(b"0 [1 2 3] { add } forall"), Value::Int(6));
        assert_eq!(top(b"0 (abc) { add } forall"), Value::Int(294));
        assert_eq!(top(b"0 << /a 1 /b 2 >> { exch pop add } forall"), Value::Int(3));
    }

    #[test]
    fn stopped_false_on_clean_run() {
        assert_eq!(top(b"{ 1 pop } stopped"), Value::Bool(false));
    }

    #[test]
    fn stopped_true_after_stop() {
        assert_eq!(top(b"{ stop } stopped"), Value::Bool(true));
    }

    #[test]
    fn stopped_executes_literals_too() {
        let ctx = run(b"(data) stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
        assert!(matches!(ctx.op_stack[0].value, Value::String(_)));
    }

    #[test]
    fn exec_runs_procedures() {
        assert_eq!(top(b"{ 2 3 mul } exec"), Value::Int(6));
    }

    #[test]
    fn exec_of_literal_pushes_it() {
        assert_eq!(top(b"42 exec"), Value::Int(42));
    }
}
