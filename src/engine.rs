//! The execution engine: a single dispatch loop draining the execution stack.
//! Each iteration classifies the top object into one of five paths (literal,
//! operator, name, tokenizable, procedure) or advances a control-flow marker.

use log::{debug, trace};

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    graphics::{matrix::Matrix, path::PathSegment},
    object::{ArraySlice, Object, StringSlice, Value},
    operators,
    token::{self, Tokenizer},
};

/// Engine iterations between pump-callback invocations.
const PUMP_INTERVAL: u64 = 10_000;

/// Per-iteration state of an in-progress looping construct. The marker lives
/// on the execution stack; each dispatch advances exactly one iteration, so
/// `exit` and `stop` can unwind by scanning for markers instead of using host
/// control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopFrame {
    /// `loop`: runs until exit or stop.
    Loop { body: Object },

    Repeat { remaining: i32, body: Object },

    /// `for`: the control variable stays integral exactly when all three
    /// controlling operands were integers.
    For {
        control: f64,
        increment: f64,
        limit: f64,
        int_mode: bool,
        body: Object,
    },

    ForallArray { slice: ArraySlice, pos: usize, body: Object },
    ForallString { slice: StringSlice, pos: usize, body: Object },
    ForallDict { entries: Vec<(Object, Object)>, pos: usize, body: Object },

    /// `pathforall` reports coordinates in user space, through the inverse
    /// CTM captured when the loop started.
    PathForall {
        segments: Vec<PathSegment>,
        pos: usize,
        inverse_ctm: Matrix,
        move_proc: Object,
        line_proc: Object,
        curve_proc: Object,
        close_proc: Object,
    },

    FilenameForall {
        names: Vec<Vec<u8>>,
        pos: usize,
        scratch: StringSlice,
        body: Object,
    },

    /// `kshow`: runs the procedure between each pair of character codes while
    /// showing the string.
    Kshow { text: Vec<u8>, pos: usize, body: Object },

    /// `cshow`: runs the procedure for each code with its width, showing
    /// nothing itself.
    Cshow { text: Vec<u8>, pos: usize, body: Object },
}

/// Runs the engine until the execution stack drains. PostScript-level errors
/// are dispatched through the errordict protocol and do not return `Err`;
/// only host-level failures do.
pub fn run(ctx: &mut Context) -> PsResult<()> {
    run_loop(ctx, 0)
}

/// Executes one object synchronously: pushes a hard-return boundary, then the
/// object, and drains back down to the boundary. Used by operators that must
/// call back into PostScript (tint transforms, BuildChar-style callbacks).
pub fn call_procedure(ctx: &mut Context, proc: Object) -> PsResult<()> {
    let floor = ctx.exec_stack.len();
    ctx.push_exec(Object::new(Value::HardReturn))?;
    schedule(ctx, proc)?;
    run_loop(ctx, floor)
}

/// Pushes an object for execution, routing procedures through the deferred-
/// execution rule (a procedure pushed *for* execution runs; see `schedule` vs
/// the operand-stack push in the peeling path).
pub fn schedule(ctx: &mut Context, obj: Object) -> PsResult<()> {
    ctx.push_exec(obj)
}

fn pump_and_interrupt(ctx: &mut Context, iterations: u64) -> PsResult<()> {
    if iterations % PUMP_INTERVAL == 0 {
        if let Some(pump) = ctx.pump.as_mut() {
            pump();
        }
    }

    if ctx
        .interrupt_requested
        .swap(false, std::sync::atomic::Ordering::Relaxed)
    {
        anyhow::bail!(ErrorKind::Interrupt);
    }

    Ok(())
}

fn run_loop(ctx: &mut Context, floor: usize) -> PsResult<()> {
    let mut iterations: u64 = 0;

    loop {
        if ctx.exec_stack.len() <= floor {
            return Ok(());
        }
        if ctx.quit_requested {
            ctx.exec_stack.truncate(floor);
            return Ok(());
        }

        iterations += 1;

        let top = ctx.exec_stack.last().expect("checked above");

        // the marker frames never make useful $error commands
        let command = match &top.value {
            Value::Loop(_) | Value::Stopped | Value::HardReturn => Object::null(),
            _ => top.clone(),
        };

        if ctx.user_params.execution_history && !ctx.history_paused {
            let size = ctx.user_params.execution_history_size;
            let snapshot = command.clone();
            ctx.history.push_back(snapshot);
            while ctx.history.len() > size {
                ctx.history.pop_front();
            }
        }

        let outcome = pump_and_interrupt(ctx, iterations).and_then(|_| step(ctx, floor));

        if let Err(err) = outcome {
            match err.downcast_ref::<ErrorKind>() {
                Some(&kind) => handle_ps_error(ctx, kind, command, floor)?,
                None => return Err(err),
            }
        }
    }
}

/// One dispatch of the top of the execution stack.
fn step(ctx: &mut Context, floor: usize) -> PsResult<()> {
    let top = ctx.exec_stack.last().expect("caller checked");

    match &top.value {
        // -- control-flow markers ------------------------------------------
        Value::Stopped => {
            // reached naturally: no stop fired inside the boundary
            ctx.exec_stack.pop();
            ctx.push(Object::bool(false))?;
            Ok(())
        }
        Value::HardReturn => {
            // the embedded job is complete; return control to the caller
            ctx.exec_stack.pop();
            if ctx.exec_stack.len() < floor {
                debug!("hard-return boundary crossed its floor");
            }
            Ok(())
        }
        Value::Loop(_) => advance_loop(ctx),

        // -- path O: operator ----------------------------------------------
        Value::Operator(_) if top.is_executable() => {
            let op = match ctx.exec_stack.pop().map(|obj| obj.value) {
                Some(Value::Operator(op)) => op,
                _ => unreachable!("matched above"),
            };
            trace!("dispatch operator {}", op.name);
            (op.func)(ctx)
        }

        // -- path N: executable name ---------------------------------------
        Value::Name(name) if top.is_executable() => {
            let key = crate::object::DictKey::Name(name.clone());
            match ctx.lookup(&key) {
                Some(bound) => {
                    // the copy (operators are reused directly) replaces the
                    // name and is re-dispatched next iteration
                    *ctx.exec_stack.last_mut().expect("top exists") = bound;
                    Ok(())
                }
                None => {
                    ctx.exec_stack.pop();
                    anyhow::bail!(ErrorKind::Undefined);
                }
            }
        }

        // -- path T: tokenizable -------------------------------------------
        Value::String(slice) if top.is_executable() => {
            let slice = *slice;
            match token::token_from_string(ctx, slice)? {
                Some((tok, rest)) => {
                    if let Some(frame) = ctx.exec_stack.last_mut() {
                        frame.value = Value::String(rest);
                    }
                    dispatch_token(ctx, tok)
                }
                None => {
                    ctx.exec_stack.pop();
                    Ok(())
                }
            }
        }
        Value::File(id) if top.is_executable() => {
            let id = *id;
            if !ctx.files().is_open(id) {
                ctx.exec_stack.pop();
                return Ok(());
            }
            let mut tokenizer = Tokenizer::for_file(ctx, id)?;
            match tokenizer.next_token(ctx)? {
                Some(tok) => dispatch_token(ctx, tok),
                None => {
                    // reaching EOF closes the file and pops the stream
                    ctx.exec_stack.pop();
                    ctx.files_mut().close(id)?;
                    Ok(())
                }
            }
        }

        // -- path A: procedure ---------------------------------------------
        Value::Array(slice) | Value::PackedArray(slice) if top.is_executable() => {
            let slice = *slice;
            peel_procedure(ctx, slice)
        }

        // -- path L: literal (or self-pushing executable scalar) ------------
        Value::Null if top.is_executable() => {
            // executing null is a no-op
            ctx.exec_stack.pop();
            Ok(())
        }
        _ => {
            let obj = ctx.exec_stack.pop().expect("top exists");
            ctx.push(obj)
        }
    }
}

/// Peels the front element off a procedure on the execution stack. When one
/// element remains, the procedure frame is *replaced* by it: tail calls do not
/// grow the execution stack.
fn peel_procedure(ctx: &mut Context, slice: ArraySlice) -> PsResult<()> {
    if slice.len == 0 {
        ctx.exec_stack.pop();
        return Ok(());
    }

    let element = ctx.vm().array(slice)[0].clone();

    if slice.len == 1 {
        *ctx.exec_stack.last_mut().expect("top exists") = element;
        return Ok(());
    }

    let rest = ArraySlice {
        start: slice.start + 1,
        len: slice.len - 1,
        ..slice
    };
    match &mut ctx.exec_stack.last_mut().expect("top exists").value {
        Value::Array(s) | Value::PackedArray(s) => *s = rest,
        _ => unreachable!("caller matched a procedure"),
    }

    if needs_execution(&element) {
        ctx.push_exec(element)
    } else {
        // literals, and procedures encountered as data, go to the operand
        // stack; composite handles are slice copies over shared backing
        ctx.push(element)
    }
}

/// Whether an element peeled from a procedure executes rather than pushes.
/// Nested procedures are data (deferred execution).
fn needs_execution(obj: &Object) -> bool {
    if !obj.is_executable() {
        return false;
    }
    matches!(
        obj.value,
        Value::Name(_) | Value::Operator(_) | Value::Null
    )
}

/// Routes a token produced by path T. Procedures read from a stream are
/// deferred (pushed as data); everything else is pushed for execution.
fn dispatch_token(ctx: &mut Context, tok: Object) -> PsResult<()> {
    if tok.is_procedure() {
        ctx.push(tok)
    } else {
        ctx.push_exec(tok)
    }
}

/// One iteration of a loop marker on top of the execution stack.
fn advance_loop(ctx: &mut Context) -> PsResult<()> {
    let frame = match ctx.exec_stack.pop() {
        Some(Object { value: Value::Loop(frame), .. }) => *frame,
        _ => unreachable!("caller matched a loop marker"),
    };

    match frame {
        LoopFrame::Loop { body } => {
            requeue(ctx, LoopFrame::Loop { body: body.clone() })?;
            ctx.push_exec(body)
        }

        LoopFrame::Repeat { remaining, body } => {
            if remaining == 0 {
                return Ok(());
            }
            requeue(
                ctx,
                LoopFrame::Repeat { remaining: remaining - 1, body: body.clone() },
            )?;
            ctx.push_exec(body)
        }

        LoopFrame::For { control, increment, limit, int_mode, body } => {
            let finished = if increment >= 0.0 {
                control > limit
            } else {
                control < limit
            };
            if finished {
                return Ok(());
            }

            if int_mode {
                ctx.push(Object::int(control as i32))?;
            } else {
                ctx.push(Object::real(control as f32))?;
            }

            requeue(
                ctx,
                LoopFrame::For {
                    control: control + increment,
                    increment,
                    limit,
                    int_mode,
                    body: body.clone(),
                },
            )?;
            ctx.push_exec(body)
        }

        LoopFrame::ForallArray { slice, pos, body } => {
            if pos >= slice.len {
                return Ok(());
            }
            let element = ctx.vm().array(slice)[pos].clone();
            ctx.push(element)?;
            requeue(ctx, LoopFrame::ForallArray { slice, pos: pos + 1, body: body.clone() })?;
            ctx.push_exec(body)
        }

        LoopFrame::ForallString { slice, pos, body } => {
            if pos >= slice.len {
                return Ok(());
            }
            let byte = ctx.vm().string_bytes(slice)[pos];
            ctx.push(Object::int(byte as i32))?;
            requeue(ctx, LoopFrame::ForallString { slice, pos: pos + 1, body: body.clone() })?;
            ctx.push_exec(body)
        }

        LoopFrame::ForallDict { entries, pos, body } => {
            if pos >= entries.len() {
                return Ok(());
            }
            let (key, value) = entries[pos].clone();
            ctx.push(key)?;
            ctx.push(value)?;
            requeue(ctx, LoopFrame::ForallDict { entries, pos: pos + 1, body: body.clone() })?;
            ctx.push_exec(body)
        }

        LoopFrame::PathForall {
            segments,
            pos,
            inverse_ctm,
            move_proc,
            line_proc,
            curve_proc,
            close_proc,
        } => {
            if pos >= segments.len() {
                return Ok(());
            }
            let segment = segments[pos];
            let proc = match segment {
                PathSegment::MoveTo { .. } => move_proc.clone(),
                PathSegment::LineTo { .. } => line_proc.clone(),
                PathSegment::CurveTo { .. } => curve_proc.clone(),
                PathSegment::ClosePath => close_proc.clone(),
            };

            match segment {
                PathSegment::MoveTo { x, y } | PathSegment::LineTo { x, y } => {
                    let (ux, uy) = inverse_ctm.transform(x, y);
                    ctx.push(Object::real(ux))?;
                    ctx.push(Object::real(uy))?;
                }
                PathSegment::CurveTo { x1, y1, x2, y2, x3, y3 } => {
                    for (x, y) in [(x1, y1), (x2, y2), (x3, y3)] {
                        let (ux, uy) = inverse_ctm.transform(x, y);
                        ctx.push(Object::real(ux))?;
                        ctx.push(Object::real(uy))?;
                    }
                }
                PathSegment::ClosePath => {}
            }

            requeue(
                ctx,
                LoopFrame::PathForall {
                    segments,
                    pos: pos + 1,
                    inverse_ctm,
                    move_proc,
                    line_proc,
                    curve_proc,
                    close_proc,
                },
            )?;
            ctx.push_exec(proc)
        }

        LoopFrame::FilenameForall { names, pos, scratch, body } => {
            if pos >= names.len() {
                return Ok(());
            }
            let name = names[pos].clone();
            if name.len() > scratch.len {
                anyhow::bail!(ErrorKind::RangeCheck);
            }
            ctx.vm_mut().string_mut(scratch)[..name.len()].copy_from_slice(&name);
            let filled = StringSlice { len: name.len(), ..scratch };
            ctx.push(Object::new(Value::String(filled)))?;
            requeue(
                ctx,
                LoopFrame::FilenameForall { names, pos: pos + 1, scratch, body: body.clone() },
            )?;
            ctx.push_exec(body)
        }

        LoopFrame::Kshow { text, pos, body } => {
            if pos >= text.len() {
                return Ok(());
            }
            operators::font::show_char(ctx, text[pos])?;
            if pos + 1 < text.len() {
                ctx.push(Object::int(text[pos] as i32))?;
                ctx.push(Object::int(text[pos + 1] as i32))?;
                requeue(ctx, LoopFrame::Kshow { text, pos: pos + 1, body: body.clone() })?;
                ctx.push_exec(body)
            } else {
                Ok(())
            }
        }

        LoopFrame::Cshow { text, pos, body } => {
            if pos >= text.len() {
                return Ok(());
            }
            let code = text[pos];
            let (wx, wy) = operators::font::char_width(ctx, code)?;
            ctx.push(Object::int(code as i32))?;
            ctx.push(Object::real(wx))?;
            ctx.push(Object::real(wy))?;
            requeue(ctx, LoopFrame::Cshow { text, pos: pos + 1, body: body.clone() })?;
            ctx.push_exec(body)
        }
    }
}

fn requeue(ctx: &mut Context, frame: LoopFrame) -> PsResult<()> {
    ctx.push_exec(Object::new(Value::Loop(Box::new(frame))))
}

/// Installs a loop marker; used by the looping operators.
pub fn push_loop(ctx: &mut Context, frame: LoopFrame) -> PsResult<()> {
    requeue(ctx, frame)
}

/// `stop` semantics: unwind to the nearest `stopped` boundary and push true.
/// A hard-return boundary is never crossed; without a handler the current
/// job's work is discarded.
pub fn stop_unwind(ctx: &mut Context) {
    for i in (0..ctx.exec_stack.len()).rev() {
        match ctx.exec_stack[i].value {
            Value::Stopped => {
                ctx.exec_stack.truncate(i);
                // the boundary consumed; report that a stop occurred
                let _ = push_unchecked(ctx, Object::bool(true));
                return;
            }
            Value::HardReturn => {
                ctx.exec_stack.truncate(i + 1);
                return;
            }
            _ => {}
        }
    }
    ctx.exec_stack.clear();
}

/// `exit` semantics: discard everything up to and including the nearest loop
/// marker. Escaping a stopped or job boundary instead raises invalidexit.
pub fn exit_unwind(ctx: &mut Context) -> PsResult<()> {
    for i in (0..ctx.exec_stack.len()).rev() {
        match ctx.exec_stack[i].value {
            Value::Loop(_) => {
                ctx.exec_stack.truncate(i);
                return Ok(());
            }
            Value::Stopped | Value::HardReturn => break,
            _ => {}
        }
    }
    anyhow::bail!(ErrorKind::InvalidExit);
}

/// Pushes past the configured limit; the stop unwind must deliver its
/// boolean even when the operand stack is already at its cap.
fn push_unchecked(ctx: &mut Context, obj: Object) -> PsResult<()> {
    ctx.op_stack.push(obj);
    Ok(())
}

/// The error protocol: record the error and the offending command in
/// `$error`, consult errordict, and by default unwind to the nearest stopped
/// boundary. The live operand stack keeps exactly the operands the failed
/// instruction left behind; handlers inspect `$error` for the command.
fn handle_ps_error(
    ctx: &mut Context,
    kind: ErrorKind,
    command: Object,
    _floor: usize,
) -> PsResult<()> {
    debug!("postscript error {} from {:?}", kind.name(), command);

    ctx.history_paused = true;
    ctx.record_error(kind, &command);

    let binding = ctx
        .vm()
        .dict(ctx.error_dict)
        .get(&crate::object::DictKey::name(kind.name().as_bytes()))
        .cloned();

    match binding {
        Some(handler) if !operators::errorops::is_default_handler(&handler) => {
            // user-installed handler runs with $error already populated
            ctx.push_exec(handler)?;
        }
        _ => stop_unwind(ctx),
    }

    ctx.history_paused = false;
    Ok(())
}

/// Runs an executable string or file object as a complete program fragment.
pub fn run_object(ctx: &mut Context, obj: Object) -> PsResult<()> {
    call_procedure(ctx, obj)
}

/// Executes PostScript source against the context, as the `exec`ution of an
/// executable string. Library and test entry point.
pub fn run_source(ctx: &mut Context, source: &[u8]) -> PsResult<()> {
    let slice = ctx.vm_mut().alloc_string(source.to_vec());
    let program = Object::executable(Value::String(slice));
    call_procedure(ctx, program)
}

#[cfg(test)]
mod test {
    use super::*;

    fn run_program(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    #[test]
    fn literals_move_to_operand_stack() {
        let ctx = run_program(b"1 2.5 true /name (str) mark");
        assert_eq!(ctx.op_stack.len(), 6);
        assert_eq!(ctx.op_stack[0].value, Value::Int(1));
        assert_eq!(ctx.op_stack[5].value, Value::Mark);
    }

    #[test]
    fn name_resolution_executes_bound_procedure() {
        let ctx = run_program(b"/double { 2 mul } def 21 double");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(42));
    }

    #[test]
    fn undefined_name_runs_error_protocol() {
        let ctx = run_program(b"{ nosuchthing } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let dict = ctx.vm().dict(ctx.dollar_error);
        let name = dict
            .get(&crate::object::DictKey::name(b"errorname"))
            .unwrap()
            .clone();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"undefined");
    }

    #[test]
    fn nested_procedures_are_deferred() {
        let ctx = run_program(b"{ {1} } exec");
        // the inner procedure landed on the operand stack unexecuted
        assert!(ctx.op_stack.last().unwrap().is_procedure());
    }

    #[test]
    fn deep_tail_recursion_does_not_grow_exec_stack() {
        let ctx = run_program(
            b"/count 0 def /again { /count count 1 add def count 3000 lt { again } if } def again",
        );
        let bound = ctx.lookup_name(b"count").unwrap();
        assert_eq!(bound.value, Value::Int(3000));
    }

    #[test]
    fn stopped_reports_false_without_stop() {
        let ctx = run_program(b"{ 1 2 add } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
        assert_eq!(ctx.op_stack[ctx.op_stack.len() - 2].value, Value::Int(3));
    }

    #[test]
    fn stop_unwinds_to_stopped_boundary() {
        let ctx = run_program(b"{ 1 stop 2 } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        // the 2 never executed
        assert_eq!(ctx.op_stack[ctx.op_stack.len() - 2].value, Value::Int(1));
    }

    #[test]
    fn exit_outside_loop_is_invalidexit() {
        let ctx = run_program(b"{ exit } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let dict = ctx.vm().dict(ctx.dollar_error);
        let name = dict
            .get(&crate::object::DictKey::name(b"errorname"))
            .unwrap()
            .clone();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidexit");
    }

    #[test]
    fn executable_string_tokenizes_on_demand() {
        let ctx = run_program(b"(3 4 add) cvx exec");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Int(7));
    }

    #[test]
    fn error_leaves_operands_intact() {
        let ctx = run_program(b"(keep) 5 { 1 (two) add } stopped");
        // true from stopped above exactly the operands the failed add saw
        assert_eq!(ctx.op_stack.len(), 5);
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let kept = ctx.op_stack[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(kept), b"keep");
        assert_eq!(ctx.op_stack[1].value, Value::Int(5));
        assert_eq!(ctx.op_stack[2].value, Value::Int(1));
        assert!(matches!(ctx.op_stack[3].value, Value::String(_)));
    }

    #[test]
    fn error_does_not_push_command_onto_operand_stack() {
        let ctx = run_program(b"{ 1 0 div } stopped");
        // the div operands and the stopped result, nothing else
        assert_eq!(ctx.op_stack.len(), 3);
        assert_eq!(ctx.op_stack[0].value, Value::Int(1));
        assert_eq!(ctx.op_stack[1].value, Value::Int(0));
        assert_eq!(ctx.op_stack[2].value, Value::Bool(true));

        // the command is reported through $error instead
        let dict = ctx.vm().dict(ctx.dollar_error);
        let command = dict
            .get(&crate::object::DictKey::name(b"command"))
            .unwrap();
        assert!(matches!(command.value, Value::Operator(op) if op.name == "div"));
    }
}
