//! Virtual-memory operators: save/restore, allocation mode, and the
//! startjob/exitserver job-boundary escape.

use log::debug;

use crate::{
    context::Context,
    error::{ErrorKind, PsResult},
    graphics::state::GSaveEntry,
    object::{Object, Operator, SaveId, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "save" => save,
        "restore" => restore,
        "setglobal" => setglobal,
        "currentglobal" => currentglobal,
        "gcheck" => gcheck,
        "vmstatus" => vmstatus,
        "startjob" => startjob,
        "exitserver" => exitserver,
    );
}

fn save(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.vm_mut().save(false);
    let snapshot = ctx.gstate.clone();
    ctx.gsave_push(GSaveEntry::from_save(snapshot, id))?;
    ctx.push(Object::new(Value::Save(id)))
}

/// Pops saves down to the operand's snapshot: reinstates protected backing
/// stores, drops composites allocated since, and reinstalls the graphics
/// state captured by `save`.
fn restore(ctx: &mut Context) -> PsResult<()> {
    let id = match ctx.peek(0)?.value {
        Value::Save(id) => id,
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    };

    if !ctx.vm().is_valid_save(id) {
        anyhow::bail!(ErrorKind::InvalidRestore);
    }

    // a composite newer than the snapshot still reachable from a stack makes
    // the restore illegal; the save operand itself is exempt
    let (local_marks, global_marks) = ctx.vm().save_marks(id).expect("validated above");
    let newer = |obj: &Object| ctx.vm().allocated_after(obj, local_marks, global_marks);

    if ctx.op_stack[..ctx.op_stack.len() - 1].iter().any(newer)
        || ctx.exec_stack.iter().any(newer)
    {
        anyhow::bail!(ErrorKind::InvalidRestore);
    }
    for &handle in &ctx.dict_stack {
        if newer(&Object::new(Value::Dict(handle))) {
            anyhow::bail!(ErrorKind::InvalidRestore);
        }
    }

    // the graphics-save boundary for this snapshot must still exist
    if !ctx
        .gsave_stack
        .iter()
        .any(|entry| entry.save_id == Some(id))
    {
        anyhow::bail!(ErrorKind::InvalidRestore);
    }

    ctx.npop(1);
    pop_graphics_to_save(ctx, id);
    ctx.vm_mut().restore(id)
}

/// Unwinds the graphics-save stack through the boundary pushed by save `id`,
/// reinstating its snapshot (the grestoreall-then-remove of the reference
/// semantics).
pub(crate) fn pop_graphics_to_save(ctx: &mut Context, id: SaveId) {
    while let Some(entry) = ctx.gsave_stack.pop() {
        if entry.save_id == Some(id) {
            ctx.gstate = entry.state;
            return;
        }
    }
    debug!("restore found no graphics boundary for save {:?}", id);
}

fn setglobal(ctx: &mut Context) -> PsResult<()> {
    let mode = ctx.peek_bool(0)?;
    ctx.npop(1);
    ctx.vm_mut().alloc_global = mode;
    Ok(())
}

fn currentglobal(ctx: &mut Context) -> PsResult<()> {
    let mode = ctx.vm().alloc_global;
    ctx.push(Object::bool(mode))
}

/// Whether the operand's backing store lives in global VM; simple objects
/// report true.
fn gcheck(ctx: &mut Context) -> PsResult<()> {
    let global = ctx.peek(0)?.is_global();
    ctx.npop(1);
    ctx.push(Object::bool(global))
}

fn vmstatus(ctx: &mut Context) -> PsResult<()> {
    let (level, used, maximum) = ctx.vm().status();
    ctx.push(Object::int(level))?;
    ctx.push(Object::int(used))?;
    ctx.push(Object::int(maximum))
}

fn password_matches(ctx: &Context, operand: &Object) -> PsResult<bool> {
    let expected = &ctx.system_params.start_job_password;
    Ok(match &operand.value {
        Value::String(slice) => ctx.vm().string_bytes(*slice) == &expected[..],
        Value::Int(n) => n.to_string().as_bytes() == &expected[..],
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    })
}

/// Core of `startjob`: ends the current job and begins a new one. Returns
/// false (leaving state untouched) unless the context supports encapsulation,
/// the password matches, and save nesting is back at the job-entry level.
pub(super) fn try_start_job(ctx: &mut Context, unencapsulated: bool) -> PsResult<bool> {
    let record = match ctx.job_records.last().copied() {
        Some(record) => record,
        None => return Ok(false),
    };

    if !ctx.job_server_mode || ctx.vm().save_level() != record.entry_level {
        return Ok(false);
    }

    debug!(
        "startjob: ending current job (encapsulated={}), next unencapsulated={}",
        record.save.is_some(),
        unencapsulated
    );

    // end the current job
    ctx.op_stack.clear();
    ctx.reset_dict_stack();
    if let Some(id) = record.save {
        pop_graphics_to_save(ctx, id);
        ctx.vm_mut().restore(id)?;
    }

    // begin the new one
    let new_record = if unencapsulated {
        crate::context::JobRecord { save: None, entry_level: ctx.vm().save_level() }
    } else {
        let id = ctx.vm_mut().save(true);
        let snapshot = ctx.gstate.clone();
        ctx.gsave_push(GSaveEntry::from_save(snapshot, id))?;
        crate::context::JobRecord { save: Some(id), entry_level: ctx.vm().save_level() }
    };
    *ctx.job_records.last_mut().expect("checked above") = new_record;

    Ok(true)
}

/// bool password `startjob` bool
fn startjob(ctx: &mut Context) -> PsResult<()> {
    ctx.require(2)?;
    let matches = password_matches(ctx, ctx.peek(0)?)?;
    let unencapsulated = ctx.peek_bool(1)?;

    if !matches {
        ctx.npop(2);
        return ctx.push(Object::bool(false));
    }

    ctx.npop(2);
    let started = try_start_job(ctx, unencapsulated)?;
    ctx.push(Object::bool(started))
}

/// Level 1 equivalent of `true password startjob`; on failure raises
/// invalidaccess instead of returning false.
fn exitserver(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let matches = password_matches(ctx, ctx.peek(0)?)?;
    if !matches {
        anyhow::bail!(ErrorKind::InvalidAccess);
    }
    ctx.npop(1);

    if !try_start_job(ctx, true)? {
        anyhow::bail!(ErrorKind::InvalidAccess);
    }

    ctx.write_stdout(b"%%[exitserver: permanent state may be changed]%%\n")?;
    let server = ctx.server_dict;
    ctx.dict_stack.retain(|&handle| handle != server);
    Ok(())
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
    fn restore_rolls_back_def() {
        assert_eq!(
            top(b"/x 10 def save /x 20 def restore /x load"),
            Value::Int(10)
        );
    }

    #[test]
    fn restore_rolls_back_definitions_made_after_save() {
        let ctx = run(b"save /y 1 def restore { /y load } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn save_restore_reinstates_string_contents() {
        let ctx = run(b"(abc) save 1 index 0 88 put restore");
        let slice = ctx.op_stack[0].string_val().unwrap();
        assert_eq!(ctx.vm().string_bytes(slice), b"abc");
    }

    #[test]
    fn restore_reinstates_graphics_state() {
        let ctx = run(b"5 setlinewidth save 9 setlinewidth restore currentlinewidth");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Real(5.0));
    }

    #[test]
    fn stale_save_object_is_invalidrestore() {
        let ctx = run(b"save dup restore { restore } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidrestore");
    }

    #[test]
    fn composite_made_after_save_blocks_restore() {
        let ctx = run(b"save (new string) exch { restore } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidrestore");
    }

    #[test]
    fn gcheck_and_setglobal() {
        assert_eq!(top(b"(local) gcheck"), Value::Bool(false));
        assert_eq!(top(b"true setglobal (global) gcheck false setglobal"), Value::Bool(true));
        assert_eq!(top(b"42 gcheck"), Value::Bool(true));
    }

    #[test]
    fn currentglobal_tracks_mode() {
        assert_eq!(top(b"true setglobal currentglobal false setglobal"), Value::Bool(true));
        assert_eq!(top(b"currentglobal"), Value::Bool(false));
    }

    #[test]
    fn vmstatus_reports_save_level() {
        let ctx = run(b"save vmstatus");
        // maximum, used, level under the one save
        let level = ctx.op_stack[ctx.op_stack.len() - 3].int_val().unwrap();
        assert_eq!(level, 1);
    }

    #[test]
    fn startjob_without_job_server_returns_false() {
        // run_source does not establish a job record
        assert_eq!(top(b"false () startjob"), Value::Bool(false));
    }
}
