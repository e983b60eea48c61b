//! Device setup and interpreter-parameter operators.

use log::debug;

use crate::{
    context::Context,
    engine,
    error::{ErrorKind, PsResult},
    object::{DictKey, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "setpagedevice" => setpagedevice,
        "currentpagedevice" => currentpagedevice,
        "nulldevice" => nulldevice,
        "setsystemparams" => setsystemparams,
        "currentsystemparams" => currentsystemparams,
        "setuserparams" => setuserparams,
        "currentuserparams" => currentuserparams,
        "setdevparams" => setdevparams,
        "currentdevparams" => currentdevparams,
    );
}

/// Merges a request dictionary into the page device, reinitializes the
/// graphics state, and runs the Install procedure.
fn setpagedevice(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(0)?;
    let mut device = ctx.page_device.clone();
    device.merge_from(ctx, handle)?;
    ctx.npop(1);

    debug!(
        "setpagedevice: output={} size={:?}",
        String::from_utf8_lossy(&device.output_device),
        device.page_size
    );
    ctx.page_device = device;
    ctx.gstate.reset_core();

    if let Some(install) = ctx.page_device.install.clone() {
        engine::call_procedure(ctx, install)?;
    }
    Ok(())
}

fn currentpagedevice(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.vm_mut().alloc_dict(16);
    let device = ctx.page_device.clone();
    device.write_into(ctx, handle);
    ctx.push(Object::new(Value::Dict(handle)))
}

/// Paints nowhere: an empty page size and no output device.
fn nulldevice(ctx: &mut Context) -> PsResult<()> {
    ctx.page_device.output_device = b"null".to_vec();
    ctx.gstate.reset_core();
    Ok(())
}

/// The StartJobPassword is write-only: accepted here, never reported back.
fn setsystemparams(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(0)?;
    let store = ctx.vm().dict(handle);

    let mut password = None;
    if let Some(obj) = store.get(&DictKey::name(b"StartJobPassword")) {
        password = Some(match &obj.value {
            Value::String(slice) => ctx.vm().string_bytes(*slice).to_vec(),
            Value::Int(n) => n.to_string().into_bytes(),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        });
    }
    let max_font_cache = store
        .get(&DictKey::name(b"MaxFontCache"))
        .map(|obj| obj.int_val())
        .transpose()?;

    ctx.npop(1);
    if let Some(password) = password {
        ctx.system_params.start_job_password = password;
    }
    if let Some(max) = max_font_cache {
        ctx.system_params.max_font_cache = max;
    }
    Ok(())
}

fn currentsystemparams(ctx: &mut Context) -> PsResult<()> {
    let max_font_cache = ctx.system_params.max_font_cache;
    let handle = ctx.vm_mut().alloc_dict(4);
    ctx.dict_put(handle, DictKey::name(b"MaxFontCache"), Object::int(max_font_cache))?;
    ctx.push(Object::new(Value::Dict(handle)))
}

fn setuserparams(ctx: &mut Context) -> PsResult<()> {
    let handle = ctx.peek_dict(0)?;
    let store = ctx.vm().dict(handle);

    let get_int = |key: &[u8]| -> PsResult<Option<i32>> {
        store
            .get(&DictKey::name(key))
            .map(|obj| obj.int_val())
            .transpose()
    };
    let get_bool = |key: &[u8]| -> PsResult<Option<bool>> {
        store
            .get(&DictKey::name(key))
            .map(|obj| obj.bool_val())
            .transpose()
    };

    let max_op = get_int(b"MaxOpStack")?;
    let max_exec = get_int(b"MaxExecStack")?;
    let max_dict = get_int(b"MaxDictStack")?;
    let history = get_bool(b"ExecutionHistory")?;
    let history_size = get_int(b"ExecutionHistorySize")?;
    ctx.npop(1);

    if let Some(n) = max_op {
        if n < 0 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        ctx.user_params.max_op_stack = n as usize;
    }
    if let Some(n) = max_exec {
        if n < 0 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        ctx.user_params.max_exec_stack = n as usize;
    }
    if let Some(n) = max_dict {
        if n < 0 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        ctx.user_params.max_dict_stack = n as usize;
    }
    if let Some(enabled) = history {
        ctx.user_params.execution_history = enabled;
    }
    if let Some(n) = history_size {
        if n <= 0 {
            anyhow::bail!(ErrorKind::RangeCheck);
        }
        ctx.user_params.execution_history_size = n as usize;
        ctx.history.truncate(n as usize);
    }
    Ok(())
}

fn currentuserparams(ctx: &mut Context) -> PsResult<()> {
    let params = ctx.user_params.clone();
    let handle = ctx.vm_mut().alloc_dict(8);
    ctx.dict_put(handle, DictKey::name(b"MaxOpStack"), Object::int(params.max_op_stack as i32))?;
    ctx.dict_put(
        handle,
        DictKey::name(b"MaxExecStack"),
        Object::int(params.max_exec_stack as i32),
    )?;
    ctx.dict_put(
        handle,
        DictKey::name(b"MaxDictStack"),
        Object::int(params.max_dict_stack as i32),
    )?;
    ctx.dict_put(
        handle,
        DictKey::name(b"ExecutionHistory"),
        Object::bool(params.execution_history),
    )?;
    ctx.dict_put(
        handle,
        DictKey::name(b"ExecutionHistorySize"),
        Object::int(params.execution_history_size as i32),
    )?;
    ctx.push(Object::new(Value::Dict(handle)))
}

/// Device parameter sets are recognized but carry nothing here.
fn setdevparams(ctx: &mut Context) -> PsResult<()> {
    ctx.peek_dict(0)?;
    ctx.peek_string(1)?;
    ctx.npop(2);
    Ok(())
}

fn currentdevparams(ctx: &mut Context) -> PsResult<()> {
    ctx.peek_string(0)?;
    ctx.npop(1);
    let obj = ctx.alloc_dict_obj(0);
    ctx.push(obj)
}

#[cfg(test)]
mod test {
    use crate::{context::Context, engine::run_source, object::Value};

    fn run(src: &[u8]) -> Context {
        let mut ctx = Context::new(true);
        run_source(&mut ctx, src).unwrap();
        ctx
    }

    #[test]
    fn setpagedevice_updates_page_size() {
        let ctx = run(b"<< /PageSize [300 400] >> setpagedevice");
        assert_eq!(ctx.page_device.page_size, (300.0, 400.0));
    }

    #[test]
    fn currentpagedevice_reports_recognized_keys() {
        let ctx = run(b"currentpagedevice /PageSize get 0 get");
        assert_eq!(ctx.op_stack.last().unwrap().num_val().unwrap(), 612.0);
        let ctx = run(b"currentpagedevice /.IsPageDevice get");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
    }

    #[test]
    fn install_proc_runs_against_new_device() {
        let ctx = run(b"<< /Install { 2 2 scale } >> setpagedevice 1 0 transform");
        assert_eq!(ctx.op_stack[0].num_val().unwrap(), 2.0);
    }

    #[test]
    fn user_params_resize_stacks() {
        let ctx = run(b"<< /MaxOpStack 4 >> setuserparams { 1 2 3 4 5 } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"stackoverflow");
    }

    #[test]
    fn execution_history_records_dispatches() {
        let ctx = run(b"<< /ExecutionHistory true /ExecutionHistorySize 5 >> setuserparams 1 2 add");
        assert!(!ctx.history.is_empty());
        assert!(ctx.history.len() <= 5);
    }

    #[test]
    fn password_is_write_only() {
        let ctx = run(b"<< /StartJobPassword (secret) >> setsystemparams currentsystemparams /StartJobPassword known");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
        assert_eq!(ctx.system_params.start_job_password, b"secret");
    }
}
