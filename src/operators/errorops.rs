//! The error operators and errordict seeding.

use crate::{
    context::Context,
    engine,
    error::{ErrorKind, PsResult},
    object::{DictKey, Object, Operator, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "handleerror" => handleerror,
        ".stderror" => std_error,
    );
}

/// The sentinel installed for every error name in errordict. The engine
/// recognizes it and runs the default record-and-stop path; executing it
/// directly just stops.
fn std_error(ctx: &mut Context) -> PsResult<()> {
    engine::stop_unwind(ctx);
    Ok(())
}

/// Whether an errordict binding is still the default sentinel (as opposed to
/// a user-installed handler procedure).
pub(crate) fn is_default_handler(obj: &Object) -> bool {
    matches!(&obj.value, Value::Operator(op) if op.name == ".stderror")
}

pub(super) fn seed_errordict(ctx: &mut Context) {
    let sentinel = Operator { name: ".stderror", func: std_error };
    let errordict = ctx.error_dict;
    for kind in ErrorKind::ALL {
        ctx.define_in(errordict, kind.name().as_bytes(), Object::operator(sentinel));
    }
    ctx.define_in(
        errordict,
        b"handleerror",
        Object::operator(Operator { name: "handleerror", func: handleerror }),
    );
}

/// Writes the standard error report from `$error` and clears the newerror
/// flag.
fn handleerror(ctx: &mut Context) -> PsResult<()> {
    let dollar = ctx.dollar_error;
    let store = ctx.vm().dict(dollar);

    let errorname = store
        .get(&DictKey::name(b"errorname"))
        .cloned()
        .unwrap_or_else(Object::null);
    let command = store
        .get(&DictKey::name(b"command"))
        .cloned()
        .unwrap_or_else(Object::null);

    let mut report = Vec::new();
    report.extend_from_slice(b"%%[ Error: ");
    report.extend_from_slice(&ctx.to_text_repr(&errorname));
    report.extend_from_slice(b"; OffendingCommand: ");
    report.extend_from_slice(&ctx.to_text_repr(&command));
    report.extend_from_slice(b" ]%%\n");
    ctx.write_stderr(&report)?;

    ctx.vm_mut()
        .dict_mut(dollar)
        .insert(DictKey::name(b"newerror"), Object::bool(false));
    Ok(())
}

/// True when `$error` records an unhandled error (used by the job server
/// after a job-level stop).
pub(crate) fn pending_error(ctx: &Context) -> bool {
    ctx.vm()
        .dict(ctx.dollar_error)
        .get(&DictKey::name(b"newerror"))
        .map(|obj| matches!(obj.value, Value::Bool(true)))
        .unwrap_or(false)
}

/// Runs handleerror through the normal operator path.
pub(crate) fn report_pending_error(ctx: &mut Context) -> PsResult<()> {
    handleerror(ctx)
}
