//! The job server: each top-level input source runs through `execjob` —
//! save, run, restore — so successive jobs cannot see each other's VM
//! mutations unless `startjob`/`exitserver` escalated to an unencapsulated
//! job.

use std::io::Read;
use std::path::Path;

use log::{debug, info};

use crate::{
    context::{Context, JobRecord},
    device::Device,
    engine,
    error::PsResult,
    graphics::{display_list::DisplayElement, state::GSaveEntry},
    object::{Object, Value},
    operators::{errorops, vmops},
};

/// Runs one encapsulated job: wraps the source in the implicit save/restore
/// boundary, with a stopped frame so an unhandled error terminates the job,
/// not the interpreter.
pub fn execjob(ctx: &mut Context, source: Object) -> PsResult<()> {
    let save = ctx.vm_mut().save(true);
    let snapshot = ctx.gstate.clone();
    ctx.gsave_push(GSaveEntry::from_save(snapshot, save))?;
    ctx.job_records.push(JobRecord {
        save: Some(save),
        entry_level: ctx.vm().save_level(),
    });

    ctx.push_exec(Object::new(Value::HardReturn))?;
    ctx.push_exec(Object::new(Value::Stopped))?;
    ctx.push_exec(source)?;
    engine::run(ctx)?;

    if !ctx.quit_requested {
        // the job-level stopped boundary left its outcome on top
        let job_stopped = ctx
            .op_stack
            .pop()
            .map(|obj| matches!(obj.value, Value::Bool(true)))
            .unwrap_or(false);
        if job_stopped && errorops::pending_error(ctx) {
            errorops::report_pending_error(ctx)?;
        }
    }

    // end of job: whatever startjob left as the current record governs the
    // final rollback
    let record = ctx.job_records.pop().expect("pushed above");
    ctx.op_stack.clear();
    ctx.reset_dict_stack();
    match record.save {
        Some(id) if ctx.vm().is_valid_save(id) => {
            debug!("execjob: restoring job save {:?}", id);
            vmops::pop_graphics_to_save(ctx, id);
            ctx.vm_mut().restore(id)?;
        }
        _ => {
            debug!("execjob: job ended unencapsulated");
        }
    }

    Ok(())
}

/// The interpreter's public face: owns a context and feeds it jobs.
pub struct Interpreter {
    ctx: Context,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self { ctx: Context::new(false) }
    }

    /// Captures the standard output streams into buffers instead of writing
    /// to the process streams; used by hosts and tests.
    pub fn with_output_capture() -> Self {
        Self { ctx: Context::new(true) }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn register_device(&mut self, device: Box<dyn Device>) {
        self.ctx.devices.push(device);
    }

    /// Installs the host pump callback invoked periodically by the engine.
    pub fn set_pump(&mut self, pump: Box<dyn FnMut()>) {
        self.ctx.pump = Some(pump);
    }

    /// Runs one job from in-memory PostScript source.
    pub fn run_string(&mut self, source: &[u8]) -> PsResult<()> {
        let id = self
            .ctx
            .files_mut()
            .open_input(b"%job".to_vec(), source.to_vec());
        execjob(&mut self.ctx, Object::executable(Value::File(id)))
    }

    /// Runs one job from a named file.
    pub fn run_path(&mut self, path: &Path) -> PsResult<()> {
        info!("running {}", path.display());
        let data = std::fs::read(path)?;
        let name = path.display().to_string().into_bytes();
        let id = self.ctx.files_mut().open_input(name, data);
        execjob(&mut self.ctx, Object::executable(Value::File(id)))
    }

    /// Runs one job from everything available on standard input.
    pub fn run_stdin(&mut self) -> PsResult<()> {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        self.ctx.files_mut().set_stdin(data);
        execjob(
            &mut self.ctx,
            Object::executable(Value::File(crate::file::STDIN)),
        )
    }

    pub fn quit_requested(&self) -> bool {
        self.ctx.quit_requested
    }

    /// Pages collected by the built-in display-list device.
    pub fn pages(&self) -> &[Vec<DisplayElement>] {
        &self.ctx.pages
    }

    pub fn captured_stdout(&self) -> Option<&[u8]> {
        self.ctx.captured_stdout()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graphics::display_list::{DisplayElement, FillRule, Rgb};
    use crate::object::{DictKey, Value};

    fn run_job(src: &[u8]) -> Interpreter {
        let mut interp = Interpreter::with_output_capture();
        interp.run_string(src).unwrap();
        interp
    }

    #[test]
    fn add_and_print() {
        let interp = run_job(b"3 4 add ==");
        assert_eq!(interp.captured_stdout().unwrap(), b"7\n");
        assert!(interp.context().op_stack.is_empty());
    }

    #[test]
    fn def_load_and_print() {
        let interp = run_job(b"/x 10 def /x load 5 add ==");
        assert_eq!(interp.captured_stdout().unwrap(), b"15\n");
    }

    #[test]
    fn save_restore_rolls_back_userdict() {
        let interp = run_job(b"save /x 10 def /x 20 def restore /x load ==");
        assert_eq!(interp.captured_stdout().unwrap(), b"10\n");
    }

    #[test]
    fn triangle_fill_page() {
        let interp =
            run_job(b"0 0 moveto 100 0 lineto 100 100 lineto closepath fill showpage");
        assert_eq!(interp.pages().len(), 1);
        assert_eq!(
            interp.pages()[0],
            vec![
                DisplayElement::MoveTo { x: 0.0, y: 0.0 },
                DisplayElement::LineTo { x: 100.0, y: 0.0 },
                DisplayElement::LineTo { x: 100.0, y: 100.0 },
                DisplayElement::ClosePath,
                DisplayElement::Fill { color: Rgb::BLACK, rule: FillRule::NonZero },
                DisplayElement::ErasePage,
            ]
        );
    }

    #[test]
    fn stopped_catches_division_error() {
        let interp = run_job(b"{ 1 0 div } stopped ==");
        assert_eq!(interp.captured_stdout().unwrap(), b"true\n");
        assert!(interp.context().op_stack.is_empty());
        // the caught error leaves no report on stderr
        assert_eq!(interp.context().files().captured_stderr().unwrap(), b"");
    }

    #[test]
    fn putinterval_mutation_is_shared() {
        let interp = run_job(b"(hello) dup 0 (H) putinterval =");
        assert_eq!(interp.captured_stdout().unwrap(), b"Hello\n");
    }

    #[test]
    fn unhandled_error_reports_and_job_survives() {
        let mut interp = Interpreter::with_output_capture();
        interp.run_string(b"nosuchoperator").unwrap();
        let stderr = interp.context().files().captured_stderr().unwrap();
        assert!(stderr.starts_with(b"%%[ Error: undefined"));

        // the interpreter still runs the next job normally
        interp.run_string(b"1 2 add ==").unwrap();
        assert_eq!(interp.captured_stdout().unwrap(), b"3\n");
    }

    #[test]
    fn jobs_are_encapsulated() {
        let mut interp = Interpreter::with_output_capture();
        interp.run_string(b"/leak 42 def").unwrap();
        interp.run_string(b"/leak where { pop (found) } { (clean) } ifelse =").unwrap();
        assert_eq!(interp.captured_stdout().unwrap(), b"clean\n");
    }

    #[test]
    fn startjob_escapes_encapsulation() {
        let mut interp = Interpreter::with_output_capture();
        interp
            .run_string(b"true () startjob pop /persistent 7 def")
            .unwrap();
        interp.run_string(b"/persistent load ==").unwrap();
        assert_eq!(interp.captured_stdout().unwrap(), b"7\n");
    }

    #[test]
    fn startjob_with_wrong_password_fails() {
        let mut interp = Interpreter::with_output_capture();
        interp
            .run_string(b"<< /StartJobPassword (pw) >> setsystemparams")
            .unwrap();
        interp.run_string(b"true (wrong) startjob =").unwrap();
        assert_eq!(interp.captured_stdout().unwrap(), b"false\n");
    }

    #[test]
    fn exitserver_prints_notice_and_unencapsulates() {
        let mut interp = Interpreter::with_output_capture();
        interp
            .run_string(b"serverdict begin () exitserver /sticky 1 def")
            .unwrap();
        let stdout = interp.captured_stdout().unwrap().to_vec();
        assert!(stdout
            .windows(b"%%[exitserver: permanent state may be changed]%%".len())
            .any(|w| w == b"%%[exitserver: permanent state may be changed]%%"));

        interp.run_string(b"/sticky load ==").unwrap();
        let stdout = interp.captured_stdout().unwrap();
        assert!(stdout.ends_with(b"1\n"));
    }

    #[test]
    fn exitserver_with_wrong_password_is_invalidaccess() {
        let mut interp = Interpreter::with_output_capture();
        interp
            .run_string(b"<< /StartJobPassword (pw) >> setsystemparams")
            .unwrap();
        interp.run_string(b"{ (no) exitserver } stopped").unwrap();
        let store = interp.context().vm().dict(interp.context().dollar_error);
        let name = store.get(&DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"invalidaccess");
    }

    #[test]
    fn quit_ends_the_job_quietly() {
        let mut interp = Interpreter::with_output_capture();
        interp.run_string(b"(before) = quit (after) =").unwrap();
        assert_eq!(interp.captured_stdout().unwrap(), b"before\n");
        assert!(interp.quit_requested());
    }

    #[test]
    fn pages_survive_job_restore() {
        // display output is not part of VM: the job's restore keeps the page
        let interp = run_job(b"0 0 10 10 rectfill showpage");
        assert_eq!(interp.pages().len(), 1);
    }

    #[test]
    fn startjob_at_nonzero_save_level_fails() {
        let interp = run_job(b"save true () startjob = restore");
        assert_eq!(interp.captured_stdout().unwrap(), b"false\n");
    }
}
