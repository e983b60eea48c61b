//! File and I/O operators, including the console output family.

use log::debug;

use crate::{
    context::Context,
    engine::{self, LoopFrame},
    error::{ErrorKind, PsResult},
    file::STDOUT,
    object::{Object, Operator, StringSlice, Value},
};

pub(super) fn register(table: &mut Vec<Operator>) {
    super::operators!(table,
        "file" => file,
        "closefile" => closefile,
        "read" => read,
        "write" => write,
        "readstring" => readstring,
        "writestring" => writestring,
        "readhexstring" => readhexstring,
        "writehexstring" => writehexstring,
        "readline" => readline,
        "bytesavailable" => bytesavailable,
        "flush" => flush,
        "flushfile" => flushfile,
        "resetfile" => resetfile,
        "status" => status,
        "run" => run,
        "currentfile" => currentfile,
        "deletefile" => deletefile,
        "renamefile" => renamefile,
        "filenameforall" => filenameforall,
        "print" => print,
        "=" => equals,
        "==" => equals_equals,
        "stack" => stack,
        "pstack" => pstack,
    );
}

fn filename_bytes(ctx: &Context, slice: StringSlice) -> Vec<u8> {
    ctx.vm().string_bytes(slice).to_vec()
}

/// filename access `file` file
fn file(ctx: &mut Context) -> PsResult<()> {
    let access = ctx.peek_string(0)?;
    let name_slice = ctx.peek_string(1)?;
    let access = filename_bytes(ctx, access);
    let name = filename_bytes(ctx, name_slice);

    let id = match ctx.files().resolve_special(&name) {
        Some(id) => id,
        None => match access.first() {
            Some(b'r') => {
                let path = String::from_utf8_lossy(&name).to_string();
                let data = std::fs::read(&path)
                    .map_err(|_| anyhow::anyhow!(ErrorKind::UndefinedFilename))?;
                ctx.files_mut().open_input(name, data)
            }
            Some(b'w' | b'a') => anyhow::bail!(ErrorKind::InvalidFileAccess),
            _ => anyhow::bail!(ErrorKind::InvalidFileAccess),
        },
    };

    ctx.npop(2);
    ctx.push(Object::executable(Value::File(id)))
}

/// Closing an already-closed file has no effect.
fn closefile(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.peek(0)?.file_val()?;
    ctx.npop(1);
    ctx.files_mut().close(id)
}

/// file `read` byte true | false
fn read(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.peek(0)?.file_val()?;
    ctx.npop(1);
    match ctx.files_mut().read_byte(id)? {
        Some(byte) => {
            ctx.push(Object::int(byte as i32))?;
            ctx.push(Object::bool(true))
        }
        None => ctx.push(Object::bool(false)),
    }
}

fn write(ctx: &mut Context) -> PsResult<()> {
    let byte = ctx.peek_int(0)?;
    let id = ctx.peek(1)?.file_val()?;
    if !(0..=255).contains(&byte) {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.npop(2);
    ctx.files_mut().write(id, &[byte as u8])
}

/// file string `readstring` substring bool
fn readstring(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_string(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let id = ctx.peek(1)?.file_val()?;
    ctx.npop(2);

    let mut buffer = vec![0u8; target.len];
    let count = ctx.files_mut().read_into(id, &mut buffer)?;
    ctx.vm_mut().string_mut(target)[..count].copy_from_slice(&buffer[..count]);

    let sub = StringSlice { len: count, ..target };
    ctx.push(Object::new(Value::String(sub)))?;
    ctx.push(Object::bool(count == target.len))
}

fn writestring(ctx: &mut Context) -> PsResult<()> {
    let source = ctx.peek_string(0)?;
    ctx.check_readable(ctx.peek(0)?)?;
    let id = ctx.peek(1)?.file_val()?;
    ctx.npop(2);

    let bytes = ctx.vm().string_bytes(source).to_vec();
    ctx.files_mut().write(id, &bytes)
}

/// file string `readhexstring` substring bool : reads hex digits, skipping
/// everything else, until the string is filled or EOF.
fn readhexstring(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_string(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let id = ctx.peek(1)?.file_val()?;
    ctx.npop(2);

    let mut decoded = Vec::with_capacity(target.len);
    let mut pending: Option<u8> = None;
    while decoded.len() < target.len {
        let byte = match ctx.files_mut().read_byte(id)? {
            Some(b) => b,
            None => break,
        };
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => continue,
        };
        match pending.take() {
            Some(high) => decoded.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    let count = decoded.len();
    ctx.vm_mut().string_mut(target)[..count].copy_from_slice(&decoded);
    let sub = StringSlice { len: count, ..target };
    ctx.push(Object::new(Value::String(sub)))?;
    ctx.push(Object::bool(count == target.len))
}

fn writehexstring(ctx: &mut Context) -> PsResult<()> {
    let source = ctx.peek_string(0)?;
    ctx.check_readable(ctx.peek(0)?)?;
    let id = ctx.peek(1)?.file_val()?;
    ctx.npop(2);

    let bytes = ctx.vm().string_bytes(source).to_vec();
    let mut hex = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.extend_from_slice(format!("{:02x}", byte).as_bytes());
    }
    ctx.files_mut().write(id, &hex)
}

/// file string `readline` substring bool
fn readline(ctx: &mut Context) -> PsResult<()> {
    let target = ctx.peek_string(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let id = ctx.peek(1)?.file_val()?;
    ctx.npop(2);

    let (line, found_eol) = ctx.files_mut().read_line(id)?;
    if line.len() > target.len {
        anyhow::bail!(ErrorKind::RangeCheck);
    }
    ctx.vm_mut().string_mut(target)[..line.len()].copy_from_slice(&line);

    let sub = StringSlice { len: line.len(), ..target };
    ctx.push(Object::new(Value::String(sub)))?;
    ctx.push(Object::bool(found_eol))
}

fn bytesavailable(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.peek(0)?.file_val()?;
    ctx.npop(1);
    let available = ctx.files().bytes_available(id)?;
    ctx.push(Object::int(available))
}

fn flush(ctx: &mut Context) -> PsResult<()> {
    ctx.files_mut().flush(STDOUT)
}

fn flushfile(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.peek(0)?.file_val()?;
    ctx.npop(1);
    ctx.files_mut().flush(id)
}

fn resetfile(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.peek(0)?.file_val()?;
    ctx.npop(1);
    ctx.files_mut().reset(id)
}

/// file `status` bool, or the filename form reporting existence.
fn status(ctx: &mut Context) -> PsResult<()> {
    match &ctx.peek(0)?.value {
        Value::File(id) => {
            let open = ctx.files().is_open(*id);
            ctx.npop(1);
            ctx.push(Object::bool(open))
        }
        Value::String(slice) => {
            let name = filename_bytes(ctx, *slice);
            ctx.npop(1);
            let path = String::from_utf8_lossy(&name).to_string();
            match std::fs::metadata(&path) {
                Ok(meta) => {
                    let len = meta.len() as i32;
                    // pages, bytes, referenced, created
                    ctx.push(Object::int((len + 1023) / 1024))?;
                    ctx.push(Object::int(len))?;
                    ctx.push(Object::int(0))?;
                    ctx.push(Object::int(0))?;
                    ctx.push(Object::bool(true))
                }
                Err(_) => ctx.push(Object::bool(false)),
            }
        }
        _ => anyhow::bail!(ErrorKind::TypeCheck),
    }
}

/// Executes the named file as a program.
fn run(ctx: &mut Context) -> PsResult<()> {
    let name_slice = ctx.peek_string(0)?;
    let name = filename_bytes(ctx, name_slice);
    let path = String::from_utf8_lossy(&name).to_string();
    let data =
        std::fs::read(&path).map_err(|_| anyhow::anyhow!(ErrorKind::UndefinedFilename))?;
    ctx.npop(1);

    debug!("run: executing {} ({} bytes)", path, data.len());
    let id = ctx.files_mut().open_input(name, data);
    ctx.push_exec(Object::executable(Value::File(id)))
}

/// The file being executed: the topmost file object on the execution stack.
fn currentfile(ctx: &mut Context) -> PsResult<()> {
    let found = ctx
        .exec_stack
        .iter()
        .rev()
        .find_map(|frame| match frame.value {
            Value::File(id) if frame.is_executable() => Some(id),
            _ => None,
        });

    match found {
        Some(id) => ctx.push(Object::executable(Value::File(id))),
        None => {
            // no file is being executed; hand back a closed placeholder
            let id = ctx.files_mut().open_input(b"%closed".to_vec(), Vec::new());
            ctx.files_mut().close(id)?;
            ctx.push(Object::executable(Value::File(id)))
        }
    }
}

fn deletefile(ctx: &mut Context) -> PsResult<()> {
    let name_slice = ctx.peek_string(0)?;
    let name = filename_bytes(ctx, name_slice);
    let path = String::from_utf8_lossy(&name).to_string();
    std::fs::remove_file(&path).map_err(|_| anyhow::anyhow!(ErrorKind::UndefinedFilename))?;
    ctx.npop(1);
    Ok(())
}

fn renamefile(ctx: &mut Context) -> PsResult<()> {
    let new_slice = ctx.peek_string(0)?;
    let old_slice = ctx.peek_string(1)?;
    let new_name = String::from_utf8_lossy(&filename_bytes(ctx, new_slice)).to_string();
    let old_name = String::from_utf8_lossy(&filename_bytes(ctx, old_slice)).to_string();
    std::fs::rename(&old_name, &new_name)
        .map_err(|_| anyhow::anyhow!(ErrorKind::UndefinedFilename))?;
    ctx.npop(2);
    Ok(())
}

/// template proc scratch `filenameforall` - : enumerates matching filenames.
/// `*` matches any run of characters; `?` matches one.
fn filenameforall(ctx: &mut Context) -> PsResult<()> {
    let scratch = ctx.peek_string(0)?;
    ctx.check_writable(ctx.peek(0)?)?;
    let body = ctx.peek_proc(1)?;
    let template_slice = ctx.peek_string(2)?;
    let template = filename_bytes(ctx, template_slice);
    ctx.npop(3);

    let mut names = Vec::new();
    if let Ok(entries) = std::fs::read_dir(".") {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let bytes = name.to_string_lossy().into_owned().into_bytes();
            if template_matches(&template, &bytes) {
                names.push(bytes);
            }
        }
    }
    names.sort();

    engine::push_loop(ctx, LoopFrame::FilenameForall { names, pos: 0, scratch, body })
}

pub(super) fn template_matches(template: &[u8], name: &[u8]) -> bool {
    match template.split_first() {
        None => name.is_empty(),
        Some((b'*', rest)) => (0..=name.len()).any(|i| template_matches(rest, &name[i..])),
        Some((b'?', rest)) => !name.is_empty() && template_matches(rest, &name[1..]),
        Some((&ch, rest)) => name.first() == Some(&ch) && template_matches(rest, &name[1..]),
    }
}

fn print(ctx: &mut Context) -> PsResult<()> {
    let slice = ctx.peek_string(0)?;
    ctx.check_readable(ctx.peek(0)?)?;
    let bytes = ctx.vm().string_bytes(slice).to_vec();
    ctx.npop(1);
    ctx.write_stdout(&bytes)
}

/// `=`: pop and write the text form.
fn equals(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let obj = ctx.pop()?;
    let mut text = ctx.to_text_repr(&obj);
    text.push(b'\n');
    ctx.write_stdout(&text)
}

/// `==`: pop and write the syntactic form.
fn equals_equals(ctx: &mut Context) -> PsResult<()> {
    ctx.require(1)?;
    let obj = ctx.pop()?;
    let mut text = ctx.to_syntactic_repr(&obj);
    text.push(b'\n');
    ctx.write_stdout(&text)
}

/// Writes the whole operand stack, topmost first, without disturbing it.
fn stack(ctx: &mut Context) -> PsResult<()> {
    let lines: Vec<Vec<u8>> = ctx
        .op_stack
        .iter()
        .rev()
        .map(|obj| ctx.to_text_repr(obj))
        .collect();
    for mut line in lines {
        line.push(b'\n');
        ctx.write_stdout(&line)?;
    }
    Ok(())
}

fn pstack(ctx: &mut Context) -> PsResult<()> {
    let lines: Vec<Vec<u8>> = ctx
        .op_stack
        .iter()
        .rev()
        .map(|obj| ctx.to_syntactic_repr(obj))
        .collect();
    for mut line in lines {
        line.push(b'\n');
        ctx.write_stdout(&line)?;
    }
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

    fn stdout(ctx: &Context) -> Vec<u8> {
        ctx.captured_stdout().unwrap().to_vec()
    }

    #[test]
    fn equals_writes_text_form() {
        assert_eq!(stdout(&run(b"3 4 add =")), b"7\n");
        assert_eq!(stdout(&run(b"(hi) =")), b"hi\n");
    }

    #[test]
    fn double_equals_writes_syntax() {
        assert_eq!(stdout(&run(b"(hi) ==")), b"(hi)\n");
        assert_eq!(stdout(&run(b"/nm ==")), b"/nm\n");
        assert_eq!(stdout(&run(b"[1 2.5] ==")), b"[1 2.5]\n");
        assert_eq!(stdout(&run(b"{add} ==")), b"{add}\n");
    }

    #[test]
    fn print_writes_raw_bytes() {
        assert_eq!(stdout(&run(b"(a) print (b) print")), b"ab");
    }

    #[test]
    fn stack_lists_without_popping() {
        let ctx = run(b"1 2 stack");
        assert_eq!(stdout(&ctx), b"2\n1\n");
        assert_eq!(ctx.op_stack.len(), 2);
    }

    #[test]
    fn stdout_resolves_through_file() {
        let ctx = run(b"(%stdout) (w) file (via file) writestring");
        assert_eq!(stdout(&ctx), b"via file");
    }

    #[test]
    fn read_from_executable_source() {
        // currentfile inside an executed string sees no file and yields a
        // closed placeholder
        let ctx = run(b"currentfile status");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(false));
    }

    #[test]
    fn missing_file_is_undefinedfilename() {
        let ctx = run(b"{ (/nonexistent-postforge) (r) file } stopped");
        assert_eq!(ctx.op_stack.last().unwrap().value, Value::Bool(true));
        let err = ctx.vm().dict(ctx.dollar_error);
        let name = err.get(&crate::object::DictKey::name(b"errorname")).unwrap();
        assert_eq!(name.name_val().unwrap().as_bytes(), b"undefinedfilename");
    }

    #[test]
    fn template_wildcards() {
        use super::template_matches;
        assert!(template_matches(b"*.ps", b"page.ps"));
        assert!(template_matches(b"fig?.ps", b"fig1.ps"));
        assert!(!template_matches(b"fig?.ps", b"fig12.ps"));
        assert!(template_matches(b"*", b"anything"));
    }
}
