use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::{
    error::{ErrorKind, PsResult},
    file::{FileTable, STDERR, STDOUT},
    graphics::{
        display_list::DisplayList,
        page_device::PageDevice,
        state::{GSaveEntry, GraphicsState},
    },
    object::{
        Access, ArraySlice, Attrib, DictHandle, DictKey, FontId, Name, Object, StringSlice, Value,
    },
    vm::Vm,
};

/// User interpreter parameters (`setuserparams`).
#[derive(Debug, Clone)]
pub struct UserParams {
    pub max_op_stack: usize,
    pub max_exec_stack: usize,
    pub max_dict_stack: usize,
    pub max_gsave_stack: usize,
    pub execution_history: bool,
    pub execution_history_size: usize,
}

impl Default for UserParams {
    fn default() -> Self {
        Self {
            max_op_stack: 500,
            max_exec_stack: 250,
            max_dict_stack: 250,
            max_gsave_stack: 10,
            execution_history: false,
            execution_history_size: 20,
        }
    }
}

/// System parameters (`setsystemparams`). The job password is write-only:
/// `currentsystemparams` never reports it back.
#[derive(Debug, Clone)]
pub struct SystemParams {
    pub start_job_password: Vec<u8>,
    pub max_font_cache: i32,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            start_job_password: Vec::new(),
            max_font_cache: 4_000_000,
        }
    }
}

/// A pattern instantiated by `makepattern`: the pattern dictionary plus the
/// matrix mapping pattern space to default user space at instantiation time.
#[derive(Debug, Clone)]
pub struct PatternInstance {
    pub dict: DictHandle,
    pub matrix: [f32; 6],
}

/// A running job's bookkeeping on the job server's stack.
#[derive(Debug, Clone, Copy)]
pub struct JobRecord {
    /// The save that encapsulates this job; None for an unencapsulated job
    /// entered through `startjob`/`exitserver`.
    pub save: Option<crate::object::SaveId>,

    /// VM save nesting at job entry; `startjob` only fires when the current
    /// level is back down to this.
    pub entry_level: usize,
}

/// The per-interpreter state: the four stacks, both VMs, graphics state,
/// display list, file registry, and the well-known dictionaries.
pub struct Context {
    vm: Vm,
    files: FileTable,

    pub op_stack: Vec<Object>,
    pub exec_stack: Vec<Object>,
    pub dict_stack: Vec<DictHandle>,
    pub gsave_stack: Vec<GSaveEntry>,

    pub gstate: GraphicsState,
    pub display_list: DisplayList,

    pub system_dict: DictHandle,
    pub global_dict: DictHandle,
    pub user_dict: DictHandle,
    pub error_dict: DictHandle,
    pub dollar_error: DictHandle,
    pub status_dict: DictHandle,
    pub server_dict: DictHandle,
    pub internal_dict: DictHandle,
    pub font_directory: DictHandle,

    /// Resource categories: category name -> instance dictionary.
    pub resource_categories: DictHandle,

    pub user_params: UserParams,
    pub system_params: SystemParams,

    /// Array packing mode (`setpacking`).
    pub packing_mode: bool,

    pub job_records: Vec<JobRecord>,
    pub job_server_mode: bool,
    pub quit_requested: bool,

    /// Pre-dispatch snapshots for post-mortem diagnostics, newest last.
    pub history: VecDeque<Object>,
    pub history_paused: bool,

    /// Invoked about every 10 000 engine iterations; must not re-enter the
    /// interpreter.
    pub pump: Option<Box<dyn FnMut()>>,

    /// Set by a host to inject an `interrupt` error at the top of the loop.
    pub interrupt_requested: std::sync::Arc<std::sync::atomic::AtomicBool>,

    pub page_device: PageDevice,

    /// Finished pages collected when no external device claims them.
    pub pages: Vec<Vec<crate::graphics::display_list::DisplayElement>>,

    /// Registered output devices, resolved by /OutputDevice at showpage.
    pub devices: Vec<Box<dyn crate::device::Device>>,

    /// Backing store for `gstate` objects, which live outside VM snapshots.
    pub gstate_objects: Vec<GraphicsState>,

    /// Instantiated patterns (`makepattern`), referenced by PatternFill
    /// display elements.
    pub patterns: Vec<PatternInstance>,

    next_font_id: usize,
    rng_state: u32,
    start: Instant,
}

impl Context {
    /// Builds a context with seeded dictionaries and an installed operator
    /// registry. `capture_output` routes the standard output streams into
    /// inspectable buffers.
    pub fn new(capture_output: bool) -> Self {
        let mut vm = Vm::new();

        let system_dict = vm.alloc_global_dict(512);
        let global_dict = vm.alloc_global_dict(64);
        // errordict, statusdict and the resource registry live in local VM so
        // programs can store local procedures into them
        let error_dict = vm.alloc_local_dict(32);
        let status_dict = vm.alloc_local_dict(16);
        let resource_categories = vm.alloc_local_dict(16);
        let user_dict = vm.alloc_local_dict(64);
        let dollar_error = vm.alloc_local_dict(8);
        let server_dict = vm.alloc_local_dict(8);
        let internal_dict = vm.alloc_local_dict(8);
        let font_directory = vm.alloc_local_dict(16);

        let mut ctx = Self {
            vm,
            files: FileTable::new(capture_output),
            op_stack: Vec::new(),
            exec_stack: Vec::new(),
            dict_stack: vec![system_dict, global_dict, user_dict],
            gsave_stack: Vec::new(),
            gstate: GraphicsState::default(),
            display_list: DisplayList::new(),
            system_dict,
            global_dict,
            user_dict,
            error_dict,
            dollar_error,
            status_dict,
            server_dict,
            internal_dict,
            font_directory,
            resource_categories,
            user_params: UserParams::default(),
            system_params: SystemParams::default(),
            packing_mode: false,
            job_records: Vec::new(),
            job_server_mode: true,
            quit_requested: false,
            history: VecDeque::new(),
            history_paused: false,
            pump: None,
            interrupt_requested: Default::default(),
            page_device: PageDevice::default(),
            pages: Vec::new(),
            devices: Vec::new(),
            gstate_objects: Vec::new(),
            patterns: Vec::new(),
            next_font_id: 0,
            rng_state: 0,
            start: Instant::now(),
        };

        crate::operators::install(&mut ctx);
        ctx
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }

    // -- operand stack ------------------------------------------------------

    pub fn push(&mut self, obj: Object) -> PsResult<()> {
        if self.op_stack.len() >= self.user_params.max_op_stack {
            anyhow::bail!(ErrorKind::StackOverflow);
        }
        self.op_stack.push(obj);
        Ok(())
    }

    pub fn pop(&mut self) -> PsResult<Object> {
        self.op_stack
            .pop()
            .ok_or_else(|| anyhow::anyhow!(ErrorKind::StackUnderflow))
    }

    /// Depth precondition for validate-before-mutate operators.
    pub fn require(&self, n: usize) -> PsResult<()> {
        if self.op_stack.len() < n {
            anyhow::bail!(ErrorKind::StackUnderflow);
        }
        Ok(())
    }

    /// Non-destructive peek; `n` counts down from the top (0 is topmost).
    pub fn peek(&self, n: usize) -> PsResult<&Object> {
        self.require(n + 1)?;
        Ok(&self.op_stack[self.op_stack.len() - 1 - n])
    }

    pub fn npop(&mut self, n: usize) {
        debug_assert!(self.op_stack.len() >= n);
        self.op_stack.truncate(self.op_stack.len() - n);
    }

    pub fn peek_int(&self, n: usize) -> PsResult<i32> {
        self.peek(n)?.int_val()
    }

    pub fn peek_num(&self, n: usize) -> PsResult<f32> {
        self.peek(n)?.num_val()
    }

    pub fn peek_bool(&self, n: usize) -> PsResult<bool> {
        self.peek(n)?.bool_val()
    }

    pub fn peek_name(&self, n: usize) -> PsResult<Name> {
        self.peek(n)?.name_val().cloned()
    }

    pub fn peek_array(&self, n: usize) -> PsResult<ArraySlice> {
        self.peek(n)?.array_val()
    }

    pub fn peek_string(&self, n: usize) -> PsResult<StringSlice> {
        self.peek(n)?.string_val()
    }

    pub fn peek_dict(&self, n: usize) -> PsResult<DictHandle> {
        self.peek(n)?.dict_val()
    }

    pub fn peek_proc(&self, n: usize) -> PsResult<Object> {
        let obj = self.peek(n)?;
        if !obj.is_procedure() {
            anyhow::bail!(ErrorKind::TypeCheck);
        }
        Ok(obj.clone())
    }

    /// A nonnegative integer operand used as an index or count.
    pub fn peek_usize(&self, n: usize) -> PsResult<usize> {
        let val = self.peek_int(n)?;
        usize::try_from(val).map_err(|_| anyhow::anyhow!(ErrorKind::RangeCheck))
    }

    // -- access checks ------------------------------------------------------

    /// Readability of a composite operand: dictionaries carry access on the
    /// shared store, arrays and strings on the handle.
    pub fn check_readable(&self, obj: &Object) -> PsResult<()> {
        let access = match &obj.value {
            Value::Dict(handle) => self.vm.dict(*handle).access,
            _ => obj.access,
        };
        if !access.allows(Access::ReadOnly) {
            anyhow::bail!(ErrorKind::InvalidAccess);
        }
        Ok(())
    }

    pub fn check_writable(&self, obj: &Object) -> PsResult<()> {
        let access = match &obj.value {
            Value::Dict(handle) => self.vm.dict(*handle).access,
            _ => obj.access,
        };
        if !access.allows(Access::Unlimited) {
            anyhow::bail!(ErrorKind::InvalidAccess);
        }
        Ok(())
    }

    // -- execution stack ----------------------------------------------------

    pub fn push_exec(&mut self, obj: Object) -> PsResult<()> {
        if self.exec_stack.len() >= self.user_params.max_exec_stack {
            anyhow::bail!(ErrorKind::ExecStackOverflow);
        }
        self.exec_stack.push(obj);
        Ok(())
    }

    // -- dictionary stack ---------------------------------------------------

    pub fn begin_dict(&mut self, dict: DictHandle) -> PsResult<()> {
        if self.dict_stack.len() >= self.user_params.max_dict_stack {
            anyhow::bail!(ErrorKind::DictStackOverflow);
        }
        self.dict_stack.push(dict);
        Ok(())
    }

    /// Pops the current dictionary; the permanent bottom three entries cannot
    /// be removed.
    pub fn end_dict(&mut self) -> PsResult<()> {
        if self.dict_stack.len() <= 3 {
            anyhow::bail!(ErrorKind::DictStackUnderflow);
        }
        self.dict_stack.pop();
        Ok(())
    }

    pub fn current_dict(&self) -> DictHandle {
        *self.dict_stack.last().expect("dict stack never empty")
    }

    /// Resets the dictionary stack to `[systemdict, globaldict, userdict]`.
    pub fn reset_dict_stack(&mut self) {
        self.dict_stack.clear();
        self.dict_stack.push(self.system_dict);
        self.dict_stack.push(self.global_dict);
        self.dict_stack.push(self.user_dict);
    }

    /// Walks the dictionary stack top to bottom, skipping dictionaries whose
    /// access forbids reading, and returns a copy of the first binding.
    pub fn lookup(&self, key: &DictKey) -> Option<Object> {
        for &handle in self.dict_stack.iter().rev() {
            let dict = self.vm.dict(handle);
            if !dict.access.allows(Access::ReadOnly) {
                continue;
            }
            if let Some(obj) = dict.get(key) {
                return Some(obj.clone());
            }
        }
        None
    }

    /// The dictionary that holds the first binding of `key` (`where`).
    pub fn where_defined(&self, key: &DictKey) -> Option<DictHandle> {
        for &handle in self.dict_stack.iter().rev() {
            let dict = self.vm.dict(handle);
            if !dict.access.allows(Access::ReadOnly) {
                continue;
            }
            if dict.contains(key) {
                return Some(handle);
            }
        }
        None
    }

    pub fn lookup_name(&self, name: &[u8]) -> Option<Object> {
        self.lookup(&DictKey::name(name))
    }

    /// `def` into the current dictionary.
    pub fn define(&mut self, key: DictKey, value: Object) -> PsResult<()> {
        let handle = self.current_dict();
        self.dict_put(handle, key, value)
    }

    pub fn dict_put(&mut self, handle: DictHandle, key: DictKey, value: Object) -> PsResult<()> {
        if !self.vm.dict(handle).access.allows(Access::Unlimited) {
            anyhow::bail!(ErrorKind::InvalidAccess);
        }
        if handle.global && !value.is_global() && value.is_composite() {
            // a global dictionary may not capture local composites
            anyhow::bail!(ErrorKind::InvalidAccess);
        }
        self.vm.dict_mut(handle).insert(key, value);
        Ok(())
    }

    /// Registry insertion used while seeding systemdict, before it is sealed
    /// read-only.
    pub fn define_in(&mut self, handle: DictHandle, name: &[u8], value: Object) {
        self.vm.dict_mut(handle).insert(DictKey::name(name), value);
    }

    // -- allocation helpers -------------------------------------------------

    pub fn alloc_string_obj(&mut self, bytes: Vec<u8>) -> Object {
        Object::new(Value::String(self.vm.alloc_string(bytes)))
    }

    pub fn alloc_array_obj(&mut self, objects: Vec<Object>) -> Object {
        Object::new(Value::Array(self.vm.alloc_array(objects)))
    }

    /// An executable array, used for procedure bodies.
    pub fn alloc_proc_obj(&mut self, objects: Vec<Object>) -> Object {
        Object::executable(Value::Array(self.vm.alloc_array(objects)))
    }

    pub fn alloc_packed_obj(&mut self, objects: Vec<Object>) -> Object {
        let mut obj = Object::executable(Value::PackedArray(self.vm.alloc_array(objects)));
        obj.access = Access::ReadOnly;
        obj
    }

    pub fn alloc_array_of_reals(&mut self, values: &[f32]) -> Object {
        let objects = values.iter().map(|&v| Object::real(v)).collect();
        self.alloc_array_obj(objects)
    }

    pub fn alloc_dict_obj(&mut self, capacity: usize) -> Object {
        Object::new(Value::Dict(self.vm.alloc_dict(capacity)))
    }

    pub fn next_font_id(&mut self) -> FontId {
        let id = FontId(self.next_font_id);
        self.next_font_id += 1;
        id
    }

    // -- graphics-save stack ------------------------------------------------

    pub fn gsave_push(&mut self, entry: GSaveEntry) -> PsResult<()> {
        if self.gsave_stack.len() >= self.user_params.max_gsave_stack {
            anyhow::bail!(ErrorKind::LimitCheck);
        }
        self.gsave_stack.push(entry);
        Ok(())
    }

    /// `grestore`: pops a gsave-pushed entry, or reinstates (without popping)
    /// a save-pushed boundary.
    pub fn grestore(&mut self) {
        match self.gsave_stack.last() {
            Some(entry) if entry.save_id.is_some() => {
                self.gstate = entry.state.clone();
            }
            Some(_) => {
                self.gstate = self.gsave_stack.pop().unwrap().state;
            }
            None => {}
        }
    }

    /// `grestoreall`: pops down to the bottommost entry or the nearest save
    /// boundary, which is reinstated but kept.
    pub fn grestore_all(&mut self) {
        while let Some(entry) = self.gsave_stack.last() {
            if entry.save_id.is_some() {
                self.gstate = entry.state.clone();
                return;
            }
            self.gstate = self.gsave_stack.pop().unwrap().state;
        }
    }

    // -- object relations ---------------------------------------------------

    /// `eq` semantics: numbers compare by value across types, strings by
    /// content (and against names), other composites by shared storage.
    pub fn objects_equal(&self, a: &Object, b: &Object) -> bool {
        match (&a.value, &b.value) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Real(x), Value::Real(y)) => x == y,
            (Value::Int(x), Value::Real(y)) | (Value::Real(y), Value::Int(x)) => {
                *x as f32 == *y
            }
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Null, Value::Null) | (Value::Mark, Value::Mark) => true,
            (Value::Name(x), Value::Name(y)) => x == y,
            (Value::Name(name), Value::String(s)) | (Value::String(s), Value::Name(name)) => {
                name.as_bytes() == self.vm.string_bytes(*s)
            }
            (Value::String(x), Value::String(y)) => {
                self.vm.string_bytes(*x) == self.vm.string_bytes(*y)
            }
            (Value::Array(x), Value::Array(y))
            | (Value::PackedArray(x), Value::PackedArray(y))
            | (Value::Array(x), Value::PackedArray(y))
            | (Value::PackedArray(x), Value::Array(y)) => {
                x.idx == y.idx && x.global == y.global && x.start == y.start && x.len == y.len
            }
            (Value::Dict(x), Value::Dict(y)) => x == y,
            (Value::Operator(x), Value::Operator(y)) => x == y,
            (Value::File(x), Value::File(y)) => x == y,
            (Value::Save(x), Value::Save(y)) => x == y,
            (Value::Font(x), Value::Font(y)) => x == y,
            (Value::GState(x), Value::GState(y)) => x == y,
            _ => false,
        }
    }

    /// Ordering for lt/le/gt/ge: numbers against numbers, strings against
    /// strings; anything else is a typecheck.
    pub fn objects_compare(&self, a: &Object, b: &Object) -> PsResult<std::cmp::Ordering> {
        match (&a.value, &b.value) {
            (Value::Int(_) | Value::Real(_), Value::Int(_) | Value::Real(_)) => {
                let x = a.num_val()?;
                let y = b.num_val()?;
                x.partial_cmp(&y)
                    .ok_or_else(|| anyhow::anyhow!(ErrorKind::UndefinedResult))
            }
            (Value::String(x), Value::String(y)) => {
                Ok(self.vm.string_bytes(*x).cmp(self.vm.string_bytes(*y)))
            }
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    // -- output -------------------------------------------------------------

    pub fn write_stdout(&mut self, bytes: &[u8]) -> PsResult<()> {
        self.files.write(STDOUT, bytes)
    }

    pub fn write_stderr(&mut self, bytes: &[u8]) -> PsResult<()> {
        self.files.write(STDERR, bytes)
    }

    /// The `=`-style text form of an object.
    pub fn to_text_repr(&self, obj: &Object) -> Vec<u8> {
        match &obj.value {
            Value::Int(n) => n.to_string().into_bytes(),
            Value::Real(r) => format_real(*r).into_bytes(),
            Value::Bool(b) => if *b { b"true".to_vec() } else { b"false".to_vec() },
            Value::Name(name) => name.as_bytes().to_vec(),
            Value::String(s) => self.vm.string_bytes(*s).to_vec(),
            Value::Operator(op) => op.name.as_bytes().to_vec(),
            Value::Null => b"null".to_vec(),
            _ => b"--nostringval--".to_vec(),
        }
    }

    /// The `==`-style syntactic form: strings quoted and escaped, names with
    /// their slash, arrays and procedures bracketed.
    pub fn to_syntactic_repr(&self, obj: &Object) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_syntactic(obj, &mut out);
        out
    }

    fn write_syntactic(&self, obj: &Object, out: &mut Vec<u8>) {
        match &obj.value {
            Value::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
            Value::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
            Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Value::Null => out.extend_from_slice(b"null"),
            Value::Mark => out.extend_from_slice(b"-mark-"),
            Value::Name(name) => {
                if obj.attrib == Attrib::Literal {
                    out.push(b'/');
                }
                out.extend_from_slice(name.as_bytes());
            }
            Value::Operator(op) => {
                out.extend_from_slice(b"--");
                out.extend_from_slice(op.name.as_bytes());
                out.extend_from_slice(b"--");
            }
            Value::String(s) => {
                out.push(b'(');
                for &byte in self.vm.string_bytes(*s) {
                    match byte {
                        b'(' | b')' | b'\\' => {
                            out.push(b'\\');
                            out.push(byte);
                        }
                        b'\n' => out.extend_from_slice(b"\\n"),
                        b'\r' => out.extend_from_slice(b"\\r"),
                        b'\t' => out.extend_from_slice(b"\\t"),
                        0x20..=0x7e => out.push(byte),
                        _ => {
                            out.push(b'\\');
                            out.extend_from_slice(format!("{:03o}", byte).as_bytes());
                        }
                    }
                }
                out.push(b')');
            }
            Value::Array(slice) | Value::PackedArray(slice) => {
                let executable = obj.is_executable();
                out.push(if executable { b'{' } else { b'[' });
                let elements = self.vm.array(*slice).to_vec();
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    self.write_syntactic(element, out);
                }
                out.push(if executable { b'}' } else { b']' });
            }
            Value::Dict(_) => out.extend_from_slice(b"-dict-"),
            Value::File(_) => out.extend_from_slice(b"-file-"),
            Value::Save(_) => out.extend_from_slice(b"-save-"),
            Value::Font(_) => out.extend_from_slice(b"-fontid-"),
            Value::GState(_) => out.extend_from_slice(b"-gstate-"),
            Value::Stopped | Value::Loop(_) | Value::HardReturn => {
                out.extend_from_slice(b"-internal-")
            }
        }
    }

    // -- error protocol -----------------------------------------------------

    /// Populates `$error` per the PLRM protocol before control transfers to
    /// the error handler.
    pub fn record_error(&mut self, kind: ErrorKind, command: &Object) {
        let ostack = self.op_stack.clone();
        let estack: Vec<Object> = self
            .exec_stack
            .iter()
            .filter(|frame| {
                !matches!(frame.value, Value::Stopped | Value::Loop(_) | Value::HardReturn)
            })
            .cloned()
            .collect();
        let dstack: Vec<Object> = self
            .dict_stack
            .iter()
            .map(|&handle| Object::new(Value::Dict(handle)))
            .collect();

        let ostack_arr = self.alloc_array_obj(ostack);
        let estack_arr = self.alloc_array_obj(estack);
        let dstack_arr = self.alloc_array_obj(dstack);

        let dollar_error = self.dollar_error;
        let store = self.vm.dict_mut(dollar_error);
        store.insert(DictKey::name(b"newerror"), Object::bool(true));
        store.insert(
            DictKey::name(b"errorname"),
            Object::literal_name(kind.name().as_bytes()),
        );
        store.insert(DictKey::name(b"command"), command.clone());
        store.insert(DictKey::name(b"ostackarray"), ostack_arr);
        store.insert(DictKey::name(b"estackarray"), estack_arr);
        store.insert(DictKey::name(b"dstackarray"), dstack_arr);
    }

    // -- misc ---------------------------------------------------------------

    /// Linear congruential generator with the PLRM-visible 31-bit range.
    pub fn rand(&mut self) -> i32 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12_345);
        (self.rng_state & 0x7fff_ffff) as i32
    }

    pub fn srand(&mut self, seed: i32) {
        self.rng_state = seed as u32;
    }

    pub fn rrand(&self) -> i32 {
        (self.rng_state & 0x7fff_ffff) as i32
    }

    /// Milliseconds of execution time.
    pub fn usertime(&self) -> i32 {
        self.start.elapsed().as_millis() as i32
    }

    /// Wall-clock milliseconds.
    pub fn realtime(&self) -> i32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64 as i32)
            .unwrap_or(0)
    }

    /// Captured stdout, when capture was requested at construction.
    pub fn captured_stdout(&self) -> Option<&[u8]> {
        self.files.captured_stdout()
    }
}

/// Real-number formatting for `=`/`==`/`cvs`: integral values keep one
/// fractional digit so the type stays visible.
pub fn format_real(r: f32) -> String {
    if r.is_finite() && r == r.trunc() && r.abs() < 1e9 {
        format!("{:.1}", r)
    } else {
        format!("{}", r)
    }
}
