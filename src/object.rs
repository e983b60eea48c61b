use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use crate::{
    context::Context,
    engine::LoopFrame,
    error::{ErrorKind, PsResult},
};

/// An interned PostScript name. Names are immutable byte strings compared by
/// content; cloning one is a pointer copy.
#[derive(Clone, Eq)]
pub struct Name(Rc<[u8]>);

impl Name {
    pub fn new(bytes: &[u8]) -> Self {
        Self(Rc::from(bytes))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Rc::from(bytes.into_boxed_slice()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", String::from_utf8_lossy(&self.0))
    }
}

/// A built-in operator: the PostScript name it was registered under plus the
/// callable. Operators are immutable and shared; dictionary lookup reuses them
/// directly instead of copying.
#[derive(Clone, Copy)]
pub struct Operator {
    pub name: &'static str,
    pub func: fn(&mut Context) -> PsResult<()>,
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.func as *const (), other.func as *const ()) && self.name == other.name
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--{}--", self.name)
    }
}

macro_rules! index {
    ($name:ident) => {
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

index!(ArrayIndex);
index!(StringIndex);
index!(DictIndex);
index!(FileId);
index!(SaveId);
index!(GStateId);
index!(FontId);

/// A view into an arena-backed array. `start` and `len` carry `getinterval`
/// slicing; two views may share one backing slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArraySlice {
    pub idx: ArrayIndex,
    pub start: usize,
    pub len: usize,
    pub global: bool,
}

/// A view into an arena-backed byte string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringSlice {
    pub idx: StringIndex,
    pub start: usize,
    pub len: usize,
    pub global: bool,
}

/// A dictionary handle. Dictionaries are not sliceable; access lives on the
/// shared store so that `readonly` through one handle is seen by all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictHandle {
    pub idx: DictIndex,
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Mark,
    Int(i32),
    Real(f32),
    Bool(bool),
    Name(Name),
    Operator(Operator),
    String(StringSlice),
    Array(ArraySlice),
    PackedArray(ArraySlice),
    Dict(DictHandle),
    File(FileId),
    Save(SaveId),
    Font(FontId),
    GState(GStateId),

    /// `stopped` boundary on the execution stack. Reaching it naturally pushes
    /// `false`; `stop` unwinds to it and pushes `true`.
    Stopped,

    /// An in-progress looping construct; one dispatch advances one iteration.
    Loop(Box<LoopFrame>),

    /// Boundary that returns control from an embedded job without unwinding
    /// further.
    HardReturn,
}

/// Literal objects are pushed by the execution engine; executable objects are
/// executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attrib {
    #[default]
    Literal,
    Executable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Normally, objects have unlimited access: all operations defined for
    /// that object are allowed. Packed arrays always have read-only (or more
    /// restricted) access
    #[default]
    Unlimited,

    /// An object with read-only access may not have its value written, but may
    /// still be read or executed
    ReadOnly,

    /// An object with execute-only access may not have its value either read
    /// or written, but may still be executed
    ExecuteOnly,

    /// An object with no access may not be operated on in any way by a
    /// PostScript language program
    None,
}

impl Access {
    /// Numeric permission level, ordered so a minimum requirement can be
    /// compared with `>=`.
    pub fn level(self) -> u8 {
        match self {
            Access::Unlimited => 4,
            Access::ReadOnly => 2,
            Access::ExecuteOnly => 1,
            Access::None => 0,
        }
    }

    pub fn allows(self, minimum: Access) -> bool {
        self.level() >= minimum.level()
    }

    /// Permissions only ever tighten; `readonly` on an execute-only object
    /// must not widen it.
    pub fn tightened_to(self, requested: Access) -> Access {
        if requested.level() < self.level() {
            requested
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub attrib: Attrib,
    pub access: Access,
    pub value: Value,
}

impl Object {
    pub fn new(value: Value) -> Self {
        Self {
            attrib: Attrib::Literal,
            access: Access::Unlimited,
            value,
        }
    }

    pub fn executable(value: Value) -> Self {
        Self {
            attrib: Attrib::Executable,
            access: Access::Unlimited,
            value,
        }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn mark() -> Self {
        Self::new(Value::Mark)
    }

    pub fn int(n: i32) -> Self {
        Self::new(Value::Int(n))
    }

    pub fn real(n: f32) -> Self {
        Self::new(Value::Real(n))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(Value::Bool(b))
    }

    pub fn literal_name(bytes: &[u8]) -> Self {
        Self::new(Value::Name(Name::new(bytes)))
    }

    pub fn executable_name(bytes: &[u8]) -> Self {
        Self::executable(Value::Name(Name::new(bytes)))
    }

    pub fn operator(op: Operator) -> Self {
        Self::executable(Value::Operator(op))
    }

    pub fn is_executable(&self) -> bool {
        self.attrib == Attrib::Executable
    }

    /// Whether this object has separately managed backing store that
    /// participates in save/restore.
    pub fn is_composite(&self) -> bool {
        matches!(
            self.value,
            Value::String(_) | Value::Array(_) | Value::PackedArray(_) | Value::Dict(_)
        )
    }

    /// Whether the backing store lives in global VM. Scalars are not in
    /// either VM; `gcheck` reports them as global.
    pub fn is_global(&self) -> bool {
        match &self.value {
            Value::String(s) => s.global,
            Value::Array(a) | Value::PackedArray(a) => a.global,
            Value::Dict(d) => d.global,
            _ => true,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self.value, Value::Int(_) | Value::Real(_))
    }

    pub fn is_int(&self) -> bool {
        matches!(self.value, Value::Int(_))
    }

    /// Strict integer operand.
    pub fn int_val(&self) -> PsResult<i32> {
        match self.value {
            Value::Int(n) => Ok(n),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    /// Numeric operand, widened to real.
    pub fn num_val(&self) -> PsResult<f32> {
        match self.value {
            Value::Int(n) => Ok(n as f32),
            Value::Real(n) => Ok(n),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    pub fn bool_val(&self) -> PsResult<bool> {
        match self.value {
            Value::Bool(b) => Ok(b),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    pub fn name_val(&self) -> PsResult<&Name> {
        match &self.value {
            Value::Name(name) => Ok(name),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    pub fn array_val(&self) -> PsResult<ArraySlice> {
        match self.value {
            Value::Array(a) | Value::PackedArray(a) => Ok(a),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    pub fn string_val(&self) -> PsResult<StringSlice> {
        match self.value {
            Value::String(s) => Ok(s),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    pub fn dict_val(&self) -> PsResult<DictHandle> {
        match self.value {
            Value::Dict(d) => Ok(d),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    pub fn file_val(&self) -> PsResult<FileId> {
        match self.value {
            Value::File(id) => Ok(id),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        }
    }

    /// A procedure: an executable array (packed or not).
    pub fn is_procedure(&self) -> bool {
        self.is_executable()
            && matches!(self.value, Value::Array(_) | Value::PackedArray(_))
    }

    /// The name reported by the `type` operator.
    pub fn type_name(&self) -> &'static [u8] {
        match self.value {
            Value::Null => b"nulltype",
            Value::Mark => b"marktype",
            Value::Int(_) => b"integertype",
            Value::Real(_) => b"realtype",
            Value::Bool(_) => b"booleantype",
            Value::Name(_) => b"nametype",
            Value::Operator(_) => b"operatortype",
            Value::String(_) => b"stringtype",
            Value::Array(_) => b"arraytype",
            Value::PackedArray(_) => b"packedarraytype",
            Value::Dict(_) => b"dicttype",
            Value::File(_) => b"filetype",
            Value::Save(_) => b"savetype",
            Value::Font(_) => b"fonttype",
            Value::GState(_) => b"gstatetype",
            // the marker frames never reach user code
            Value::Stopped | Value::Loop(_) | Value::HardReturn => b"nulltype",
        }
    }
}

/// Key domain for dictionaries. Names compare by byte identity, numbers by
/// value (an integral real collapses to its integer), strings by content
/// (converted to names at insertion).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Name(Name),
    Int(i32),
    /// Non-integral real, keyed by bit pattern.
    RealBits(u32),
    Bool(bool),
}

impl DictKey {
    /// Converts an object to its key form. Strings become names; null and the
    /// engine markers cannot be keys.
    pub fn from_object(ctx: &Context, obj: &Object) -> PsResult<DictKey> {
        Ok(match &obj.value {
            Value::Name(name) => DictKey::Name(name.clone()),
            Value::Int(n) => DictKey::Int(*n),
            Value::Real(r) => {
                if r.fract() == 0.0 && *r >= i32::MIN as f32 && *r <= i32::MAX as f32 {
                    DictKey::Int(*r as i32)
                } else {
                    DictKey::RealBits(r.to_bits())
                }
            }
            Value::Bool(b) => DictKey::Bool(*b),
            Value::String(s) => DictKey::Name(Name::from_vec(ctx.vm().string_bytes(*s).to_vec())),
            Value::Null => anyhow::bail!(ErrorKind::TypeCheck),
            _ => anyhow::bail!(ErrorKind::TypeCheck),
        })
    }

    pub fn name(bytes: &[u8]) -> DictKey {
        DictKey::Name(Name::new(bytes))
    }
}

/// Backing store for an array arena slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayStore {
    inner: Vec<Object>,
}

impl ArrayStore {
    pub fn new(inner: Vec<Object>) -> Self {
        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn get(&self, idx: usize) -> PsResult<&Object> {
        self.inner.get(idx).ok_or_else(|| anyhow::anyhow!(ErrorKind::RangeCheck))
    }

    pub fn put(&mut self, idx: usize, obj: Object) -> PsResult<()> {
        match self.inner.get_mut(idx) {
            Some(slot) => {
                *slot = obj;
                Ok(())
            }
            None => anyhow::bail!(ErrorKind::RangeCheck),
        }
    }

    pub fn as_slice(&self) -> &[Object] {
        &self.inner
    }

    pub fn as_mut_slice(&mut self) -> &mut [Object] {
        &mut self.inner
    }
}

/// Backing store for a string arena slot. Strings are byte arrays; executable
/// strings double as tokenizer sources.
#[derive(Debug, Clone, PartialEq)]
pub struct StringStore {
    inner: Vec<u8>,
}

impl StringStore {
    pub fn new(inner: Vec<u8>) -> Self {
        Self { inner }
    }

    pub fn zeroed(len: usize) -> Self {
        Self { inner: vec![0; len] }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.inner
    }
}

/// Backing store for a dictionary arena slot. `max_length` is the declared
/// capacity; Level 2 dictionaries grow past it and `maxlength` reports the
/// grown value.
#[derive(Debug, Clone, PartialEq)]
pub struct DictStore {
    inner: std::collections::HashMap<DictKey, Object>,
    order: Vec<DictKey>,
    pub access: Access,
    max_length: usize,
}

impl DictStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: std::collections::HashMap::with_capacity(capacity),
            order: Vec::new(),
            access: Access::default(),
            max_length: capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn max_length(&self) -> usize {
        self.max_length.max(self.inner.len())
    }

    pub fn contains(&self, key: &DictKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &DictKey) -> Option<&Object> {
        self.inner.get(key)
    }

    pub fn insert(&mut self, key: DictKey, value: Object) {
        if !self.inner.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.inner.insert(key, value);
    }

    pub fn remove(&mut self, key: &DictKey) {
        if self.inner.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    /// Entries in insertion order, for `forall` and `copy`.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&DictKey, &Object)> {
        self.order.iter().filter_map(move |k| self.inner.get(k).map(|v| (k, v)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn access_ordering() {
        assert!(Access::Unlimited.allows(Access::ReadOnly));
        assert!(Access::ReadOnly.allows(Access::ReadOnly));
        assert!(!Access::ExecuteOnly.allows(Access::ReadOnly));
        assert!(!Access::None.allows(Access::ExecuteOnly));
    }

    #[test]
    fn access_only_tightens() {
        assert_eq!(
            Access::ExecuteOnly.tightened_to(Access::ReadOnly),
            Access::ExecuteOnly
        );
        assert_eq!(
            Access::Unlimited.tightened_to(Access::ReadOnly),
            Access::ReadOnly
        );
    }

    #[test]
    fn names_compare_by_bytes() {
        assert_eq!(Name::new(b"moveto"), Name::new(b"moveto"));
        assert_ne!(Name::new(b"moveto"), Name::new(b"lineto"));
    }

    #[test]
    fn dict_preserves_insertion_order() {
        let mut dict = DictStore::with_capacity(4);
        dict.insert(DictKey::name(b"b"), Object::int(1));
        dict.insert(DictKey::name(b"a"), Object::int(2));
        dict.insert(DictKey::name(b"c"), Object::int(3));

        let keys: Vec<_> = dict.iter_ordered().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![DictKey::name(b"b"), DictKey::name(b"a"), DictKey::name(b"c")]
        );
    }

    #[test]
    fn dict_grows_past_declared_capacity() {
        let mut dict = DictStore::with_capacity(1);
        dict.insert(DictKey::name(b"a"), Object::int(1));
        dict.insert(DictKey::name(b"b"), Object::int(2));
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.max_length(), 2);
    }
}
