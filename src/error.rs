use std::fmt;

/// Result alias used throughout the interpreter. PostScript-level errors are
/// `ErrorKind` values carried inside `anyhow::Error`; the execution engine
/// recovers them with `downcast_ref` and runs the errordict protocol.
pub type PsResult<T> = anyhow::Result<T>;

/*
PLRM appendix, errors recognized by the language:

configurationerror setpagedevice or setdevparams request cannot be satisfied
dictfull           No more room in dictionary
dictstackoverflow  Too many begin operators
dictstackunderflow Too many end operators
execstackoverflow  Executive stack nesting too deep
handleerror        Called to report error information
interrupt          External interrupt request (for example, Control-C)
invalidaccess      Attempt to violate access attribute
invalidexit        exit not in loop
invalidfileaccess  Unacceptable access string
invalidfont        Invalid Font resource name or font or CIDFont dictionary
invalidrestore     Improper restore
ioerror            Input/output error
limitcheck         Implementation limit exceeded
nocurrentpoint     Current point undefined
rangecheck         Operand out of bounds
stackoverflow      Operand stack overflow
stackunderflow     Operand stack underflow
syntaxerror        PostScript language syntax error
timeout            Time limit exceeded
typecheck          Operand of wrong type
undefined          Name not known
undefinedfilename  File not found
undefinedresource  Resource instance not found
undefinedresult    Overflow, underflow, or meaningless result
unmatchedmark      Expected mark not on stack
unregistered       Internal error
VMerror            Virtual memory exhausted
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigurationError,

    /// No more room in dictionary
    DictFull,

    /// Too many begin operators
    DictStackOverflow,

    /// Too many end operators
    DictStackUnderflow,

    /// Execution stack nesting too deep
    ExecStackOverflow,

    /// External interrupt request
    Interrupt,

    /// Attempt to violate access attribute
    InvalidAccess,

    /// exit not in loop
    InvalidExit,

    /// Unacceptable access string
    InvalidFileAccess,

    /// Invalid Font resource name or font dictionary
    InvalidFont,

    /// Improper restore
    InvalidRestore,

    /// Input/output error
    IoError,

    /// Implementation limit exceeded
    LimitCheck,

    /// Current point undefined
    NoCurrentPoint,

    /// Operand out of bounds
    RangeCheck,

    /// Operand stack overflow
    StackOverflow,

    /// Operand stack underflow
    StackUnderflow,

    /// PostScript language syntax error
    SyntaxError,

    /// Time limit exceeded
    Timeout,

    /// Operand of wrong type
    TypeCheck,

    /// Name not known
    Undefined,

    /// File not found
    UndefinedFilename,

    /// Resource instance not found
    UndefinedResource,

    /// Overflow, underflow, or meaningless result
    UndefinedResult,

    /// Expected mark not on stack
    UnmatchedMark,

    /// Internal error
    Unregistered,

    /// Virtual memory exhausted
    VmError,
}

impl ErrorKind {
    /// The PostScript name of this error, as installed in errordict and
    /// reported in `$error`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "configurationerror",
            ErrorKind::DictFull => "dictfull",
            ErrorKind::DictStackOverflow => "dictstackoverflow",
            ErrorKind::DictStackUnderflow => "dictstackunderflow",
            ErrorKind::ExecStackOverflow => "execstackoverflow",
            ErrorKind::Interrupt => "interrupt",
            ErrorKind::InvalidAccess => "invalidaccess",
            ErrorKind::InvalidExit => "invalidexit",
            ErrorKind::InvalidFileAccess => "invalidfileaccess",
            ErrorKind::InvalidFont => "invalidfont",
            ErrorKind::InvalidRestore => "invalidrestore",
            ErrorKind::IoError => "ioerror",
            ErrorKind::LimitCheck => "limitcheck",
            ErrorKind::NoCurrentPoint => "nocurrentpoint",
            ErrorKind::RangeCheck => "rangecheck",
            ErrorKind::StackOverflow => "stackoverflow",
            ErrorKind::StackUnderflow => "stackunderflow",
            ErrorKind::SyntaxError => "syntaxerror",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TypeCheck => "typecheck",
            ErrorKind::Undefined => "undefined",
            ErrorKind::UndefinedFilename => "undefinedfilename",
            ErrorKind::UndefinedResource => "undefinedresource",
            ErrorKind::UndefinedResult => "undefinedresult",
            ErrorKind::UnmatchedMark => "unmatchedmark",
            ErrorKind::Unregistered => "unregistered",
            ErrorKind::VmError => "VMerror",
        }
    }

    /// Every recognized error, in errordict seeding order.
    pub const ALL: [ErrorKind; 27] = [
        ErrorKind::ConfigurationError,
        ErrorKind::DictFull,
        ErrorKind::DictStackOverflow,
        ErrorKind::DictStackUnderflow,
        ErrorKind::ExecStackOverflow,
        ErrorKind::Interrupt,
        ErrorKind::InvalidAccess,
        ErrorKind::InvalidExit,
        ErrorKind::InvalidFileAccess,
        ErrorKind::InvalidFont,
        ErrorKind::InvalidRestore,
        ErrorKind::IoError,
        ErrorKind::LimitCheck,
        ErrorKind::NoCurrentPoint,
        ErrorKind::RangeCheck,
        ErrorKind::StackOverflow,
        ErrorKind::StackUnderflow,
        ErrorKind::SyntaxError,
        ErrorKind::Timeout,
        ErrorKind::TypeCheck,
        ErrorKind::Undefined,
        ErrorKind::UndefinedFilename,
        ErrorKind::UndefinedResource,
        ErrorKind::UndefinedResult,
        ErrorKind::UnmatchedMark,
        ErrorKind::Unregistered,
        ErrorKind::VmError,
    ];

    pub fn from_name(name: &[u8]) -> Option<ErrorKind> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().as_bytes() == name)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for ErrorKind {}

#[cfg(test)]
mod test {
    use super::ErrorKind;

    #[test]
    fn names_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_name(kind.name().as_bytes()), Some(kind));
        }
    }

    #[test]
    fn vmerror_capitalization() {
        assert_eq!(ErrorKind::VmError.name(), "VMerror");
    }

    #[test]
    fn recoverable_through_anyhow() {
        let err = anyhow::Error::new(ErrorKind::TypeCheck);
        assert_eq!(err.downcast_ref::<ErrorKind>(), Some(&ErrorKind::TypeCheck));
    }
}
