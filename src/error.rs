use std::fmt;

macro_rules! err {
    ($base:ident, $msg:literal) => {
        TranslateError::with_context($base, $msg.to_string())
    };
    ($base:ident, $fmtstr:literal, $($args:tt)*) => {
        TranslateError::with_context($base, format!($fmtstr, $($args)*))
    };
    ($msg:literal) => {
        TranslateError::new($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        TranslateError::new(&format!($fmtstr, $($args)*))
    };
}

#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        return Err($crate::error::TranslateError::new($msg))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err($crate::error::TranslateError::new(&format!($fmtstr, $($args)*)))
    };
}

/// Returns a class file limit error, triggering the optimized retry.
#[macro_export]
macro_rules! limit {
    ($msg:literal) => {
        return Err($crate::error::TranslateError::limit_exceeded($msg))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err($crate::error::TranslateError::limit_exceeded(&format!($fmtstr, $($args)*)))
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind
{
    /// Input the translator cannot handle: bad operands, unknown opcodes, missing hints.
    Malformed,
    /// A class file format limit was hit (constant pool size, code length).
    LimitExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateError
{
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl TranslateError
{
    pub(crate) fn new(msg: &str) -> Self
    {
        TranslateError {
            kind: ErrorKind::Malformed,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn limit_exceeded(msg: &str) -> Self
    {
        TranslateError {
            kind: ErrorKind::LimitExceeded,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(base: TranslateError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        TranslateError { kind: base.kind, msg: base.msg, contexts }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn is_limit_exceeded(&self) -> bool
    {
        self.kind == ErrorKind::LimitExceeded
    }

    pub fn message(&self) -> &str
    {
        &self.msg
    }
}

impl fmt::Display for TranslateError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for TranslateError {}
