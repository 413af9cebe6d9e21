use std::fmt;

macro_rules! err {
    ($kind:ident, $msg:literal) => {
        DexError::new(ErrorKind::$kind, $msg)
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::new(ErrorKind::$kind, &format!($fmtstr, $($args)*))
    };
}

#[macro_export]
macro_rules! fail {
    ($kind:ident, $msg:literal) => {
        return Err($crate::dex::error::DexError::new($crate::dex::error::ErrorKind::$kind, $msg))
    };
    ($kind:ident, $fmtstr:literal, $($args:tt)*) => {
        return Err($crate::dex::error::DexError::new($crate::dex::error::ErrorKind::$kind, &format!($fmtstr, $($args)*)))
    };
}

/// Failure classes of the decoder.
///
/// Only `Structural` rejects a whole container; the other kinds void the
/// entity being decoded and are absorbed by the caller's iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{
    /// Bad magic, the container cannot be a DEX file
    Structural,
    /// An offset, length or index outside of the buffer or its table
    Bounds,
    /// Malformed LEB128 or a string whose length and content disagree
    Encoding,
    /// An untrusted count that cannot possibly fit in the remaining buffer
    ResourceLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    kind: ErrorKind,
    msg: String,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(kind: ErrorKind, msg: &str) -> Self
    {
        DexError {
            kind,
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError { kind: base.kind, msg: base.msg, contexts }
    }

    pub fn kind(&self) -> ErrorKind
    {
        self.kind
    }

    pub fn is_structural(&self) -> bool
    {
        self.kind == ErrorKind::Structural
    }
}

impl fmt::Display for DexError
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

impl std::error::Error for DexError {}

impl From<nom::Err<nom::error::Error<&[u8]>>> for DexError
{
    fn from(e: nom::Err<nom::error::Error<&[u8]>>) -> Self
    {
        let msg = match e
        {
            nom::Err::Incomplete(_) => "truncated record".to_string(),
            nom::Err::Error(inner) | nom::Err::Failure(inner) => {
                format!("truncated record ({:?} with {} bytes left)", inner.code, inner.input.len())
            }
        };
        DexError::new(ErrorKind::Bounds, &msg)
    }
}
