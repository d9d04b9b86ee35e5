//! Code objects and the compiler/executor collaborators.
//!
//! The import machinery treats compiled code as opaque: a `Compiler` turns
//! source text into a `CodeObject` and back to bytes, an `Executor` runs a
//! `CodeObject` against a module's namespace. Neither is implemented here;
//! `crate::script` provides the reference pair.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::error::{CodeFormatError, CompileError, ImportResult};
use super::module::Module;
use super::ImportSystem;

/// An executable unit produced by a `Compiler`.
#[derive(Clone)]
pub struct CodeObject {
    filename: Arc<str>,
    body: Arc<dyn Any + Send + Sync>,
}

impl CodeObject {
    pub fn new<T: Any + Send + Sync>(filename: impl Into<Arc<str>>, body: T) -> Self {
        Self {
            filename: filename.into(),
            body: Arc::new(body),
        }
    }

    /// File the code was compiled from.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Borrow the compiler-specific body.
    pub fn body<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }
}

impl fmt::Debug for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeObject")
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

/// Turns source text into code objects and code objects into bytes.
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str, filename: &str) -> Result<CodeObject, CompileError>;

    fn serialize(&self, code: &CodeObject) -> Result<Vec<u8>, CodeFormatError>;

    fn deserialize(&self, bytes: &[u8], filename: &str) -> Result<CodeObject, CodeFormatError>;
}

/// Runs a code object inside a module's namespace.
///
/// Errors raised by user code must be returned unchanged; nested imports go
/// back through `sys`.
pub trait Executor: Send + Sync {
    fn execute(&self, code: &CodeObject, module: &Arc<Module>, sys: &ImportSystem) -> ImportResult<()>;
}

/// Decode source bytes as UTF-8 and translate `\r\n` and `\r` to `\n`.
pub fn decode_source(bytes: &[u8], filename: &str) -> Result<String, CompileError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
        CompileError::new(filename, line, format!("source is not valid UTF-8: {}", e))
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if !text.contains('\r') {
        return Ok(text.to_string());
    }
    Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_universal_newlines() {
        let decoded = decode_source(b"a = 1\r\nb = 2\rc = 3\n", "m").unwrap();
        assert_eq!(decoded, "a = 1\nb = 2\nc = 3\n");
    }

    #[test]
    fn test_decode_strips_bom() {
        let decoded = decode_source(b"\xef\xbb\xbfx = 1", "m").unwrap();
        assert_eq!(decoded, "x = 1");
    }

    #[test]
    fn test_decode_invalid_utf8_reports_line() {
        let err = decode_source(b"ok\nbad \xff", "m.src").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.filename, "m.src");
    }

    #[test]
    fn test_code_object_body_downcast() {
        let code = CodeObject::new("f", 42u32);
        assert_eq!(code.body::<u32>(), Some(&42));
        assert!(code.body::<String>().is_none());
        assert_eq!(code.filename(), "f");
    }
}
