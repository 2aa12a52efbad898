//! The code buffer and its finalized, immutable form.

use alloc::string::String;
use alloc::vec::Vec;

/// Append-only byte buffer owning everything emitted into one session.
///
/// Emission goes through the session's dispatch (`Assembler::emit`) and the
/// relocation table's patch step; client code never writes bytes directly.
/// Finalization consumes the session and transfers the bytes into a
/// [`FinalizedBuffer`], so emitting into finalized output is not
/// expressible.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    /// Trace lines, collected only when a diagnostic sink was attached.
    trace: Option<Vec<String>>,
}

impl CodeBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current write cursor — the address the next instruction lands at.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append encoded bytes at the cursor.
    pub(crate) fn emit(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Rewrite already-emitted bytes in place (relocation patching).
    ///
    /// # Panics
    ///
    /// Panics if the patch range is outside the emitted bytes; reference
    /// sites always lie inside instructions that were appended before the
    /// patch runs.
    pub(crate) fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Attach the trace sink.  Off by default to avoid per-instruction
    /// `String` allocations.
    pub(crate) fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(Vec::new());
        }
    }

    pub(crate) fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// Record one formatted emission line, if a sink is attached.
    pub(crate) fn trace_line(&mut self, line: String) {
        if let Some(trace) = &mut self.trace {
            trace.push(line);
        }
    }

    /// Freeze into the immutable result form.
    pub(crate) fn finalize(self) -> FinalizedBuffer {
        FinalizedBuffer {
            bytes: self.bytes,
            trace: self.trace.unwrap_or_default(),
        }
    }
}

/// The frozen result of one assembly session.
///
/// Contents and length are fixed; the only transitions left are reading
/// the bytes out or mapping them into executable memory.
///
/// # Examples
///
/// ```
/// use jitasm::{assemble, Mode};
///
/// let code = assemble(Mode::X64, |asm| {
///     asm.nop()?;
///     asm.ret()?;
///     Ok(())
/// })?;
/// assert_eq!(code.bytes(), &[0x90, 0xC3]);
/// # Ok::<(), jitasm::JitError>(())
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct FinalizedBuffer {
    bytes: Vec<u8>,
    trace: Vec<String>,
}

impl FinalizedBuffer {
    /// The machine-code bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte count.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no bytes were emitted.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// One formatted line per successfully emitted instruction, in
    /// emission order.  Empty unless the session had tracing enabled.
    pub fn trace(&self) -> &[String] {
        &self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn emit_advances_cursor() {
        let mut buf = CodeBuffer::new();
        assert_eq!(buf.position(), 0);
        buf.emit(&[0x90, 0xC3]);
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.bytes(), &[0x90, 0xC3]);
    }

    #[test]
    fn patch_rewrites_in_place() {
        let mut buf = CodeBuffer::new();
        buf.emit(&[0xE9, 0, 0, 0, 0]);
        buf.patch(1, &5i32.to_le_bytes());
        assert_eq!(buf.bytes(), &[0xE9, 5, 0, 0, 0]);
        assert_eq!(buf.position(), 5);
    }

    #[test]
    fn trace_is_opt_in() {
        let mut buf = CodeBuffer::new();
        buf.trace_line("nop".to_string());
        let frozen = buf.finalize();
        assert!(frozen.trace().is_empty());

        let mut buf = CodeBuffer::new();
        buf.enable_trace();
        buf.trace_line("nop".to_string());
        assert_eq!(buf.finalize().trace(), ["nop"]);
    }

    #[test]
    fn finalize_preserves_bytes() {
        let mut buf = CodeBuffer::new();
        buf.emit(&[1, 2, 3]);
        let frozen = buf.finalize();
        assert_eq!(frozen.bytes(), &[1, 2, 3]);
        assert_eq!(frozen.len(), 3);
        assert!(!frozen.is_empty());
        assert_eq!(frozen.into_bytes(), alloc::vec![1, 2, 3]);
    }
}
