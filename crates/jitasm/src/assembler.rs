//! The assembler session: operand normalization, catalog-driven dispatch,
//! label management, and finalization.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use crate::buffer::{CodeBuffer, FinalizedBuffer};
use crate::engine;
use crate::error::JitError;
use crate::label::LabelTable;
use crate::operand::{Label, Mode, Operand, RawOperand};

/// One code-generation session: a code buffer, a label table, and the
/// engine's mnemonic catalog, bound together under a single mode.
///
/// Every catalog mnemonic is reachable through [`emit`](Assembler::emit);
/// the common ones also have named wrapper methods generated from the same
/// mnemonic data (`asm.mov(..)`, `asm.ret()`, …).  Emission order is
/// significant, so a session is driven from one thread at a time — the
/// `&mut self` API enforces exactly that.
///
/// # Examples
///
/// ```
/// use jitasm::{Assembler, Mode};
///
/// let mut asm = Assembler::new(Mode::X64);
/// asm.mov("eax", 123)?;
/// asm.ret()?;
/// let code = asm.finish()?;
/// assert_eq!(code.bytes(), &[0xB8, 0x7B, 0x00, 0x00, 0x00, 0xC3]);
/// # Ok::<(), jitasm::JitError>(())
/// ```
#[derive(Debug)]
pub struct Assembler {
    mode: Mode,
    buf: CodeBuffer,
    labels: LabelTable,
    /// Sorted mnemonic catalog, read from the engine at construction.
    catalog: Vec<String>,
}

impl Assembler {
    /// Create a session for the given mode.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            buf: CodeBuffer::new(),
            labels: LabelTable::new(),
            catalog: engine::mnemonics(),
        }
    }

    /// The session's encoding mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The mnemonic catalog this session dispatches over, sorted.
    pub fn operations(&self) -> &[String] {
        &self.catalog
    }

    /// Current buffer offset — the address the next instruction lands at.
    pub fn position(&self) -> usize {
        self.buf.position()
    }

    /// Attach the diagnostic sink: one formatted line per successfully
    /// emitted instruction, readable from the finalized buffer's
    /// [`trace`](FinalizedBuffer::trace).
    pub fn enable_trace(&mut self) -> &mut Self {
        self.buf.enable_trace();
        self
    }

    /// Allocate a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    /// Bind `label` to the current position and patch every reference
    /// recorded so far.  References emitted later patch immediately.
    ///
    /// # Errors
    ///
    /// [`JitError::LabelAlreadyBound`] when the label is already bound;
    /// [`JitError::DisplacementOutOfRange`] when a pending 8-bit reference
    /// cannot reach this position.
    pub fn bind(&mut self, label: Label) -> Result<&mut Self, JitError> {
        let position = self.buf.position();
        self.labels.bind(label, position, &mut self.buf)?;
        Ok(self)
    }

    /// Emit one instruction by mnemonic.
    ///
    /// Arguments are shorthand ([`RawOperand`]): bare integers, register
    /// name tokens, [`Mem`](crate::Mem) references, labels.  The named
    /// wrapper methods all forward here.
    ///
    /// # Errors
    ///
    /// - [`JitError::UnknownMnemonic`] — `mnemonic` is not in the catalog.
    /// - [`JitError::UnknownOperand`] — an argument fails normalization.
    /// - [`JitError::InvalidInstruction`] — the engine rejects the
    ///   combination; the message reproduces the arguments exactly as
    ///   supplied.
    /// - [`JitError::DisplacementOutOfRange`] — a backward 8-bit branch
    ///   cannot reach its target.
    ///
    /// Nothing is appended to the buffer on any error path.
    pub fn emit(&mut self, mnemonic: &str, args: &[RawOperand]) -> Result<&mut Self, JitError> {
        if self
            .catalog
            .binary_search_by(|n| n.as_str().cmp(mnemonic))
            .is_err()
        {
            return Err(JitError::UnknownMnemonic {
                mnemonic: String::from(mnemonic),
            });
        }

        let mut ops = Vec::with_capacity(args.len());
        for arg in args {
            ops.push(arg.normalize(self.mode)?);
        }

        let encoded = match engine::encode(mnemonic, &ops, self.mode) {
            Some(Ok(encoded)) => encoded,
            Some(Err(rejection)) => {
                return Err(JitError::InvalidInstruction {
                    mnemonic: String::from(mnemonic),
                    operands: render_raw_args(args),
                    detail: rejection.detail,
                });
            }
            // The catalog covers everything the engine dispatches, so this
            // arm only fires if the two ever disagree.
            None => {
                return Err(JitError::UnknownMnemonic {
                    mnemonic: String::from(mnemonic),
                });
            }
        };

        let position = self.buf.position();

        // Pre-flight the displacement for already-bound targets so the
        // all-or-nothing append guarantee holds.
        if let Some(fx) = &encoded.fixup {
            self.labels
                .check_reference(fx.label, position + fx.offset, fx.kind)?;
        }

        self.buf.emit(&encoded.bytes);
        if let Some(fx) = encoded.fixup {
            self.labels
                .record(fx.label, position + fx.offset, fx.kind, &mut self.buf)?;
        }

        if self.buf.is_tracing() {
            let line = self.render_trace(mnemonic, &ops);
            self.buf.trace_line(line);
        }
        Ok(self)
    }

    /// Finalize the session: verify that every label is bound, then freeze
    /// the buffer.
    ///
    /// # Errors
    ///
    /// [`JitError::UnboundLabelAtFinalize`] listing every label that was
    /// created but never bound.
    pub fn finish(self) -> Result<FinalizedBuffer, JitError> {
        let unbound = self.labels.unbound();
        if !unbound.is_empty() {
            return Err(JitError::UnboundLabelAtFinalize { labels: unbound });
        }
        Ok(self.buf.finalize())
    }

    /// Format one trace line: `mnemonic op, op` with bound labels shown at
    /// their resolved address.
    fn render_trace(&self, mnemonic: &str, ops: &[Operand]) -> String {
        let mut line = String::from(mnemonic);
        for (i, op) in ops.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });
            match op {
                Operand::Label(l) => match self.labels.address_of(*l) {
                    Ok(Some(addr)) => {
                        let _ = write!(line, "0x{:X}", addr);
                    }
                    _ => {
                        let _ = write!(line, "{}", l);
                    }
                },
                _ => {
                    let _ = write!(line, "{}", op);
                }
            }
        }
        line
    }
}

/// Comma-join the caller's literal arguments for diagnostics.
fn render_raw_args(args: &[RawOperand]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", arg);
    }
    out
}

/// Generates the named wrapper methods (and the list a test checks against
/// the engine catalog) from one mnemonic table, grouped by the arity the
/// wrapper exposes.  `loop` stays macro-less — it is a Rust keyword — and
/// is reached through [`Assembler::emit`].
macro_rules! wrapper_ops {
    (
        nullary: [$($n0:ident),* $(,)?],
        unary: [$($n1:ident),* $(,)?],
        binary: [$($n2:ident),* $(,)?] $(,)?
    ) => {
        /// Every mnemonic exposed as a named wrapper method.
        pub const WRAPPER_MNEMONICS: &[&str] = &[
            $(stringify!($n0),)*
            $(stringify!($n1),)*
            $(stringify!($n2),)*
        ];

        impl Assembler {
            $(
                #[doc = concat!("Emit `", stringify!($n0), "`.")]
                pub fn $n0(&mut self) -> Result<&mut Self, JitError> {
                    self.emit(stringify!($n0), &[])
                }
            )*
            $(
                #[doc = concat!("Emit `", stringify!($n1), " op`.")]
                pub fn $n1(&mut self, op: impl Into<RawOperand>) -> Result<&mut Self, JitError> {
                    self.emit(stringify!($n1), &[op.into()])
                }
            )*
            $(
                #[doc = concat!("Emit `", stringify!($n2), " dst, src`.")]
                pub fn $n2(
                    &mut self,
                    dst: impl Into<RawOperand>,
                    src: impl Into<RawOperand>,
                ) -> Result<&mut Self, JitError> {
                    self.emit(stringify!($n2), &[dst.into(), src.into()])
                }
            )*
        }
    };
}

wrapper_ops! {
    nullary: [nop, ret, leave, int3, hlt, syscall, cpuid, rdtsc, pause, cdq, cqo, mfence],
    unary: [
        push, pop, inc, dec, neg, not, mul, div, idiv,
        jmp, call,
        je, jne, jz, jnz, jl, jle, jg, jge, ja, jae, jb, jbe, js, jns, jo, jno,
        sete, setne, setz, setnz, setl, setle, setg, setge, seta, setb,
    ],
    binary: [
        mov, add, sub, adc, sbb, and, or, xor, cmp, test, lea, xchg, imul,
        shl, shr, sar, rol, ror, movzx, movsx,
        cmove, cmovne, cmovz, cmovnz, cmovl, cmovg,
    ],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Register;
    use alloc::string::ToString;

    #[test]
    fn catalog_is_read_from_the_engine() {
        let asm = Assembler::new(Mode::X64);
        assert_eq!(asm.operations(), engine::mnemonics().as_slice());
    }

    #[test]
    fn wrappers_are_catalog_entries() {
        let asm = Assembler::new(Mode::X64);
        for &name in WRAPPER_MNEMONICS {
            assert!(
                asm.operations().iter().any(|n| n == name),
                "wrapper {} is not in the engine catalog",
                name
            );
        }
    }

    #[test]
    fn wrapper_and_emit_agree() {
        let mut a = Assembler::new(Mode::X64);
        a.mov("eax", 0x123).unwrap();
        let mut b = Assembler::new(Mode::X64);
        b.emit("mov", &["eax".into(), 0x123.into()]).unwrap();
        assert_eq!(a.finish().unwrap().bytes(), b.finish().unwrap().bytes());
    }

    #[test]
    fn emit_appends_and_advances() {
        let mut asm = Assembler::new(Mode::X64);
        assert_eq!(asm.position(), 0);
        asm.nop().unwrap();
        assert_eq!(asm.position(), 1);
        asm.ret().unwrap();
        assert_eq!(asm.finish().unwrap().bytes(), &[0x90, 0xC3]);
    }

    #[test]
    fn chained_emission() {
        let mut asm = Assembler::new(Mode::X64);
        asm.push(Register::Rbp)
            .unwrap()
            .mov("rbp", "rsp")
            .unwrap()
            .pop(Register::Rbp)
            .unwrap()
            .ret()
            .unwrap();
        let code = asm.finish().unwrap();
        assert_eq!(code.bytes()[0], 0x55);
        assert_eq!(*code.bytes().last().unwrap(), 0xC3);
    }

    #[test]
    fn trace_records_emission_order() {
        let mut asm = Assembler::new(Mode::X64);
        asm.enable_trace();
        asm.mov("eax", 0x123).unwrap();
        asm.mov("eax", 0x456).unwrap();
        let code = asm.finish().unwrap();
        assert_eq!(code.trace(), ["mov eax, 0x123", "mov eax, 0x456"]);
    }

    #[test]
    fn trace_absent_without_sink() {
        let mut asm = Assembler::new(Mode::X64);
        asm.mov("eax", 1).unwrap();
        assert!(asm.finish().unwrap().trace().is_empty());
    }

    #[test]
    fn unknown_mnemonic() {
        let mut asm = Assembler::new(Mode::X64);
        let err = asm.emit("frobnicate", &[]).unwrap_err();
        assert_eq!(err.to_string(), "UnknownMnemonic: frobnicate");
        assert_eq!(asm.position(), 0);
    }

    #[test]
    fn invalid_instruction_without_operands() {
        let mut asm = Assembler::new(Mode::X64);
        let err = asm.emit("add", &[]).unwrap_err();
        assert_eq!(err.to_string(), "InvalidInstruction: add");
    }

    #[test]
    fn invalid_instruction_reports_literal_operands() {
        let mut asm = Assembler::new(Mode::X64);
        let err = asm.add(1, 2).unwrap_err();
        assert_eq!(err.to_string(), "InvalidInstruction: add 1, 2");
        // Nothing was appended.
        assert_eq!(asm.position(), 0);
    }

    #[test]
    fn unknown_operand_reported_before_engine() {
        let mut asm = Assembler::new(Mode::X64);
        let err = asm.mov("foo", 5).unwrap_err();
        assert_eq!(err.to_string(), "UnknownOperand: foo");
        assert_eq!(asm.position(), 0);
    }

    #[test]
    fn backward_branch_binds_and_patches() {
        let mut asm = Assembler::new(Mode::X64);
        let top = asm.new_label();
        asm.mov("rcx", 10).unwrap();
        asm.bind(top).unwrap();
        asm.sub("rcx", 1).unwrap();
        asm.jnz(top).unwrap();
        let code = asm.finish().unwrap();
        // jnz is the last 6 bytes; its rel32 points back to offset 7.
        let len = code.bytes().len();
        let disp = i32::from_le_bytes(code.bytes()[len - 4..].try_into().unwrap());
        assert_eq!(disp, 7 - len as i32);
    }

    #[test]
    fn forward_branch_patches_at_bind() {
        let mut asm = Assembler::new(Mode::X64);
        let done = asm.new_label();
        asm.jmp(done).unwrap();
        asm.nop().unwrap();
        asm.bind(done).unwrap();
        asm.ret().unwrap();
        let code = asm.finish().unwrap();
        // jmp rel32 over one nop: disp = 6 - 5 = 1
        assert_eq!(code.bytes(), &[0xE9, 0x01, 0x00, 0x00, 0x00, 0x90, 0xC3]);
    }

    #[test]
    fn unbound_label_fails_finalize() {
        let mut asm = Assembler::new(Mode::X64);
        let _orphan = asm.new_label();
        asm.ret().unwrap();
        let err = asm.finish().unwrap_err();
        assert_eq!(err.to_string(), "UnboundLabelAtFinalize: L0");
    }

    #[test]
    fn rebinding_a_label_fails() {
        let mut asm = Assembler::new(Mode::X64);
        let label = asm.new_label();
        asm.bind(label).unwrap();
        asm.nop().unwrap();
        let err = asm.bind(label).unwrap_err();
        assert!(matches!(err, JitError::LabelAlreadyBound { label: 0, .. }));
    }

    #[test]
    fn trace_shows_bound_branch_target() {
        let mut asm = Assembler::new(Mode::X64);
        asm.enable_trace();
        let top = asm.new_label();
        asm.bind(top).unwrap();
        asm.sub("rax", 1).unwrap();
        asm.jnz(top).unwrap();
        let code = asm.finish().unwrap();
        assert_eq!(code.trace(), ["sub rax, 0x1", "jnz 0x0"]);
    }

    #[test]
    fn emit_through_catalog_only() {
        // `loop` has no wrapper (keyword) but dispatches through emit.
        let mut asm = Assembler::new(Mode::X64);
        let top = asm.new_label();
        asm.bind(top).unwrap();
        asm.emit("loop", &[top.into()]).unwrap();
        let code = asm.finish().unwrap();
        assert_eq!(code.bytes(), &[0xE2, 0xFE]);
    }

    #[test]
    fn mode_restricts_operands() {
        let mut asm = Assembler::new(Mode::X86);
        let err = asm.mov("rax", 1).unwrap_err();
        assert_eq!(err.to_string(), "UnknownOperand: rax");
        asm.mov("eax", 1).unwrap();
        assert_eq!(asm.finish().unwrap().bytes(), &[0xB8, 1, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_rel8_appends_nothing() {
        let mut asm = Assembler::new(Mode::X64);
        let top = asm.new_label();
        asm.bind(top).unwrap();
        for _ in 0..200 {
            asm.nop().unwrap();
        }
        let before = asm.position();
        let err = asm.emit("loop", &[top.into()]).unwrap_err();
        assert!(matches!(err, JitError::DisplacementOutOfRange { .. }));
        assert_eq!(asm.position(), before);
    }

    #[test]
    fn raw_args_render() {
        assert_eq!(render_raw_args(&[]), "");
        assert_eq!(render_raw_args(&[1.into(), 2.into()]), "1, 2");
        assert_eq!(render_raw_args(&["eax".into(), 7.into()]), "eax, 7");
    }
}
