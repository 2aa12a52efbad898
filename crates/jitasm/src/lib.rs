//! # jitasm — runtime x86/x86-64 assembler with executable binding
//!
//! `jitasm` builds machine-code sequences at runtime through a typed,
//! shorthand-friendly operand model, and exposes the finished bytes either
//! as an inspectable buffer (with an optional per-instruction trace) or as
//! live executable memory invocable like a native function.
//!
//! ## Quick Start
//!
//! ```rust
//! use jitasm::{assemble, Mode};
//!
//! let code = assemble(Mode::X64, |asm| {
//!     asm.mov("eax", 123)?;
//!     asm.ret()?;
//!     Ok(())
//! })?;
//! assert_eq!(code.bytes(), &[0xB8, 0x7B, 0x00, 0x00, 0x00, 0xC3]);
//! # Ok::<(), jitasm::JitError>(())
//! ```
//!
//! Running the generated code (needs the `exec` feature and an x86-64
//! unix host):
//!
//! ```rust,no_run
//! use jitasm::{assemble, Mode, ReturnKind};
//!
//! let code = assemble(Mode::X64, |asm| {
//!     asm.mov("eax", 123)?;
//!     asm.ret()?;
//!     Ok(())
//! })?
//! .to_executable()?;
//!
//! // SAFETY: the sequence above is a zero-argument SysV function.
//! let f = unsafe { code.callable(0, ReturnKind::I32)? };
//! assert_eq!(f.call(&[])?, 123);
//! # Ok::<(), jitasm::JitError>(())
//! ```
//!
//! ## Features
//!
//! - **Typed operands with shorthand** — bare integers, register-name
//!   tokens, structured [`Mem`] references, and [`Label`]s all normalize
//!   into one operand model.
//! - **Open mnemonic catalog** — every instruction the engine declares is
//!   reachable through [`Assembler::emit`]; the common ones also have
//!   named wrapper methods.
//! - **Labels & relocation** — forward and backward branches with in-place
//!   displacement patching, 8-bit and 32-bit reference kinds.
//! - **Executable binding** (`exec` feature, unix) — W^X-mapped artifacts,
//!   arity-checked callables, and a name → method registry.
//! - **`no_std` + `alloc`** — the construction core runs without `std`.

#![cfg_attr(not(feature = "std"), no_std)]
// An assembler performs many deliberate narrowing casts between integer
// widths and uses dense hex literals; these lints fire on that idiom.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

extern crate alloc;

/// Assembler session: catalog-driven dispatch, labels, finalization.
pub mod assembler;
/// Code buffer and its finalized, immutable form.
pub mod buffer;
/// x86/x86-64 instruction encoding engine and mnemonic catalog.
pub mod engine;
/// Error types.
pub mod error;
/// Executable-memory binding: artifacts, callables, method tables.
#[cfg(all(feature = "exec", unix))]
pub mod exec;
/// Typed operand model and shorthand normalization.
pub mod operand;

mod label;

// Re-exports
pub use assembler::Assembler;
pub use buffer::{CodeBuffer, FinalizedBuffer};
pub use engine::{mnemonics, EncodedInstr, Fixup, InstrBytes, RefKind, Reject};
pub use error::JitError;
#[cfg(all(feature = "exec", unix))]
pub use exec::{Callable, ExecutableCode, MethodTable, ReturnKind, MAX_ARITY};
pub use operand::{
    byte_ptr, dword_ptr, qword_ptr, word_ptr, Label, Mem, Mode, Operand, RawOperand, Register,
    Width,
};

/// Run one assembly session to completion and finalize it.
///
/// Creates a session for `mode`, hands it to `build`, and returns the
/// finalized buffer.  Tracing is enabled so the result carries the
/// per-instruction emission trace.
///
/// # Errors
///
/// Returns whatever [`JitError`] the builder raises, or
/// [`JitError::UnboundLabelAtFinalize`] if a label was created but never
/// bound.
///
/// # Examples
///
/// ```rust
/// use jitasm::{assemble, Mode};
///
/// let code = assemble(Mode::X64, |asm| {
///     asm.mov("eax", 0x123)?;
///     asm.mov("eax", 0x456)?;
///     Ok(())
/// })?;
/// assert_eq!(code.trace(), ["mov eax, 0x123", "mov eax, 0x456"]);
/// # Ok::<(), jitasm::JitError>(())
/// ```
pub fn assemble<F>(mode: Mode, build: F) -> Result<FinalizedBuffer, JitError>
where
    F: FnOnce(&mut Assembler) -> Result<(), JitError>,
{
    let mut asm = Assembler::new(mode);
    asm.enable_trace();
    build(&mut asm)?;
    asm.finish()
}
