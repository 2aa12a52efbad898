//! Error types for session construction and executable binding.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Any error raised while building or binding generated code.
///
/// Errors are local to one session or one executable artifact and are never
/// recovered from automatically: an instruction either appends fully or not
/// at all, and a failed binding leaves no artifact behind.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JitError {
    /// A shorthand token could not be resolved to any operand kind.
    ///
    /// Raised at normalization time, before the encoding engine is reached.
    UnknownOperand {
        /// The token that failed to normalize.
        token: String,
    },

    /// The mnemonic is not part of the engine's vocabulary.
    UnknownMnemonic {
        /// The unrecognized mnemonic.
        mnemonic: String,
    },

    /// The encoding engine rejected the mnemonic + operand combination.
    InvalidInstruction {
        /// The mnemonic exactly as supplied.
        mnemonic: String,
        /// The original, unnormalized argument list, comma-joined.
        /// Empty when the call supplied no operands.
        operands: String,
        /// The engine's rejection reason. Carried for `Debug` diagnostics;
        /// not part of the displayed message.
        detail: String,
    },

    /// A label was bound a second time.
    LabelAlreadyBound {
        /// Numeric identifier of the label.
        label: u32,
        /// The address the label is already bound to.
        address: usize,
    },

    /// The session was finalized while one or more labels remained unbound.
    UnboundLabelAtFinalize {
        /// Numeric identifiers of every unbound label, in creation order.
        labels: Vec<u32>,
    },

    /// A patched displacement does not fit the reference's field width.
    DisplacementOutOfRange {
        /// Numeric identifier of the target label.
        label: u32,
        /// The displacement that was computed.
        disp: i64,
        /// Maximum magnitude the field can hold.
        max: i64,
    },

    /// A callable was invoked with the wrong number of arguments.
    ///
    /// Raised before any control transfer into generated code.
    ArityMismatch {
        /// The arity the callable was bound with.
        expected: usize,
        /// The number of arguments actually supplied.
        got: usize,
    },

    /// A callable binding requested more arguments than the calling
    /// convention shim supports.
    ArityUnsupported {
        /// The requested arity.
        arity: usize,
        /// The supported maximum.
        max: usize,
    },

    /// A method table lookup failed.
    UnknownMethod {
        /// The name that was not installed.
        name: String,
    },

    /// Allocating or protecting executable memory failed.
    ExecMemory {
        /// Operating-system detail (syscall name and errno text).
        detail: String,
    },
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::UnknownOperand { token } => {
                write!(f, "UnknownOperand: {}", token)
            }
            JitError::UnknownMnemonic { mnemonic } => {
                write!(f, "UnknownMnemonic: {}", mnemonic)
            }
            JitError::InvalidInstruction {
                mnemonic, operands, ..
            } => {
                if operands.is_empty() {
                    write!(f, "InvalidInstruction: {}", mnemonic)
                } else {
                    write!(f, "InvalidInstruction: {} {}", mnemonic, operands)
                }
            }
            JitError::LabelAlreadyBound { label, address } => {
                write!(
                    f,
                    "LabelAlreadyBound: L{} (already bound at 0x{:X})",
                    label, address
                )
            }
            JitError::UnboundLabelAtFinalize { labels } => {
                write!(f, "UnboundLabelAtFinalize:")?;
                for (i, l) in labels.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " L{}", l)?;
                }
                Ok(())
            }
            JitError::DisplacementOutOfRange { label, disp, max } => {
                write!(
                    f,
                    "DisplacementOutOfRange: L{} (displacement={}, max=±{})",
                    label, disp, max
                )
            }
            JitError::ArityMismatch { expected, got } => {
                write!(
                    f,
                    "ArityMismatch: expected {} argument(s), got {}",
                    expected, got
                )
            }
            JitError::ArityUnsupported { arity, max } => {
                write!(
                    f,
                    "ArityUnsupported: {} exceeds the {}-argument callable limit",
                    arity, max
                )
            }
            JitError::UnknownMethod { name } => {
                write!(f, "UnknownMethod: {}", name)
            }
            JitError::ExecMemory { detail } => {
                write!(f, "ExecMemory: {}", detail)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for JitError {}
