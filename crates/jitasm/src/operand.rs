//! Typed operand model: registers, memory references, immediates, labels,
//! and the normalization of ergonomic shorthand into canonical operands.

use alloc::format;
use alloc::string::String;
use core::fmt;

use crate::error::JitError;

/// Target encoding mode, selected at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// 32-bit protected mode.
    X86,
    /// 64-bit long mode.
    X64,
}

impl Mode {
    /// Width of an address-forming register in this mode.
    pub fn address_width(self) -> Width {
        match self {
            Mode::X86 => Width::Dword,
            Mode::X64 => Width::Qword,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::X86 => write!(f, "x86"),
            Mode::X64 => write!(f, "x86_64"),
        }
    }
}

/// Operand access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Width {
    /// 8-bit (`byte ptr`).
    Byte,
    /// 16-bit (`word ptr`).
    Word,
    /// 32-bit (`dword ptr`).
    Dword,
    /// 64-bit (`qword ptr`).
    Qword,
}

impl Width {
    /// Width in bits.
    pub fn bits(self) -> u16 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Dword => 32,
            Width::Qword => 64,
        }
    }

    /// Width in bytes.
    pub fn bytes(self) -> u8 {
        (self.bits() / 8) as u8
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Byte => write!(f, "byte"),
            Width::Word => write!(f, "word"),
            Width::Dword => write!(f, "dword"),
            Width::Qword => write!(f, "qword"),
        }
    }
}

/// A general-purpose x86/x86-64 register.
///
/// Each variant carries its own width class (see [`Register::width`]) and
/// hardware register number (see [`Register::code`]).  The name table in
/// [`Register::from_name`] is the single source of truth for token validity:
/// one entry per architectural name, no aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[rustfmt::skip]
pub enum Register {
    // 64-bit
    Rax, Rcx, Rdx, Rbx, Rsp, Rbp, Rsi, Rdi,
    R8, R9, R10, R11, R12, R13, R14, R15,
    // 32-bit
    Eax, Ecx, Edx, Ebx, Esp, Ebp, Esi, Edi,
    R8d, R9d, R10d, R11d, R12d, R13d, R14d, R15d,
    // 16-bit
    Ax, Cx, Dx, Bx, Sp, Bp, Si, Di,
    R8w, R9w, R10w, R11w, R12w, R13w, R14w, R15w,
    // 8-bit low
    Al, Cl, Dl, Bl, Spl, Bpl, Sil, Dil,
    R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,
    // 8-bit high (REX-incompatible)
    Ah, Ch, Dh, Bh,
}

impl Register {
    /// Every register in the table, in table order.
    pub const ALL: &'static [Register] = &[
        Register::Rax, Register::Rcx, Register::Rdx, Register::Rbx,
        Register::Rsp, Register::Rbp, Register::Rsi, Register::Rdi,
        Register::R8, Register::R9, Register::R10, Register::R11,
        Register::R12, Register::R13, Register::R14, Register::R15,
        Register::Eax, Register::Ecx, Register::Edx, Register::Ebx,
        Register::Esp, Register::Ebp, Register::Esi, Register::Edi,
        Register::R8d, Register::R9d, Register::R10d, Register::R11d,
        Register::R12d, Register::R13d, Register::R14d, Register::R15d,
        Register::Ax, Register::Cx, Register::Dx, Register::Bx,
        Register::Sp, Register::Bp, Register::Si, Register::Di,
        Register::R8w, Register::R9w, Register::R10w, Register::R11w,
        Register::R12w, Register::R13w, Register::R14w, Register::R15w,
        Register::Al, Register::Cl, Register::Dl, Register::Bl,
        Register::Spl, Register::Bpl, Register::Sil, Register::Dil,
        Register::R8b, Register::R9b, Register::R10b, Register::R11b,
        Register::R12b, Register::R13b, Register::R14b, Register::R15b,
        Register::Ah, Register::Ch, Register::Dh, Register::Bh,
    ];

    /// Look up a register by its canonical lowercase name.
    ///
    /// Uppercase input is accepted; the match itself is against the
    /// lowercase table.  Returns `None` for anything that is not an
    /// architectural register name.
    pub fn from_name(name: &str) -> Option<Register> {
        use Register::*;
        // Stack-based lowercase (names are at most 4 chars; 8 is plenty).
        let mut buf = [0u8; 8];
        if name.len() > buf.len() {
            return None;
        }
        buf[..name.len()].copy_from_slice(name.as_bytes());
        buf[..name.len()].make_ascii_lowercase();
        let lower = match core::str::from_utf8(&buf[..name.len()]) {
            Ok(s) => s,
            Err(_) => return None,
        };
        match lower {
            "rax" => Some(Rax), "rcx" => Some(Rcx), "rdx" => Some(Rdx), "rbx" => Some(Rbx),
            "rsp" => Some(Rsp), "rbp" => Some(Rbp), "rsi" => Some(Rsi), "rdi" => Some(Rdi),
            "r8" => Some(R8), "r9" => Some(R9), "r10" => Some(R10), "r11" => Some(R11),
            "r12" => Some(R12), "r13" => Some(R13), "r14" => Some(R14), "r15" => Some(R15),
            "eax" => Some(Eax), "ecx" => Some(Ecx), "edx" => Some(Edx), "ebx" => Some(Ebx),
            "esp" => Some(Esp), "ebp" => Some(Ebp), "esi" => Some(Esi), "edi" => Some(Edi),
            "r8d" => Some(R8d), "r9d" => Some(R9d), "r10d" => Some(R10d), "r11d" => Some(R11d),
            "r12d" => Some(R12d), "r13d" => Some(R13d), "r14d" => Some(R14d), "r15d" => Some(R15d),
            "ax" => Some(Ax), "cx" => Some(Cx), "dx" => Some(Dx), "bx" => Some(Bx),
            "sp" => Some(Sp), "bp" => Some(Bp), "si" => Some(Si), "di" => Some(Di),
            "r8w" => Some(R8w), "r9w" => Some(R9w), "r10w" => Some(R10w), "r11w" => Some(R11w),
            "r12w" => Some(R12w), "r13w" => Some(R13w), "r14w" => Some(R14w), "r15w" => Some(R15w),
            "al" => Some(Al), "cl" => Some(Cl), "dl" => Some(Dl), "bl" => Some(Bl),
            "spl" => Some(Spl), "bpl" => Some(Bpl), "sil" => Some(Sil), "dil" => Some(Dil),
            "r8b" => Some(R8b), "r9b" => Some(R9b), "r10b" => Some(R10b), "r11b" => Some(R11b),
            "r12b" => Some(R12b), "r13b" => Some(R13b), "r14b" => Some(R14b), "r15b" => Some(R15b),
            "ah" => Some(Ah), "ch" => Some(Ch), "dh" => Some(Dh), "bh" => Some(Bh),
            _ => None,
        }
    }

    /// Canonical display name.
    pub fn name(self) -> &'static str {
        use Register::*;
        match self {
            Rax => "rax", Rcx => "rcx", Rdx => "rdx", Rbx => "rbx",
            Rsp => "rsp", Rbp => "rbp", Rsi => "rsi", Rdi => "rdi",
            R8 => "r8", R9 => "r9", R10 => "r10", R11 => "r11",
            R12 => "r12", R13 => "r13", R14 => "r14", R15 => "r15",
            Eax => "eax", Ecx => "ecx", Edx => "edx", Ebx => "ebx",
            Esp => "esp", Ebp => "ebp", Esi => "esi", Edi => "edi",
            R8d => "r8d", R9d => "r9d", R10d => "r10d", R11d => "r11d",
            R12d => "r12d", R13d => "r13d", R14d => "r14d", R15d => "r15d",
            Ax => "ax", Cx => "cx", Dx => "dx", Bx => "bx",
            Sp => "sp", Bp => "bp", Si => "si", Di => "di",
            R8w => "r8w", R9w => "r9w", R10w => "r10w", R11w => "r11w",
            R12w => "r12w", R13w => "r13w", R14w => "r14w", R15w => "r15w",
            Al => "al", Cl => "cl", Dl => "dl", Bl => "bl",
            Spl => "spl", Bpl => "bpl", Sil => "sil", Dil => "dil",
            R8b => "r8b", R9b => "r9b", R10b => "r10b", R11b => "r11b",
            R12b => "r12b", R13b => "r13b", R14b => "r14b", R15b => "r15b",
            Ah => "ah", Ch => "ch", Dh => "dh", Bh => "bh",
        }
    }

    /// Width class.
    pub fn width(self) -> Width {
        use Register::*;
        match self {
            Rax | Rcx | Rdx | Rbx | Rsp | Rbp | Rsi | Rdi | R8 | R9 | R10 | R11 | R12 | R13
            | R14 | R15 => Width::Qword,
            Eax | Ecx | Edx | Ebx | Esp | Ebp | Esi | Edi | R8d | R9d | R10d | R11d | R12d
            | R13d | R14d | R15d => Width::Dword,
            Ax | Cx | Dx | Bx | Sp | Bp | Si | Di | R8w | R9w | R10w | R11w | R12w | R13w
            | R14w | R15w => Width::Word,
            _ => Width::Byte,
        }
    }

    /// Hardware register number (0–15).
    ///
    /// The high-byte registers (AH/CH/DH/BH) share codes 4–7 with
    /// SPL/BPL/SIL/DIL; the two groups are distinguished by REX presence.
    pub fn code(self) -> u8 {
        use Register::*;
        match self {
            Rax | Eax | Ax | Al => 0,
            Rcx | Ecx | Cx | Cl => 1,
            Rdx | Edx | Dx | Dl => 2,
            Rbx | Ebx | Bx | Bl => 3,
            Rsp | Esp | Sp | Spl | Ah => 4,
            Rbp | Ebp | Bp | Bpl | Ch => 5,
            Rsi | Esi | Si | Sil | Dh => 6,
            Rdi | Edi | Di | Dil | Bh => 7,
            R8 | R8d | R8w | R8b => 8,
            R9 | R9d | R9w | R9b => 9,
            R10 | R10d | R10w | R10b => 10,
            R11 | R11d | R11w | R11b => 11,
            R12 | R12d | R12w | R12b => 12,
            R13 | R13d | R13w | R13b => 13,
            R14 | R14d | R14w | R14b => 14,
            R15 | R15d | R15w | R15b => 15,
        }
    }

    /// Whether this is one of the extended registers (R8–R15, any width).
    pub fn is_extended(self) -> bool {
        self.code() >= 8
    }

    /// Whether this is a high-byte register (AH/CH/DH/BH), which cannot be
    /// encoded in an instruction carrying a REX prefix.
    pub fn is_high_byte(self) -> bool {
        matches!(self, Register::Ah | Register::Ch | Register::Dh | Register::Bh)
    }

    /// Whether encoding this register forces a REX prefix even without any
    /// REX flag set (SPL/BPL/SIL/DIL).
    pub fn needs_rex_byte(self) -> bool {
        matches!(self, Register::Spl | Register::Bpl | Register::Sil | Register::Dil)
    }

    /// Whether this register exists in the given mode's table.
    ///
    /// 32-bit mode has no 64-bit, extended, or REX-only-byte registers.
    pub fn available_in(self, mode: Mode) -> bool {
        match mode {
            Mode::X64 => true,
            Mode::X86 => {
                self.width() != Width::Qword && !self.is_extended() && !self.needs_rex_byte()
            }
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A memory reference: base and/or scaled index plus a signed displacement,
/// with an optional explicit access width.
///
/// Built with [`Mem::new`] and the chaining methods, or the width-specific
/// shorthands [`byte_ptr`], [`word_ptr`], [`dword_ptr`], [`qword_ptr`].
///
/// # Examples
///
/// ```
/// use jitasm::{qword_ptr, Mem, Register, Width};
///
/// let m = qword_ptr(Register::Rbp, -8);
/// assert_eq!(m.to_string(), "qword ptr [rbp-0x8]");
///
/// let m = Mem::new(Register::Rbx).index(Register::Rsi, 4).disp(0x10);
/// assert_eq!(m.to_string(), "[rbx+rsi*4+0x10]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mem {
    /// Explicit access width, or `None` to infer from the other operand.
    pub size: Option<Width>,
    /// Base register.
    pub base: Option<Register>,
    /// Index register (scaled).
    pub index: Option<Register>,
    /// Index scale factor: 1, 2, 4, or 8.
    pub scale: u8,
    /// Signed byte displacement.
    pub disp: i32,
}

impl Mem {
    /// A memory reference based at `base` with zero displacement.
    pub fn new(base: Register) -> Self {
        Self {
            size: None,
            base: Some(base),
            index: None,
            scale: 1,
            disp: 0,
        }
    }

    /// An absolute (displacement-only) memory reference.
    pub fn absolute(disp: i32) -> Self {
        Self {
            size: None,
            base: None,
            index: None,
            scale: 1,
            disp,
        }
    }

    /// Set the displacement.
    #[must_use]
    pub fn disp(mut self, disp: i32) -> Self {
        self.disp = disp;
        self
    }

    /// Set the scaled index register.
    #[must_use]
    pub fn index(mut self, index: Register, scale: u8) -> Self {
        self.index = Some(index);
        self.scale = scale;
        self
    }

    /// Set the explicit access width.
    #[must_use]
    pub fn size(mut self, width: Width) -> Self {
        self.size = Some(width);
        self
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sz) = self.size {
            write!(f, "{} ptr ", sz)?;
        }
        write!(f, "[")?;
        let mut parts = false;
        if let Some(base) = self.base {
            write!(f, "{}", base)?;
            parts = true;
        }
        if let Some(idx) = self.index {
            if parts {
                write!(f, "+")?;
            }
            write!(f, "{}*{}", idx, self.scale)?;
            parts = true;
        }
        if self.disp != 0 || !parts {
            if self.disp < 0 {
                write!(f, "-0x{:X}", (self.disp as i64).wrapping_neg())?;
            } else {
                if parts {
                    write!(f, "+")?;
                }
                write!(f, "0x{:X}", self.disp)?;
            }
        }
        write!(f, "]")
    }
}

/// Shorthand for a byte-wide memory reference.
pub fn byte_ptr(base: Register, disp: i32) -> Mem {
    Mem::new(base).disp(disp).size(Width::Byte)
}

/// Shorthand for a word-wide memory reference.
pub fn word_ptr(base: Register, disp: i32) -> Mem {
    Mem::new(base).disp(disp).size(Width::Word)
}

/// Shorthand for a dword-wide memory reference.
pub fn dword_ptr(base: Register, disp: i32) -> Mem {
    Mem::new(base).disp(disp).size(Width::Dword)
}

/// Shorthand for a qword-wide memory reference.
pub fn qword_ptr(base: Register, disp: i32) -> Mem {
    Mem::new(base).disp(disp).size(Width::Qword)
}

/// A not-yet-addressed code position, used as a branch target.
///
/// Allocated by `Assembler::new_label`; opaque outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(pub(crate) u32);

impl Label {
    /// The label's numeric identifier within its session.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A canonical (normalized) operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// A register operand.
    Register(Register),
    /// An immediate value.
    Immediate(i64),
    /// A memory reference.
    Memory(Mem),
    /// A label reference, resolved by the relocation table.
    Label(Label),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Immediate(v) => {
                if *v < 0 {
                    write!(f, "-0x{:X}", v.wrapping_neg())
                } else {
                    write!(f, "0x{:X}", v)
                }
            }
            Operand::Memory(mem) => write!(f, "{}", mem),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}

/// An operand argument exactly as the caller supplied it.
///
/// This is the shorthand surface: bare integers become immediates, string
/// tokens are looked up in the register table, [`Mem`]/[`Register`]/[`Label`]
/// values pass through.  A `RawOperand` renders (`Display`) as the literal
/// the caller wrote — the rendering used in `InvalidInstruction` messages —
/// while [`RawOperand::normalize`] produces the canonical [`Operand`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RawOperand {
    /// A bare integer literal.
    Int(i64),
    /// A name-like token, resolved against the register table.
    Name(String),
    /// An already-typed register.
    Reg(Register),
    /// A structured memory reference.
    Mem(Mem),
    /// A label value.
    Label(Label),
}

impl RawOperand {
    /// Normalize into a canonical operand for the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`JitError::UnknownOperand`] when a name token is not in the
    /// register table, a register is not available in `mode`, or a memory
    /// reference has an unsupported shape (bad scale, stack-pointer index,
    /// base/index not of the mode's address width).
    pub fn normalize(&self, mode: Mode) -> Result<Operand, JitError> {
        match self {
            RawOperand::Int(v) => Ok(Operand::Immediate(*v)),
            RawOperand::Name(name) => match Register::from_name(name) {
                Some(reg) if reg.available_in(mode) => Ok(Operand::Register(reg)),
                _ => Err(JitError::UnknownOperand {
                    token: name.clone(),
                }),
            },
            RawOperand::Reg(reg) => {
                if reg.available_in(mode) {
                    Ok(Operand::Register(*reg))
                } else {
                    Err(JitError::UnknownOperand {
                        token: String::from(reg.name()),
                    })
                }
            }
            RawOperand::Mem(mem) => {
                validate_mem(mem, mode)?;
                Ok(Operand::Memory(*mem))
            }
            RawOperand::Label(l) => Ok(Operand::Label(*l)),
        }
    }
}

/// Check a memory reference against the supported addressing shapes.
fn validate_mem(mem: &Mem, mode: Mode) -> Result<(), JitError> {
    let reject = || JitError::UnknownOperand {
        token: format!("{}", mem),
    };
    if !matches!(mem.scale, 1 | 2 | 4 | 8) {
        return Err(reject());
    }
    let addr_width = mode.address_width();
    if let Some(base) = mem.base {
        if base.width() != addr_width || !base.available_in(mode) {
            return Err(reject());
        }
    }
    if let Some(index) = mem.index {
        if index.width() != addr_width || !index.available_in(mode) {
            return Err(reject());
        }
        // The stack pointer has no index encoding.
        if index.code() == 4 && !index.is_extended() {
            return Err(reject());
        }
    }
    Ok(())
}

impl fmt::Display for RawOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawOperand::Int(v) => write!(f, "{}", v),
            RawOperand::Name(s) => f.write_str(s),
            RawOperand::Reg(r) => write!(f, "{}", r),
            RawOperand::Mem(m) => write!(f, "{}", m),
            RawOperand::Label(l) => write!(f, "{}", l),
        }
    }
}

impl From<i64> for RawOperand {
    fn from(v: i64) -> Self {
        RawOperand::Int(v)
    }
}

impl From<i32> for RawOperand {
    fn from(v: i32) -> Self {
        RawOperand::Int(v as i64)
    }
}

impl From<u32> for RawOperand {
    fn from(v: u32) -> Self {
        RawOperand::Int(v as i64)
    }
}

impl From<u8> for RawOperand {
    fn from(v: u8) -> Self {
        RawOperand::Int(v as i64)
    }
}

impl From<&str> for RawOperand {
    fn from(s: &str) -> Self {
        RawOperand::Name(String::from(s))
    }
}

impl From<String> for RawOperand {
    fn from(s: String) -> Self {
        RawOperand::Name(s)
    }
}

impl From<Register> for RawOperand {
    fn from(r: Register) -> Self {
        RawOperand::Reg(r)
    }
}

impl From<Mem> for RawOperand {
    fn from(m: Mem) -> Self {
        RawOperand::Mem(m)
    }
}

impl From<Label> for RawOperand {
    fn from(l: Label) -> Self {
        RawOperand::Label(l)
    }
}

impl From<&Label> for RawOperand {
    fn from(l: &Label) -> Self {
        RawOperand::Label(*l)
    }
}

impl From<Operand> for RawOperand {
    fn from(op: Operand) -> Self {
        match op {
            Operand::Register(r) => RawOperand::Reg(r),
            Operand::Immediate(v) => RawOperand::Int(v),
            Operand::Memory(m) => RawOperand::Mem(m),
            Operand::Label(l) => RawOperand::Label(l),
        }
    }
}
