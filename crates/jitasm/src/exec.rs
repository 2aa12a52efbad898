//! Executable-memory binding: mapping finalized code into executable pages
//! and exposing it as arity-checked callables or named methods.
//!
//! W^X discipline: pages are mapped read-write for the copy, then flipped
//! to read-execute before anything can call into them.  An
//! [`ExecutableCode`] owns its mapping exclusively and unmaps it exactly
//! once, on drop; callables borrow the artifact, so the borrow checker —
//! not convention — rules out calls into freed memory.

use std::collections::BTreeMap;

use crate::buffer::FinalizedBuffer;
use crate::error::JitError;

/// Maximum callable arity: the System V AMD64 integer argument registers.
pub const MAX_ARITY: usize = 6;

/// How a callable interprets the raw return register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Truncate to 32 bits and sign-extend (the conventional default for
    /// `mov eax, ...; ret` style functions).
    I32,
    /// The full 64-bit register, reinterpreted as signed.
    I64,
}

impl ReturnKind {
    fn interpret(self, raw: u64) -> i64 {
        match self {
            ReturnKind::I32 => (raw as u32 as i32) as i64,
            ReturnKind::I64 => raw as i64,
        }
    }
}

/// A region of process memory holding finalized machine code, mapped
/// executable and invocable as a function.
///
/// Created from a [`FinalizedBuffer`] via
/// [`to_executable`](FinalizedBuffer::to_executable); the mapping is
/// released when the artifact drops.
///
/// Safe to share across threads: the code bytes are immutable once
/// protected.  Whether concurrent *invocation* is sound depends on the
/// generated code itself being reentrant — that is the author's
/// obligation, not something this type can check.
#[derive(Debug)]
pub struct ExecutableCode {
    ptr: *mut u8,
    len: usize,
}

// The mapping is immutable (read+execute) for the artifact's whole
// lifetime, and the pointer is never handed out mutably.
unsafe impl Send for ExecutableCode {}
unsafe impl Sync for ExecutableCode {}

impl ExecutableCode {
    /// Copy `bytes` into a fresh executable mapping.
    ///
    /// # Errors
    ///
    /// [`JitError::ExecMemory`] when the buffer is empty or the kernel
    /// refuses the mapping or the protection flip.
    pub fn new(bytes: &[u8]) -> Result<Self, JitError> {
        if bytes.is_empty() {
            return Err(JitError::ExecMemory {
                detail: String::from("cannot map an empty buffer"),
            });
        }
        let len = bytes.len();
        // SAFETY: anonymous private mapping of a length we own; the
        // pointer is checked against MAP_FAILED before use.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::ExecMemory {
                detail: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }
        let ptr = ptr.cast::<u8>();
        // SAFETY: the mapping is `len` bytes and writable; `bytes` cannot
        // overlap a mapping that did not exist before this call.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, len);
        }
        // SAFETY: flipping our own fresh mapping to read+execute.
        let rc = unsafe { libc::mprotect(ptr.cast(), len, libc::PROT_READ | libc::PROT_EXEC) };
        if rc != 0 {
            let detail = format!("mprotect failed: {}", std::io::Error::last_os_error());
            // SAFETY: unmapping the region mapped above.
            unsafe {
                libc::munmap(ptr.cast(), len);
            }
            return Err(JitError::ExecMemory { detail });
        }
        Ok(Self { ptr, len })
    }

    /// Length of the machine code in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the artifact holds no code (never true for a constructed
    /// artifact; present for API symmetry).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The entry address.
    pub fn entry(&self) -> *const u8 {
        self.ptr
    }

    /// Bind the entry point as a callable with a declared arity and
    /// return kind.
    ///
    /// # Errors
    ///
    /// [`JitError::ArityUnsupported`] when `arity` exceeds [`MAX_ARITY`].
    ///
    /// # Safety
    ///
    /// The mapped bytes must form a function that follows the platform's
    /// standard calling convention, takes exactly `arity` integer
    /// arguments, and returns in the integer return register.  Invoking a
    /// callable bound against anything else is undefined behavior.
    pub unsafe fn callable(&self, arity: usize, ret: ReturnKind) -> Result<Callable<'_>, JitError> {
        if arity > MAX_ARITY {
            return Err(JitError::ArityUnsupported {
                arity,
                max: MAX_ARITY,
            });
        }
        Ok(Callable {
            code: self,
            arity,
            ret,
        })
    }
}

impl Drop for ExecutableCode {
    fn drop(&mut self) {
        // SAFETY: unmapping the region this artifact exclusively owns;
        // drop runs exactly once and borrowing callables cannot outlive us.
        unsafe {
            libc::munmap(self.ptr.cast(), self.len);
        }
    }
}

impl FinalizedBuffer {
    /// Map the finalized bytes into executable memory.
    ///
    /// # Errors
    ///
    /// [`JitError::ExecMemory`] on an empty buffer or mapping failure.
    pub fn to_executable(&self) -> Result<ExecutableCode, JitError> {
        ExecutableCode::new(self.bytes())
    }
}

/// A strongly-typed view of an executable artifact: entry address plus a
/// declared arity and return kind.
///
/// [`call`](Callable::call) checks the argument count before any control
/// transfer, so an arity error can never reach the generated code.
#[derive(Debug, Clone, Copy)]
pub struct Callable<'code> {
    code: &'code ExecutableCode,
    arity: usize,
    ret: ReturnKind,
}

impl Callable<'_> {
    /// The declared argument count.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The declared return interpretation.
    pub fn return_kind(&self) -> ReturnKind {
        self.ret
    }

    /// Transfer control to the generated code with `args`.
    ///
    /// # Errors
    ///
    /// [`JitError::ArityMismatch`] when `args.len()` differs from the
    /// declared arity — raised before any transfer of control.
    pub fn call(&self, args: &[i64]) -> Result<i64, JitError> {
        if args.len() != self.arity {
            return Err(JitError::ArityMismatch {
                expected: self.arity,
                got: args.len(),
            });
        }
        // SAFETY: the arity matched, and the binding's safety contract
        // (see `ExecutableCode::callable`) guarantees the entry point is a
        // System V function of this shape.
        let raw = unsafe { invoke(self.code.entry(), args) };
        Ok(self.ret.interpret(raw))
    }
}

/// Transfer control to `entry` passing `args` in the integer argument
/// registers.
///
/// # Safety
///
/// `entry` must be an executable System V AMD64 function taking
/// `args.len()` integer arguments; `args.len()` must be at most
/// [`MAX_ARITY`].
unsafe fn invoke(entry: *const u8, args: &[i64]) -> u64 {
    use core::mem::transmute;
    match args {
        [] => transmute::<*const u8, extern "C" fn() -> u64>(entry)(),
        [a] => transmute::<*const u8, extern "C" fn(i64) -> u64>(entry)(*a),
        [a, b] => transmute::<*const u8, extern "C" fn(i64, i64) -> u64>(entry)(*a, *b),
        [a, b, c] => transmute::<*const u8, extern "C" fn(i64, i64, i64) -> u64>(entry)(*a, *b, *c),
        [a, b, c, d] => {
            transmute::<*const u8, extern "C" fn(i64, i64, i64, i64) -> u64>(entry)(*a, *b, *c, *d)
        }
        [a, b, c, d, e] => transmute::<*const u8, extern "C" fn(i64, i64, i64, i64, i64) -> u64>(
            entry,
        )(*a, *b, *c, *d, *e),
        [a, b, c, d, e, f] => transmute::<
            *const u8,
            extern "C" fn(i64, i64, i64, i64, i64, i64) -> u64,
        >(entry)(*a, *b, *c, *d, *e, *f),
        _ => unreachable!("arity bounded by MAX_ARITY at binding time"),
    }
}

/// One installed method: an owned artifact plus its binding.
#[derive(Debug)]
struct Method {
    code: ExecutableCode,
    arity: usize,
    ret: ReturnKind,
}

/// A name → callable registry that data structures embed to expose
/// generated code as named operations.
///
/// Pure sugar over [`Callable`]: installing takes ownership of the
/// artifact (so the table's lifetime bounds every bound method), invoking
/// resolves by name and then behaves exactly like [`Callable::call`].
///
/// # Examples
///
/// ```no_run
/// use jitasm::{assemble, MethodTable, Mode, ReturnKind};
///
/// let code = assemble(Mode::X64, |asm| {
///     asm.mov("eax", 5)?;
///     asm.ret()?;
///     Ok(())
/// })?
/// .to_executable()?;
///
/// let mut ops = MethodTable::new();
/// // SAFETY: the code above is a zero-argument SysV function.
/// unsafe { ops.install("five", code, 0, ReturnKind::I32)? };
/// assert_eq!(ops.invoke("five", &[])?, 5);
/// # Ok::<(), jitasm::JitError>(())
/// ```
#[derive(Debug, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, Method>,
}

impl MethodTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `code` under `name`, replacing any previous entry (whose
    /// artifact is released).
    ///
    /// # Errors
    ///
    /// [`JitError::ArityUnsupported`] when `arity` exceeds [`MAX_ARITY`].
    ///
    /// # Safety
    ///
    /// Same contract as [`ExecutableCode::callable`]: the artifact must be
    /// a standard-convention function of exactly `arity` integer
    /// arguments.
    pub unsafe fn install(
        &mut self,
        name: &str,
        code: ExecutableCode,
        arity: usize,
        ret: ReturnKind,
    ) -> Result<(), JitError> {
        if arity > MAX_ARITY {
            return Err(JitError::ArityUnsupported {
                arity,
                max: MAX_ARITY,
            });
        }
        self.methods
            .insert(String::from(name), Method { code, arity, ret });
        Ok(())
    }

    /// Look up an installed method as a borrowed callable.
    pub fn get(&self, name: &str) -> Option<Callable<'_>> {
        self.methods.get(name).map(|m| Callable {
            code: &m.code,
            arity: m.arity,
            ret: m.ret,
        })
    }

    /// Whether `name` is installed.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Installed method names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Number of installed methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Invoke an installed method by name.
    ///
    /// # Errors
    ///
    /// [`JitError::UnknownMethod`] when nothing is installed under `name`;
    /// [`JitError::ArityMismatch`] exactly as [`Callable::call`].
    pub fn invoke(&self, name: &str, args: &[i64]) -> Result<i64, JitError> {
        match self.get(name) {
            Some(callable) => callable.call(args),
            None => Err(JitError::UnknownMethod {
                name: String::from(name),
            }),
        }
    }

    /// Remove a method, handing its artifact back to the caller.
    pub fn remove(&mut self, name: &str) -> Option<ExecutableCode> {
        self.methods.remove(name).map(|m| m.code)
    }
}
