//! End-to-end session tests: catalog dispatch, operand shorthand, trace
//! output, label resolution, and diagnostic messages.

use jitasm::{
    assemble, mnemonics, qword_ptr, Assembler, JitError, Mode, Register,
};

// ── Catalog ─────────────────────────────────────────────────────────────

/// The session's operation set is read from the engine, not duplicated.
#[test]
fn catalog_size_matches_engine_declaration() {
    let asm = Assembler::new(Mode::X64);
    let catalog = mnemonics();
    assert_eq!(asm.operations().len(), catalog.len());
    assert_eq!(asm.operations(), catalog.as_slice());
    assert!(catalog.len() > 150, "engine vocabulary shrank: {}", catalog.len());
}

#[test]
fn catalog_spans_the_instruction_families() {
    let asm = Assembler::new(Mode::X64);
    for name in ["mov", "add", "xor", "jmp", "jnz", "setg", "cmovae", "loop", "ret", "syscall"] {
        assert!(
            asm.operations().iter().any(|n| n == name),
            "{} missing from catalog",
            name
        );
    }
}

// ── Operand model ───────────────────────────────────────────────────────

/// Every register name in the table round-trips through normalization.
#[test]
fn register_names_round_trip_through_display() {
    for &reg in Register::ALL {
        assert_eq!(Register::from_name(reg.name()), Some(reg));
        assert_eq!(reg.to_string(), reg.name());
    }
}

#[test]
fn shorthand_accepts_registers_integers_and_memory() {
    let mut asm = Assembler::new(Mode::X64);
    asm.mov(Register::Rax, 1).unwrap();
    asm.mov("rbx", "rax").unwrap();
    asm.mov(qword_ptr(Register::Rbp, -8), Register::Rax).unwrap();
    asm.mov(Register::Rcx, qword_ptr(Register::Rbp, -8)).unwrap();
    assert!(!asm.finish().unwrap().is_empty());
}

// ── Trace ───────────────────────────────────────────────────────────────

/// Two movs into a fresh session trace in emission order, exactly.
#[test]
fn trace_lists_instructions_in_emission_order() {
    let mut asm = Assembler::new(Mode::X64);
    asm.enable_trace();
    asm.mov("eax", 0x123).unwrap();
    asm.mov("eax", 0x456).unwrap();
    let code = asm.finish().unwrap();
    assert_eq!(code.trace(), ["mov eax, 0x123", "mov eax, 0x456"]);
}

#[test]
fn trace_is_empty_without_a_sink() {
    let mut asm = Assembler::new(Mode::X64);
    asm.mov("eax", 0x123).unwrap();
    assert!(asm.finish().unwrap().trace().is_empty());
}

// ── Labels ──────────────────────────────────────────────────────────────

/// A bound label used by a backward branch finalizes cleanly and the
/// trace shows the branch referencing the bound position.
#[test]
fn backward_branch_to_bound_label() {
    let mut asm = Assembler::new(Mode::X64);
    asm.enable_trace();
    let label = asm.new_label();
    asm.bind(label).unwrap();
    asm.sub("rax", 1).unwrap();
    asm.jnz(label).unwrap();
    let code = asm.finish().unwrap();
    assert_eq!(code.trace(), ["sub rax, 0x1", "jnz 0x0"]);
    // rel32 points back to offset 0: disp = 0 - len
    let len = code.len();
    let disp = i32::from_le_bytes(code.bytes()[len - 4..].try_into().unwrap());
    assert_eq!(disp as i64, -(len as i64));
}

#[test]
fn forward_branch_patches_when_bound() {
    let code = assemble(Mode::X64, |asm| {
        let skip = asm.new_label();
        asm.jmp(skip)?;
        asm.nop()?;
        asm.nop()?;
        asm.bind(skip)?;
        asm.ret()?;
        Ok(())
    })
    .unwrap();
    assert_eq!(code.bytes(), &[0xE9, 0x02, 0x00, 0x00, 0x00, 0x90, 0x90, 0xC3]);
}

/// A label created but never bound fails finalization.
#[test]
fn unbound_label_fails_finalize() {
    let mut asm = Assembler::new(Mode::X64);
    let _label = asm.new_label();
    asm.mov("eax", 1).unwrap();
    let err = asm.finish().unwrap_err();
    assert!(matches!(err, JitError::UnboundLabelAtFinalize { .. }));
    assert_eq!(err.to_string(), "UnboundLabelAtFinalize: L0");
}

#[test]
fn rebinding_fails_at_the_offending_call() {
    let mut asm = Assembler::new(Mode::X64);
    let label = asm.new_label();
    asm.bind(label).unwrap();
    asm.nop().unwrap();
    assert!(matches!(
        asm.bind(label).unwrap_err(),
        JitError::LabelAlreadyBound { label: 0, address: 0 }
    ));
}

#[test]
fn labels_support_either_reference_order() {
    // One label referenced both before and after binding.
    let code = assemble(Mode::X64, |asm| {
        let target = asm.new_label();
        asm.jmp(target)?; // forward
        asm.nop()?;
        asm.bind(target)?;
        asm.sub("rcx", 1)?;
        asm.jnz(target)?; // backward
        asm.ret()?;
        Ok(())
    })
    .unwrap();
    // forward: jmp at 0, target at 6 → disp 1
    assert_eq!(&code.bytes()[..5], &[0xE9, 0x01, 0x00, 0x00, 0x00]);
    // backward: jnz at 10 (field 12..16), target 6 → disp 6-16 = -10
    let disp = i32::from_le_bytes(code.bytes()[12..16].try_into().unwrap());
    assert_eq!(disp, -10);
}

// ── Error taxonomy ──────────────────────────────────────────────────────

/// Zero operands for a mnemonic that needs some: bare-mnemonic message.
#[test]
fn invalid_instruction_without_operands() {
    let mut asm = Assembler::new(Mode::X64);
    let err = asm.emit("add", &[]).unwrap_err();
    assert_eq!(err.to_string(), "InvalidInstruction: add");
}

/// Rejected literal operands appear verbatim in the message.
#[test]
fn invalid_instruction_with_literal_operands() {
    let mut asm = Assembler::new(Mode::X64);
    let err = asm.add(1, 2).unwrap_err();
    assert_eq!(err.to_string(), "InvalidInstruction: add 1, 2");
}

#[test]
fn invalid_instruction_preserves_register_tokens() {
    let mut asm = Assembler::new(Mode::X64);
    // Valid operands, invalid combination: byte into a qword.
    let err = asm.mov("rax", "bl").unwrap_err();
    assert_eq!(err.to_string(), "InvalidInstruction: mov rax, bl");
}

#[test]
fn unknown_operand_reported_at_normalization() {
    let mut asm = Assembler::new(Mode::X64);
    let err = asm.mov("foo", 5).unwrap_err();
    assert_eq!(err.to_string(), "UnknownOperand: foo");
}

#[test]
fn unknown_mnemonic_reported_before_normalization() {
    let mut asm = Assembler::new(Mode::X64);
    let err = asm.emit("vfmaddsub231ps", &["xmm0".into()]).unwrap_err();
    assert!(matches!(err, JitError::UnknownMnemonic { .. }));
}

#[test]
fn errors_leave_the_buffer_untouched() {
    let mut asm = Assembler::new(Mode::X64);
    asm.nop().unwrap();
    let before = asm.position();
    let _ = asm.add(1, 2).unwrap_err();
    let _ = asm.mov("foo", 5).unwrap_err();
    let _ = asm.emit("frobnicate", &[]).unwrap_err();
    assert_eq!(asm.position(), before);
    assert_eq!(asm.finish().unwrap().bytes(), &[0x90]);
}

// ── Modes ───────────────────────────────────────────────────────────────

#[test]
fn mode_selects_the_register_width_class() {
    let mut asm32 = Assembler::new(Mode::X86);
    assert_eq!(
        asm32.mov("rax", 1).unwrap_err().to_string(),
        "UnknownOperand: rax"
    );
    asm32.mov("eax", 1).unwrap();
    asm32.ret().unwrap();
    assert_eq!(asm32.finish().unwrap().bytes(), &[0xB8, 1, 0, 0, 0, 0xC3]);

    let mut asm64 = Assembler::new(Mode::X64);
    asm64.mov("rax", 1).unwrap();
    assert_eq!(
        asm64.finish().unwrap().bytes(),
        &[0x48, 0xC7, 0xC0, 1, 0, 0, 0]
    );
}

#[test]
fn mode_gates_mode_specific_mnemonics() {
    let mut asm = Assembler::new(Mode::X86);
    let err = asm.syscall().unwrap_err();
    assert_eq!(err.to_string(), "InvalidInstruction: syscall");
}

// ── One-shot convenience ────────────────────────────────────────────────

#[test]
fn assemble_closure_finalizes_with_trace() {
    let code = assemble(Mode::X64, |asm| {
        asm.mov("eax", 123)?;
        asm.ret()?;
        Ok(())
    })
    .unwrap();
    assert_eq!(code.bytes(), &[0xB8, 0x7B, 0x00, 0x00, 0x00, 0xC3]);
    assert_eq!(code.trace(), ["mov eax, 0x7B", "ret"]);
}

#[test]
fn assemble_propagates_builder_errors() {
    let err = assemble(Mode::X64, |asm| {
        asm.mov("eax", 1)?;
        asm.emit("add", &[])?;
        Ok(())
    })
    .unwrap_err();
    assert_eq!(err.to_string(), "InvalidInstruction: add");
}
