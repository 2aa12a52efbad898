//! End-to-end demo: assemble a small function, inspect the trace and the
//! bytes, then (on an x86-64 unix host) map it executable and call it.
//!
//! Run with: `cargo run --example jit_function`

use jitasm::{assemble, Mode};

fn main() {
    let code = assemble(Mode::X64, |asm| {
        let top = asm.new_label();
        // sum(n): rax = n + (n-1) + ... + 1
        asm.xor("rax", "rax")?;
        asm.mov("rcx", "rdi")?;
        asm.bind(top)?;
        asm.add("rax", "rcx")?;
        asm.sub("rcx", 1)?;
        asm.jnz(top)?;
        asm.ret()?;
        Ok(())
    })
    .expect("assembly failed");

    println!("trace:");
    for line in code.trace() {
        println!("    {}", line);
    }

    print!("bytes:");
    for b in code.bytes() {
        print!(" {:02X}", b);
    }
    println!("  ({} bytes)", code.len());

    run(&code);
}

#[cfg(all(feature = "exec", target_arch = "x86_64", unix))]
fn run(code: &jitasm::FinalizedBuffer) {
    use jitasm::ReturnKind;

    let exec = code.to_executable().expect("mapping failed");
    // SAFETY: the sequence above is a one-argument SysV function.
    let f = unsafe { exec.callable(1, ReturnKind::I64) }.expect("binding failed");
    for n in [1, 5, 100] {
        println!("sum(1..={}) = {}", n, f.call(&[n]).unwrap());
    }
}

#[cfg(not(all(feature = "exec", target_arch = "x86_64", unix)))]
fn run(_code: &jitasm::FinalizedBuffer) {
    println!("(execution skipped: needs the `exec` feature on an x86-64 unix host)");
}
