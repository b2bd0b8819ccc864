//! End-to-end frame lowering through the prologue/epilogue inserter.
//!
//! Functions are written in textual machine IR, lowered for a RISCPI subtarget and
//! compared against the printed result.

use bumpalo::Bump;
use riscpi::core::regs::RegSet;
use riscpi::core::{CompilationSession, MachineFunction, PrologEpilogInserter, TargetSubtarget};
use riscpi::riscpi::instr_info::opcodes;
use riscpi::riscpi::regs::{FP, IP, LR, PC, R4, R5, R9, SP};
use riscpi::target::{TargetMachine, TargetOptions, TargetRegistry};
use riscpi::test_mir::{parse_module, MirPrinter};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn subtarget_with(cpu: &str, fs: &str, options: TargetOptions) -> Arc<dyn TargetSubtarget> {
    let tm = TargetMachine::new(&TargetRegistry::builtin(), "riscpi-unknown-none", options)
        .expect("riscpi is a builtin target");
    tm.create_subtarget(cpu, fs)
}

fn subtarget(cpu: &str, fs: &str) -> Arc<dyn TargetSubtarget> {
    subtarget_with(cpu, fs, TargetOptions::default())
}

fn parse(st: &dyn TargetSubtarget, text: &str) -> Vec<MachineFunction> {
    parse_module(text, st.instr_info(), st.register_info())
        .unwrap_or_else(|e| panic!("failed to parse test input: {e}\n{text}"))
}

/// Parse, lower and print `text`.
fn lower(st: &dyn TargetSubtarget, text: &str) -> String {
    let mut functions = parse(st, text);
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    PrologEpilogInserter::new(st).run_module(&mut functions, &session);
    MirPrinter::new(st.register_info()).print_module(&functions)
}

fn check_output_contains(output: &str, patterns: &[&str]) {
    for pattern in patterns {
        assert!(
            output.contains(pattern),
            "Output missing expected pattern: '{pattern}'\nFull output:\n{output}"
        );
    }
}

#[test]
fn test_simple_function_has_no_frame_pointer() {
    init_logging();
    let st = subtarget("", "");
    let functions = parse(
        st.as_ref(),
        "function simple {\n  stack 16 align 4\n  mov r0, r1\n  ret\n}\n",
    );
    assert!(!st.frame_lowering().has_fp(&functions[0]));
}

#[test]
fn test_hooks_are_idempotent() {
    let st = subtarget("bcm2836", "");
    let tfi = st.frame_lowering();
    let text = "\
function a {
  ret
}
function b {
  attr var-sized
  ret
}
function c {
  attr frame-address-taken
  stack 32 align 32
  ret
}
";
    for mf in parse(st.as_ref(), text) {
        let has_fp = tfi.has_fp(&mf);
        let reserved = tfi.has_reserved_call_frame(&mf);
        for _ in 0..3 {
            assert_eq!(tfi.has_fp(&mf), has_fp, "{}", mf.name);
            assert_eq!(tfi.has_reserved_call_frame(&mf), reserved, "{}", mf.name);
        }
    }
}

#[test]
fn test_reserved_call_frame_pseudos_are_deleted() {
    init_logging();
    let st = subtarget("", "");
    let tfi = st.frame_lowering();
    let mut functions = parse(
        st.as_ref(),
        "function f {\n  adjcallstackdown #16\n  bl @f\n  adjcallstackup #16\n}\n",
    );
    let mf = &mut functions[0];
    assert!(tfi.has_reserved_call_frame(mf));
    tfi.analyze_frame(mf);

    let entry = mf.entry_block();
    let next = tfi.eliminate_call_frame_pseudo_instr(mf, entry, 0);
    assert_eq!(next, 0);
    assert_eq!(mf.block(entry).insts[next].opcode(), opcodes::BL);

    let next = tfi.eliminate_call_frame_pseudo_instr(mf, entry, 1);
    assert_eq!(next, 1);
    assert_eq!(mf.block(entry).len(), 1);
    assert_eq!(mf.block(entry).insts[0].opcode(), opcodes::BL);
}

#[test]
fn test_elimination_removes_one_instruction_and_returns_successor() {
    let st = subtarget("", "");
    let tfi = st.frame_lowering();
    let mut functions = parse(
        st.as_ref(),
        "function f {\n  attr var-sized\n  mov r4, r0\n  adjcallstackdown #0\n  bl @g\n  adjcallstackup #0\n  ret\n}\n",
    );
    let mf = &mut functions[0];
    tfi.analyze_frame(mf);
    assert!(!mf.frame_facts().unwrap().reserved_call_frame);

    let entry = mf.entry_block();
    let before = mf.block(entry).len();
    let next = tfi.eliminate_call_frame_pseudo_instr(mf, entry, 1);
    assert_eq!(mf.block(entry).len(), before - 1);
    assert_eq!(next, 1);
    assert_eq!(mf.block(entry).insts[next].opcode(), opcodes::BL);
}

#[test]
fn test_thirty_two_byte_frame() {
    init_logging();
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "function locals {\n  stack 32 align 8\nentry:\n  ret\n}\n",
    );
    assert_eq!(
        output,
        "\
function locals {
  stack 32 align 8
entry:
  subi sp, sp, #32 ; frame-setup
  addi sp, sp, #32 ; frame-destroy
  ret
}
"
    );
}

#[test]
fn test_epilogue_before_every_return() {
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "\
function two_exits {
  stack 32 align 8
entry:
  bnz r0, ^other
exit:
  ret
other:
  ret
}
",
    );
    assert_eq!(output.matches("subi sp, sp, #32 ; frame-setup").count(), 1);
    assert_eq!(output.matches("addi sp, sp, #32 ; frame-destroy\n  ret").count(), 2);
}

#[test]
fn test_epilogue_follows_conditional_branch_in_return_block() {
    init_logging();
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "\
function branchy {
  stack 32 align 8
entry:
  bnz r0, ^other
  ret
other:
  ret
}
",
    );
    assert_eq!(
        output,
        "\
function branchy {
  stack 32 align 8
entry:
  subi sp, sp, #32 ; frame-setup
  bnz r0, ^other
  addi sp, sp, #32 ; frame-destroy
  ret
other:
  addi sp, sp, #32 ; frame-destroy
  ret
}
"
    );
    assert_eq!(output.matches("frame-setup").count(), 1);
    assert_eq!(output.matches("frame-destroy").count(), 2);
}

#[test]
fn test_empty_frame_gets_no_prologue() {
    let st = subtarget("", "");
    let output = lower(st.as_ref(), "function leaf {\n  mov r0, r1\n  ret\n}\n");
    assert!(!output.contains("frame-setup"));
    assert!(!output.contains("frame-destroy"));
}

#[test]
fn test_calls_save_lr_in_reserved_frame() {
    init_logging();
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "function caller {\n  adjcallstackdown #8\n  bl @f\n  adjcallstackup #8\n  ret\n}\n",
    );
    assert_eq!(
        output,
        "\
function caller {
  attr has-calls
entry:
  subi sp, sp, #8 ; frame-setup
  str lr, [sp, #0] ; frame-setup
  subi sp, sp, #8 ; frame-setup
  bl @f
  addi sp, sp, #8 ; frame-destroy
  ldr lr, [sp, #0] ; frame-destroy
  addi sp, sp, #8 ; frame-destroy
  ret
}
"
    );
}

#[test]
fn test_non_reserved_call_frame_adjusts_sp_around_call() {
    init_logging();
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "\
function dyn {
  attr var-sized
  stack 4 align 4
entry:
  adjcallstackdown #12
  str r0, [%stack.0, #0]
  bl @g
  adjcallstackup #12
  ret
}
",
    );
    check_output_contains(
        &output,
        &[
            // fp and lr saved, fp set to the incoming sp
            "  subi sp, sp, #8 ; frame-setup\n  str fp, [sp, #0] ; frame-setup\n  str lr, [sp, #4] ; frame-setup\n  addi fp, sp, #8 ; frame-setup\n  subi sp, sp, #8 ; frame-setup\n",
            // call frame rounded up to the stack alignment
            "  subi sp, sp, #16\n  str r0, [fp, #-16]\n  bl @g\n  addi sp, sp, #16\n",
            // sp restored from fp
            "  subi sp, fp, #8 ; frame-destroy\n  ldr lr, [sp, #4] ; frame-destroy\n  ldr fp, [sp, #0] ; frame-destroy\n  addi sp, sp, #8 ; frame-destroy\n  ret\n",
        ],
    );
}

#[test]
fn test_var_sized_frame_addresses_locals_from_fp() {
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "\
function f {
  attr var-sized
  attr no-realign
  stack 4 align 4
entry:
  ldr r1, [%stack.0, #0]
  ret
}
",
    );
    check_output_contains(&output, &["ldr r1, [fp, #-16]"]);
}

#[test]
fn test_frame_pointer_all_saves_fp() {
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "function f {\n  attr frame-pointer-all\n  stack 8 align 8\n  ldr r0, [%stack.0, #4]\n  ret\n}\n",
    );
    check_output_contains(
        &output,
        &[
            "str fp, [sp, #0] ; frame-setup",
            "addi fp, sp, #8 ; frame-setup",
            "ldr r0, [sp, #4]",
            "ldr fp, [sp, #0] ; frame-destroy",
        ],
    );
}

#[test]
fn test_disable_fp_elim_option() {
    let st = subtarget_with(
        "",
        "",
        TargetOptions {
            disable_fp_elim: true,
            ..TargetOptions::default()
        },
    );
    let functions = parse(st.as_ref(), "function f {\n  ret\n}\n");
    assert!(st.frame_lowering().has_fp(&functions[0]));
}

#[test]
fn test_large_frame_uses_ip() {
    init_logging();
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "\
function big {
  stack 8192 align 8
  stack 4 align 4
entry:
  ldr r0, [%stack.1, #0]
  ret
}
",
    );
    assert_eq!(
        output,
        "\
function big {
  stack 8192 align 8
  stack 4 align 4
  stack 4 align 4
entry:
  movw ip, #8208 ; frame-setup
  sub sp, sp, ip ; frame-setup
  movw ip, #8200
  add ip, sp, ip
  ldr r0, [ip, #0]
  movw ip, #8208 ; frame-destroy
  add sp, sp, ip ; frame-destroy
  ret
}
"
    );
}

#[test]
fn test_large_frame_scavenges_unused_register() {
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "function big {\n  stack 8192 align 8\n  stack 4 align 4\n  str ip, [%stack.1, #0]\n  ret\n}\n",
    );
    check_output_contains(&output, &["movw r3, #8200\n  add r3, sp, r3\n  str ip, [r3, #0]\n"]);
}

#[test]
fn test_large_frame_spills_live_register_around_access() {
    init_logging();
    let st = subtarget("", "");
    // r0 carries the incoming argument out as the return value; r1-r3 are all named.
    let mut functions = parse(
        st.as_ref(),
        "\
function id {
  stack 8192 align 8
  stack 4 align 4
  mov r1, r2
  mov r3, r3
  str ip, [%stack.1, #0]
  ret
}
",
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    PrologEpilogInserter::new(st.as_ref()).run_module(&mut functions, &session);
    let output = MirPrinter::new(st.register_info()).print_module(&functions);

    check_output_contains(
        &output,
        &["  mov r3, r3\n  str r3, [sp, #0]\n  movw r3, #8200\n  add r3, sp, r3\n  str ip, [r3, #0]\n  ldr r3, [sp, #0]\n"],
    );
    assert!(!output.contains("movw r0"), "r0 clobbered:\n{output}");
    assert_eq!(session.stats().scavenger_spills, 1);
}

#[test]
fn test_spill_slot_tracks_open_call_sequence() {
    let st = subtarget("", "");
    // Every argument register is read by the call, so the temporary is spilled
    // below the 16 bytes the call sequence has pushed.
    let output = lower(
        st.as_ref(),
        "\
function dynbig {
  attr var-sized
  stack 8192 align 8
  stack 4 align 4
  adjcallstackdown #16
  str ip, [%stack.0, #0]
  bl @g
  adjcallstackup #16
  ret
}
",
    );
    check_output_contains(
        &output,
        &["  subi sp, sp, #16\n  str r3, [sp, #16]\n  movw r3, #57328\n  movt r3, #65535\n  add r3, fp, r3\n  str ip, [r3, #0]\n  ldr r3, [sp, #16]\n  bl @g\n  addi sp, sp, #16\n"],
    );
}

#[test]
fn test_over_aligned_local_realigns_sp() {
    let st = subtarget("", "");
    let output = lower(
        st.as_ref(),
        "function aligned {\n  stack 16 align 32\n  ldr r0, [%stack.0, #0]\n  ret\n}\n",
    );
    check_output_contains(
        &output,
        &[
            "addi fp, sp, #8 ; frame-setup",
            "andi sp, sp, #-32 ; frame-setup",
            "subi sp, fp, #8 ; frame-destroy",
        ],
    );
}

#[test]
fn test_callee_saves_superset_of_clobbered() {
    init_logging();
    let st = subtarget("bcm2836", "+reserve-r9");
    let tfi = st.frame_lowering();
    let csrs = RegSet::from_regs(tfi.callee_saved_regs());
    let text = "\
function writes {
  mov r4, r0
  addi r5, r5, #1
  mov r9, r0
  vldr d8, [sp, #0]
  mul r6, r0, r1
  ret
}
function calls {
  bl @g
  ret
}
function framed {
  attr frame-pointer-all
  mov r7, r0
  ret
}
";
    for mut mf in parse(st.as_ref(), text) {
        let naive: RegSet = mf
            .instrs()
            .flat_map(|inst| inst.defs())
            .filter(|reg| csrs.contains(*reg))
            .collect();

        tfi.analyze_frame(&mut mf);
        let mut saved = RegSet::from_regs(&[R4]);
        tfi.determine_callee_saves(&mut mf, &mut saved, None);

        assert!(naive.is_subset(&saved), "{}: {naive:?} not in {saved:?}", mf.name);
        assert!(saved.contains(R4), "{}: pre-seeded register dropped", mf.name);
        for reg in [SP, PC, IP, R9] {
            assert!(!saved.contains(reg), "{}: saved reserved register", mf.name);
        }
        match mf.name.as_str() {
            "writes" => assert!(saved.contains(R5) && !saved.contains(FP)),
            "calls" => assert!(saved.contains(LR)),
            "framed" => assert!(saved.contains(FP)),
            _ => unreachable!(),
        }
    }
}

#[test]
fn test_fpu_callee_saves_spill_with_vstr() {
    let st = subtarget("bcm2835", "");
    let output = lower(
        st.as_ref(),
        "function f {\n  vldr d8, [sp, #0]\n  mov r4, r0\n  ret\n}\n",
    );
    // d8 first at offset 0, then r4; area rounded up to 16.
    check_output_contains(
        &output,
        &[
            "subi sp, sp, #16 ; frame-setup\n  vstr d8, [sp, #0] ; frame-setup\n  str r4, [sp, #8] ; frame-setup\n",
            "ldr r4, [sp, #8] ; frame-destroy\n  vldr d8, [sp, #0] ; frame-destroy\n  addi sp, sp, #16 ; frame-destroy\n",
        ],
    );
}

#[test]
fn test_session_statistics() {
    let st = subtarget("", "");
    let mut functions = parse(
        st.as_ref(),
        "\
function caller {
  stack 32 align 8
  adjcallstackdown #0
  str r0, [%stack.0, #0]
  bl @f
  adjcallstackup #0
  ret
}
function leaf {
  ret
}
",
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    PrologEpilogInserter::new(st.as_ref()).run_module(&mut functions, &session);

    let stats = session.stats();
    assert_eq!(stats.functions_lowered, 2);
    assert_eq!(stats.functions_with_fp, 0);
    assert_eq!(stats.call_frame_pseudos_eliminated, 2);
    assert_eq!(stats.frame_indices_eliminated, 1);
    assert_eq!(stats.callee_saved_spilled, 1);
    assert_eq!(stats.largest_frame_name, "caller");
    assert!(stats.to_string().contains("Frame Lowering Statistics:"));
}

#[test]
fn test_shared_subtarget_across_threads() {
    init_logging();
    let st = subtarget("bcm2837", "");
    let text = "\
function a {
  stack 64 align 8
  adjcallstackdown #8
  bl @g
  adjcallstackup #8
  ret
}
function b {
  attr var-sized
  stack 8 align 4
  ldr r0, [%stack.0, #4]
  ret
}
function c {
  stack 8192 align 8
  stack 4 align 4
  ldr r0, [%stack.1, #0]
  ret
}
";
    let expected = lower(st.as_ref(), text);

    let results: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let st = Arc::clone(&st);
                s.spawn(move || lower(st.as_ref(), text))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect()
    });

    for output in results {
        assert_eq!(output, expected);
    }
}
