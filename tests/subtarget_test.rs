//! Subtarget construction through the target registry.

use riscpi::core::CodegenError;
use riscpi::riscpi::features::{FEATURE_DIV, FEATURE_FPU, FEATURE_MUL, FEATURE_RESERVE_R9};
use riscpi::riscpi::regs::R9;
use riscpi::target::{TargetMachine, TargetOptions, TargetRegistry};

fn target_machine() -> TargetMachine {
    TargetMachine::new(&TargetRegistry::builtin(), "riscpi-unknown-none", TargetOptions::default())
        .expect("riscpi is a builtin target")
}

#[test]
fn test_empty_cpu_is_generic_for_any_feature_string() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tm = target_machine();
    for fs in ["", "+mul", "+div,-fpu", "-mul", "+reserve-r9,+fpu", ",,", "+bogus", "bcm2836"] {
        let empty = tm.create_subtarget("", fs);
        let generic = tm.create_subtarget("generic", fs);
        assert_eq!(empty.config(), generic.config(), "feature string {fs:?}");
        assert_eq!(empty.cpu(), "generic");
    }
}

#[test]
fn test_default_subtarget_has_no_capabilities() {
    let st = target_machine().create_subtarget("", "");
    assert_eq!(st.cpu(), "generic");
    assert!(st.config().is_empty());
    assert_eq!(st.config().feature_string(), "");
}

#[test]
fn test_cpu_features_and_overrides() {
    let tm = target_machine();

    let st = tm.create_subtarget("bcm2835", "");
    assert!(st.config().has_feature(FEATURE_MUL));
    assert!(st.config().has_feature(FEATURE_FPU));
    assert!(!st.config().has_feature(FEATURE_DIV));

    let st = tm.create_subtarget("bcm2836", "-fpu");
    assert!(st.config().has_feature(FEATURE_DIV));
    assert!(!st.config().has_feature(FEATURE_FPU));

    // Later tokens win.
    let st = tm.create_subtarget("", "+div,-div");
    assert!(!st.config().has_feature(FEATURE_DIV));
    assert!(st.config().has_feature(FEATURE_MUL));
}

#[test]
fn test_disabling_mul_disables_div() {
    let st = target_machine().create_subtarget("bcm2837", "-mul");
    assert!(!st.config().has_feature(FEATURE_MUL));
    assert!(!st.config().has_feature(FEATURE_DIV));
    assert!(st.config().has_feature(FEATURE_FPU));
}

#[test]
fn test_cpu_token_in_feature_string_merges_features() {
    let st = target_machine().create_subtarget("generic", "bcm2835,+reserve-r9");
    assert_eq!(st.cpu(), "generic");
    assert!(st.config().has_feature(FEATURE_MUL));
    assert!(st.config().has_feature(FEATURE_FPU));
    assert!(st.config().has_feature(FEATURE_RESERVE_R9));
}

#[test]
fn test_unknown_cpu_keeps_name_without_features() {
    let st = target_machine().create_subtarget("cortex-x", "");
    assert_eq!(st.cpu(), "cortex-x");
    assert!(st.config().is_empty());
}

#[test]
fn test_reserve_r9_shapes_register_info() {
    let tm = target_machine();
    let plain = tm.create_subtarget("", "");
    let reserved = tm.create_subtarget("", "+reserve-r9");

    assert!(plain.register_info().callee_saved_regs().contains(&R9));
    assert!(!reserved.register_info().callee_saved_regs().contains(&R9));
    assert!(!reserved.frame_lowering().callee_saved_regs().contains(&R9));
}

#[test]
fn test_fpu_adds_vfp_callee_saves() {
    let tm = target_machine();
    let soft = tm.create_subtarget("", "");
    let hard = tm.create_subtarget("", "+fpu");
    assert_eq!(soft.register_info().callee_saved_regs().len(), 9);
    assert_eq!(hard.register_info().callee_saved_regs().len(), 17);
    assert_eq!(hard.frame_lowering().stack_alignment(), 8);
}

#[test]
fn test_registry_resolves_arch_names() {
    let registry = TargetRegistry::builtin();
    for triple in ["riscpi", "riscpi-unknown-none", "riscpiel-pi-linux-gnueabihf"] {
        let tm = TargetMachine::new(&registry, triple, TargetOptions::default()).unwrap();
        assert_eq!(tm.target().name, "riscpi");
        assert_eq!(tm.triple().as_str(), triple);
    }
}

#[test]
fn test_unknown_triple_is_an_error() {
    let err = TargetMachine::new(&TargetRegistry::builtin(), "x86_64-pc-linux", TargetOptions::default())
        .unwrap_err();
    assert!(matches!(err, CodegenError::UnknownTarget { .. }), "{err}");
    assert!(err.to_string().contains("x86_64-pc-linux"));
}
