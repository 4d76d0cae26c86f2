//! Shared test support: AST fixture builders and a tiny MIR
//! interpreter used to execute the end-to-end scenarios.
#![allow(dead_code)]

pub mod build;
pub mod interp;

use ferrule_mir::{lower_translation_unit, LoweredUnit, MirFunction};

/// Lower a unit and assert it produced no errors.
pub fn lower_ok(tu: &ferrule_ast::TranslationUnit) -> LoweredUnit {
    let unit = lower_translation_unit(tu);
    assert!(
        unit.is_success(),
        "unexpected diagnostics: {:#?}",
        unit.diagnostics
    );
    for f in &unit.functions {
        ferrule_mir::validate_function(f).expect("lowered function must be well-formed");
    }
    unit
}

/// Find a lowered function by its qualified display name.
pub fn find_fn<'a>(unit: &'a LoweredUnit, name: &str) -> &'a MirFunction {
    unit.functions
        .iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| {
            let names: Vec<_> = unit.functions.iter().map(|f| f.name.as_str()).collect();
            panic!("function `{name}` not lowered; have {names:?}")
        })
}

/// Run a lowered function by qualified name with integer arguments.
pub fn run(unit: &LoweredUnit, name: &str, args: &[i64]) -> i64 {
    let mut machine = interp::Machine::new(unit);
    machine.call_by_name(name, args)
}
