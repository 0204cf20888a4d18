//! CLI command implementations.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use quill_common::{Registry, Value};
use quill_compiler::{compile_source, Script};
use quill_vm::{default_registry, Machine, MachineConfig};
use tracing::debug;

/// Compile and run a script, printing its result if it has one.
pub fn run(input: &Path, max_frames: usize) -> Result<(), i32> {
    let registry = default_registry();
    let script = load(input, &registry)?;

    let config = MachineConfig {
        max_frames,
        ..MachineConfig::default()
    };
    let mut machine = Machine::with_config(Arc::clone(&registry), config);
    machine.load(&script);

    match machine.run() {
        Ok(Value::Null) => Ok(()),
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(3)
        }
    }
}

/// Compile a script and report success or every compile error.
pub fn check(input: &Path) -> Result<(), i32> {
    let registry = default_registry();
    let script = load(input, &registry)?;
    println!(
        "OK: {} ({} functions, {} statements)",
        input.display(),
        script.functions.len(),
        script.main.len()
    );
    Ok(())
}

/// Print the compiled listing of a script.
pub fn dump(input: &Path) -> Result<(), i32> {
    let registry = default_registry();
    let script = load(input, &registry)?;
    print!("{script}");
    Ok(())
}

/// Read and compile `input`, reporting failures on stderr.
fn load(input: &Path, registry: &Registry) -> Result<Script, i32> {
    let source = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", input.display());
        1
    })?;

    let script = compile_source(&source, registry).map_err(|errors| {
        for e in &errors {
            eprintln!("error: {e}");
        }
        1
    })?;
    debug!(
        path = %input.display(),
        functions = script.functions.len(),
        statements = script.main.len(),
        "script compiled"
    );
    Ok(script)
}
