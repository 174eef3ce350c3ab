//! Assembles and runs a cough assembly program.
//!
//! # Usage
//! ```text
//! cough <input.asm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file
//!
//! # Options
//! - `-d, --disassemble`: Print the disassembled bytecode instead of running it
//! - `-s, --max-steps <n>`: Stop after `n` instructions (defaults to `COUGH_MAX_STEPS`, else unlimited)
//!
//! The process exits with the program's `sys exit` code, or 1 if assembly or
//! execution fails.
//!
//! # Examples
//! ```text
//! cough program.asm
//! cough program.asm -d
//! cough program.asm --max-steps 100000
//! ```

use cough::utils::log;
use cough::virtual_machine::assembler::assemble_file;
use cough::virtual_machine::disassembler::disassemble;
use cough::virtual_machine::system::ConsoleSystem;
use cough::virtual_machine::vm::Vm;
use cough::{debug, error, info};
use std::env;
use std::path::Path;
use std::process;

const ENV_MAX_STEPS: &str = "COUGH_MAX_STEPS";

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut disassemble_only = false;
    let mut max_steps: Option<u64> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--disassemble" | "-d" => {
                disassemble_only = true;
                i += 1;
            }
            k @ ("--max-steps" | "-s") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                max_steps = Some(parse_steps(&args[i]));
                i += 1;
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if max_steps.is_none()
        && let Ok(value) = env::var(ENV_MAX_STEPS)
    {
        max_steps = Some(parse_steps(&value));
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    // assemble_file logs the rendered diagnostic itself
    let bytecode = match assemble_file(input_path) {
        Ok(code) => code,
        Err(_) => process::exit(1),
    };
    debug!("Assembled {} ({} bytewords)", input_path, bytecode.len());

    if disassemble_only {
        match disassemble(&bytecode) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                error!("Disassembly failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let mut vm = Vm::new(&bytecode);
    if let Some(limit) = max_steps {
        vm = vm.with_step_limit(limit);
    }
    let mut system = ConsoleSystem::stderr();
    match vm.run(&mut system) {
        Ok(exit_code) => {
            info!("{} exited with code {} after {} steps", input_path, exit_code, vm.steps());
            process::exit(exit_code as i32);
        }
        Err(e) => {
            error!("Execution failed at ip {}: {e}", vm.ip());
            process::exit(1);
        }
    }
}

fn parse_steps(value: &str) -> u64 {
    value.trim().parse::<u64>().unwrap_or_else(|_| {
        error!("Invalid step limit: '{}' is not a valid number", value);
        process::exit(1);
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <input.asm> [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --disassemble      Print the disassembly instead of running");
    eprintln!("  -s, --max-steps <n>    Stop after n instructions (env: {ENV_MAX_STEPS})");
    eprintln!("  -h, --help             Show this help");
}
