//! Load an ELF image and run it on the `riscvemu` core, in the teacher's
//! `emulate` bin idiom: a `clap`-derived `Args`, a loader call, then a
//! free-running or single-stepping loop. Generalized from the teacher's
//! platform (which owns CSR/privilege-mode machinery this crate doesn't
//! model) to the `demo::SimplePort` this crate ships instead.

use clap::Parser;
use clap_num::maybe_hex;

use riscvemu::demo::SimplePort;
use riscvemu::elf_utils::load_elf;
use riscvemu::hart::{Hart, HartConfig, StepOutcome, SyncLevel};

/// Run an RV32IMAC ELF binary to completion or to a step bound.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the input ELF executable.
    input: String,

    /// Print a disassembly line for every instruction as it executes.
    #[arg(short, long)]
    disass: bool,

    /// Stop after this many instructions even if the stop sentinel was
    /// never reached (use 0x prefix for hexadecimal).
    #[arg(short, long, value_parser=maybe_hex::<u64>)]
    steps: Option<u64>,

    /// Drop into a rustyline-backed interactive stepper: one instruction
    /// per Enter press, with register state printed after each.
    #[arg(short, long)]
    interactive: bool,
}

fn print_registers(hart: &Hart) {
    for row in 0..8 {
        let mut line = String::new();
        for col in 0..4 {
            let n = row + 8 * col;
            line.push_str(&format!("x{n:<2}={:#010x}  ", hart.x(n as u8)));
        }
        println!("{line}");
    }
    println!("pc ={:#010x}", hart.pc);
}

fn main() {
    let args = Args::parse();

    let config = HartConfig {
        disass_enabled: args.disass,
        sync_level: SyncLevel::None,
        debug_enabled: args.interactive,
    };

    let mut port = SimplePort::new();
    let entry = match load_elf(&mut port, &args.input) {
        Ok(entry) => entry,
        Err(e) => {
            eprintln!("error loading {}: {e}", args.input);
            std::process::exit(1);
        }
    };

    let mut hart = Hart::with_config(config);
    hart.pc = entry;

    let mut editor = if args.interactive {
        Some(rustyline::DefaultEditor::new().expect("failed to start interactive stepper"))
    } else {
        None
    };

    let mut steps_taken: u64 = 0;
    loop {
        if let Some(limit) = args.steps {
            if steps_taken >= limit {
                println!("stopped after reaching the step bound ({limit} instructions)");
                break;
            }
        }

        match hart.step(&mut port) {
            Ok(StepOutcome::Stopped) => {
                println!("simulation stopped at pc={:#010x} after {steps_taken} instructions", hart.pc);
                break;
            }
            Ok(StepOutcome::Continue) => {}
            Err(e) => {
                eprintln!("bus error at pc={:#010x}: {e}", hart.pc);
                std::process::exit(1);
            }
        }
        steps_taken += 1;

        if args.disass {
            if let Some((pc, text)) = port.disass_log().last() {
                println!("{pc:#010x}  {text}");
            }
        }

        if let Some(ed) = editor.as_mut() {
            print_registers(&hart);
            if ed.readline("press enter to continue> ").is_err() {
                break;
            }
        }
    }
}
