mod console;
mod repl;

use ansi_term::Style;
use basic::error;
use basic::asm;
use basic::lang::{self, Error};
use basic::mach::{Debugger, Program, Runtime, Snapshot};
use console::Console;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CYCLES: usize = 5000;
const TICK: Duration = Duration::from_millis(1);

const USAGE: &str = "usage: basic [--cycles N] [--trace] [--list] [--image OUT] [FILE]

FILE is BASIC source (.bas), assembly (.asm) or a program image.
Without FILE an interactive prompt starts.";

pub struct Options {
    cycles: usize,
    trace: bool,
    list: bool,
    image: Option<String>,
    file: Option<String>,
}

impl Options {
    fn from_args<I: Iterator<Item = String>>(mut args: I) -> Result<Options, String> {
        let mut options = Options {
            cycles: DEFAULT_CYCLES,
            trace: false,
            list: false,
            image: None,
            file: None,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--cycles" => {
                    options.cycles = match args.next().map(|n| n.parse::<usize>()) {
                        Some(Ok(n)) if n > 0 => n,
                        _ => return Err("--cycles needs a positive number".to_string()),
                    }
                }
                "--trace" => options.trace = true,
                "--list" => options.list = true,
                "--image" => match args.next() {
                    Some(out) => options.image = Some(out),
                    None => return Err("--image needs a file name".to_string()),
                },
                "-h" | "--help" => return Err(String::new()),
                _ if arg.starts_with('-') => return Err(format!("unknown option {}", arg)),
                _ if options.file.is_none() => options.file = Some(arg),
                _ => return Err(format!("unexpected argument {}", arg)),
            }
        }
        Ok(options)
    }
}

pub fn main() {
    let options = match Options::from_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{}", message);
            }
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };
    let interrupted = Arc::new(AtomicBool::new(false));
    let int_moved = interrupted.clone();
    if let Err(error) = ctrlc::set_handler(move || {
        int_moved.store(true, Ordering::SeqCst);
    }) {
        eprintln!("{}", error);
    }
    let result = match &options.file {
        Some(file) => run_file(file, &options, interrupted),
        None => repl::main_loop(&options, interrupted).map_err(io_error),
    };
    if let Err(error) = result {
        eprintln!("{}", styled(&error));
        std::process::exit(1);
    }
}

fn io_error(error: std::io::Error) -> Error {
    error!(InternalError; error.to_string())
}

fn styled(error: &Error) -> String {
    Style::new().bold().paint(format!("?{}", error)).to_string()
}

/// Compile, assemble or decode a file depending on its extension.
fn load(filename: &str) -> Result<Program, Error> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".bas") {
        let source = std::fs::read_to_string(filename).map_err(io_error)?;
        lang::compile(&source)
    } else if lower.ends_with(".asm") {
        let source = std::fs::read_to_string(filename).map_err(io_error)?;
        asm::assemble(&asm::parse(&source)?)
    } else {
        let image = std::fs::read(filename).map_err(io_error)?;
        Program::from_image(&image)
    }
}

fn run_file(filename: &str, options: &Options, interrupted: Arc<AtomicBool>) -> Result<(), Error> {
    let program = load(filename)?;
    if options.list {
        print!("{}", program);
    }
    if let Some(out) = &options.image {
        std::fs::write(out, program.to_image()).map_err(io_error)?;
    }
    if options.list || options.image.is_some() {
        return Ok(());
    }
    execute(&program, options, interrupted)
}

/// Drive the machine one budget at a time until HALT, an error or Ctrl-C.
fn execute(program: &Program, options: &Options, interrupted: Arc<AtomicBool>) -> Result<(), Error> {
    let mut console = Console::new(interrupted.clone()).map_err(io_error)?;
    let mut runtime = Runtime::default();
    runtime.set_tracing(options.trace);
    let mut trace = |snapshot: &Snapshot| {
        eprint!("{}\r\n", Style::new().dimmed().paint(snapshot.to_string()));
    };
    let debugger: &mut dyn Debugger = &mut trace;
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            return Err(error!(InternalError; "BREAK").at_address(runtime.pc()));
        }
        let halted = runtime.run(&mut console, program, options.cycles, Some(&mut *debugger))?;
        console.poll().map_err(io_error)?;
        if halted {
            return Ok(());
        }
        std::thread::sleep(TICK);
    }
}
