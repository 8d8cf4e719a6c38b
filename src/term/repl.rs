use super::{execute, styled, Options};
use basic::lang;
use basic::lang::Error;
use linefeed::{DefaultTerminal, Interface, ReadResult};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Numbered lines are stored, `RUN` compiles and runs them, anything
/// else runs immediately as a one line program.
pub fn main_loop(options: &Options, interrupted: Arc<AtomicBool>) -> std::io::Result<()> {
    let interface = Interface::new("BASIC")?;
    let mut listing: BTreeMap<u16, String> = BTreeMap::new();
    let mut print_ready = true;

    loop {
        if print_ready {
            print_ready = false;
            interface.write_fmt(format_args!("READY.\n"))?;
        }
        let input = match interface.read_line()? {
            ReadResult::Input(input) => input,
            ReadResult::Signal(_) | ReadResult::Eof => break,
        };
        let command = input.trim().to_string();
        if command.is_empty() {
            continue;
        }
        interface.add_history_unique(input);
        match lang::lex(&command) {
            Ok((Some(number), tokens)) => {
                if tokens.is_empty() {
                    listing.remove(&number);
                } else {
                    listing.insert(number, command);
                }
                continue;
            }
            Ok((None, _)) => {}
            Err(error) => {
                report(&interface, &error)?;
                continue;
            }
        }
        print_ready = true;
        let source = match command.to_ascii_uppercase().as_str() {
            "LIST" => {
                for line in listing.values() {
                    interface.write_fmt(format_args!("{}\n", line))?;
                }
                continue;
            }
            "NEW" => {
                listing.clear();
                continue;
            }
            "RUN" => listing.values().cloned().collect::<Vec<String>>().join("\n"),
            _ => command,
        };
        let result = lang::compile(&source)
            .and_then(|program| execute(&program, options, interrupted.clone()));
        if let Err(error) = result {
            report(&interface, &error)?;
        }
    }
    Ok(())
}

fn report(interface: &Interface<DefaultTerminal>, error: &Error) -> std::io::Result<()> {
    interface.write_fmt(format_args!("{}\n", styled(error)))
}
