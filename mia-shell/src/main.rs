mod analyzer;
mod cli;
mod reports;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use clap::Parser;
use cli::Cli;
use mia_fs::Kernel;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut kernel = Kernel::new();

    match cli.script {
        Some(script) => run_script(&mut kernel, &script),
        None => repl(&mut kernel),
    }
}

fn run_script(kernel: &mut Kernel, script: &Path) -> io::Result<()> {
    let text = fs::read_to_string(script)?;
    for line in text.lines() {
        if dispatch(kernel, line) == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn repl(kernel: &mut Kernel) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(()); // EOF
        }
        if dispatch(kernel, &line) == Flow::Quit {
            return Ok(());
        }
    }
}

#[derive(PartialEq)]
enum Flow {
    Continue,
    Quit,
}

fn dispatch(kernel: &mut Kernel, line: &str) -> Flow {
    let cmd = match analyzer::parse(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return Flow::Continue,
        Err(err) => {
            println!("Error: {err}");
            return Flow::Continue;
        }
    };
    if cmd.name == "exit" {
        return Flow::Quit;
    }

    match analyzer::execute(kernel, &cmd) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(err) => {
            println!("Error: {err}");
            if let Some(usage) = analyzer::usage(&cmd.name) {
                println!("usage: {usage}");
            }
        }
    }
    Flow::Continue
}
