use std::path::PathBuf;

use postforge::Interpreter;

fn usage() -> ! {
    eprintln!("usage: postforge [file.ps ...]");
    eprintln!("       reads standard input when no files are given");
    std::process::exit(2);
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut files: Vec<PathBuf> = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => usage(),
            _ => files.push(PathBuf::from(arg)),
        }
    }

    let mut interpreter = Interpreter::new();

    if files.is_empty() {
        interpreter.run_stdin()?;
    } else {
        for file in files {
            interpreter.run_path(&file)?;
            if interpreter.quit_requested() {
                break;
            }
        }
    }

    log::info!(
        "finished: {} page(s) on the display-list device",
        interpreter.pages().len()
    );

    Ok(())
}
