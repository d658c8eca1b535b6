use std::process;

fn main() {
    if let Err(e) = tasku::cli::run() {
        eprintln!("Error: {}", e);
        process::exit(tasku::error::exit_code(&e));
    }
}
