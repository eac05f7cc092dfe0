use std::process::ExitCode;

fn main() -> ExitCode {
    match apidrift::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
