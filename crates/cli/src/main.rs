use std::process::ExitCode;

fn main() -> ExitCode {
    callbridge_cli::run()
}
