use std::process::ExitCode;

fn main() -> ExitCode {
    onay_cli::run()
}
