use std::process::ExitCode;

fn main() -> ExitCode {
    claimly_cli::run()
}
