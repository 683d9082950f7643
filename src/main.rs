use clap::Parser;
use alertengine::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
