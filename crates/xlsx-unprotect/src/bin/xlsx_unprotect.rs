use std::process::ExitCode;

use anyhow::Result;

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    xlsx_unprotect::cli::run()
}
