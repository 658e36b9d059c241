use clap::Parser;
use failure_link::{cli, error::HookError, host::ExitStatus};
use tracing::error;

fn main() {
    let args = cli::Args::parse();
    let code = match cli::dispatch(args) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            err.downcast_ref::<HookError>()
                .map(HookError::exit_status)
                .unwrap_or(ExitStatus::Error)
                .code()
        }
    };
    std::process::exit(code);
}
