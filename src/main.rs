use std::process;
use std::sync::Arc;

use anyhow::Result;
use rsansible::executor::LocalExecutor;
use rsansible::{cli, init_logging, run_apply, run_completions, run_validate};
use tracing::error;

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    let result = match &args.command {
        cli::Commands::Apply(opts) => {
            init_logging(opts.log_level)?;
            let executor = Arc::new(LocalExecutor {
                dry_run: opts.dry_run,
            });
            run_apply(opts, executor)
        }
        cli::Commands::Validate(opts) => {
            init_logging(opts.log_level)?;
            run_validate(opts)
        }
        cli::Commands::Completions(opts) => {
            run_completions(opts);
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}
