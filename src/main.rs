//! depagent CLI entry point.

use clap::Parser;

use depagent::cli::{commands, handle_error, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.json).await,
        Commands::Run(args) => commands::run::execute(args, config_path, cli.json).await,
        Commands::Validate(args) => {
            commands::validate::execute(args, config_path, cli.json).await
        }
        Commands::Summarize(args) => commands::summarize::execute(args, cli.json).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => handle_error(err, cli.json),
    }
}
