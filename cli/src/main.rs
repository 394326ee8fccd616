use anyhow::Result;
use clap::{Parser, Subcommand};

mod command;
mod logging;
mod server;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

#[derive(Parser)]
#[command(name = "boxman")]
#[command(about = "Inspect active systemd services and generate unit files")]
#[command(version = VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP service")]
    Serve(command::Serve),
    #[command(about = "List active services")]
    #[command(alias = "ls")]
    List(command::List),
    #[command(about = "Generate unit file content to stdout")]
    Generate(command::Generate),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;
    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.run().await?,
        Commands::List(list_cmd) => list_cmd.run()?,
        Commands::Generate(generate_cmd) => generate_cmd.run()?,
    }
    Ok(())
}
