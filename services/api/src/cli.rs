use crate::demo::{run_calculate, run_demo, CalculateArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use insurepath::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "InsurePath",
    about = "Resolve standard monthly rewards for health and pension insurance",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with standard rewards from the command line
    Reward {
        #[command(subcommand)]
        command: RewardCommand,
    },
    /// Run an end-to-end CLI demo covering rate tables, calculation, and commit
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RewardCommand {
    /// Calculate health and pension grades for a salary against a rate table CSV
    Calculate(CalculateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Reward {
            command: RewardCommand::Calculate(args),
        } => run_calculate(args),
        Command::Demo(args) => run_demo(args),
    }
}
