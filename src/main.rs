use clap::Parser;
use imseek::cli::SubCommandExtend;
use imseek::config::{Opts, SubCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::New(config) => config.run(&opts).await,
        SubCommand::Drop(config) => config.run(&opts).await,
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Show(config) => config.run(&opts).await,
    }
}
