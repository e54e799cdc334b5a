use clap::Parser;
use megaconfigmap::cmd::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Cli::parse().run().await
}
