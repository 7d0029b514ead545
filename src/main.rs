use clap::Parser;
use kubegraph::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    cli::run(args).await
}
