use clap::Parser;
use color_eyre::Result;
use eyre::Context as _;
use zerotrust_exporter::{
    init_errors,
    init_logging,
    run,
    Args,
    Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_errors()?;

    let args = Args::parse();
    let print_config = args.print_config;
    let config = Config::new(args).wrap_err("Invalid configuration")?;

    if print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    init_logging(config.debug)?;
    run(config).await
}
