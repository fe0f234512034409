use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use finish_cli::host::LocalHost;
use services::services::{
    config::{Config, load_config_from_file, save_config_to_file},
    finish::FinishCommand,
    host::{CommandContext, MessageRef},
};
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, prelude::*};
use utils::assets;

#[derive(Parser, Debug)]
#[command(name = FinishCommand::ID, about = FinishCommand::DESCRIPTION, version)]
struct Cli {
    /// Command arguments, e.g. `/project @branch` or a `ses_...` token
    args: Vec<String>,

    /// Text of the message being replied to
    #[arg(long)]
    reply_text: Option<String>,

    /// Id of the message being replied to
    #[arg(long)]
    reply_to: Option<i64>,

    /// Channel the command was sent in
    #[arg(long, default_value_t = 0)]
    channel: i64,

    /// Id of the invoking message
    #[arg(long, default_value_t = 0)]
    message_id: i64,

    /// Config file (defaults to the per-user asset directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a default config file if none exists, then exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,finish_cli={level},services={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(&filter_string).context("Failed to create tracing filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();

    let config_path = cli
        .config
        .clone()
        .or_else(assets::config_path)
        .context("No config path given and no home directory to derive one")?;

    if cli.init_config {
        if config_path.exists() {
            tracing::info!("Config already exists at {}", config_path.display());
        } else {
            save_config_to_file(&Config::default(), &config_path).await?;
            tracing::info!("Wrote default config to {}", config_path.display());
        }
        return Ok(());
    }

    let config = load_config_from_file(&config_path).await;
    let host = Arc::new(LocalHost::new(config.clone()));
    let command = FinishCommand::new(host, Arc::new(Mutex::new(())), &config);

    let ctx = CommandContext {
        args_text: cli.args.join(" "),
        reply_text: cli.reply_text,
        reply_to: cli
            .reply_to
            .map(|message_id| MessageRef::new(cli.channel, message_id)),
        message: MessageRef::new(cli.channel, cli.message_id),
        running_tasks: None,
    };

    let reply = command.handle(&ctx).await;
    println!("{}", reply.text);
    Ok(())
}
