use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mini_openclaw::cli;
use mini_openclaw::config::AppConfig;
use mini_openclaw::logs::LogBroadcast;

#[derive(Parser, Debug)]
#[command(
    name = "mini-openclaw",
    version,
    about = "Tool-using agent backend with streamed events"
)]
struct Cli {
    /// Backend root directory (memory/, sessions/, skills/, workspace/, knowledge/)
    #[arg(long, env = "MINI_OPENCLAW_ROOT", default_value = "backend")]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP gateway (default)
    Serve {
        /// Listen address, overriding config.yaml
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run one turn and print its events as JSON lines
    Chat {
        #[arg(long, default_value = "default")]
        session: String,
        #[arg(long)]
        message: String,
    },
    /// Inspect stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsCmd,
    },
    /// Manage the skills snapshot
    Skills {
        #[command(subcommand)]
        action: SkillsCmd,
    },
    /// Check whether a gateway is running
    Status {
        #[arg(long, default_value = "http://127.0.0.1:8002")]
        url: String,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsCmd {
    /// List sessions, most recent first
    List,
}

#[derive(Subcommand, Debug)]
enum SkillsCmd {
    /// Rescan skills/ and rewrite workspace/SKILLS_SNAPSHOT.md
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logs = LogBroadcast::new();
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(logs.layer())
            .init();
    }

    let cli = Cli::parse();
    if let Some(Command::Status { url }) = &cli.command {
        return cli::check_status(url).await;
    }

    let config = AppConfig::load(cli.root).await?;
    config.ensure_runtime_dirs().await?;
    let config = Arc::new(config);

    match cli.command {
        None => cli::serve(config, logs, None).await,
        Some(Command::Serve { addr }) => cli::serve(config, logs, addr.as_deref()).await,
        Some(Command::Chat { session, message }) => {
            cli::run_chat(config, &session, &message).await
        }
        Some(Command::Sessions {
            action: SessionsCmd::List,
        }) => cli::list_sessions(&config).await,
        Some(Command::Skills {
            action: SkillsCmd::Refresh,
        }) => cli::refresh_skills(&config).await,
        Some(Command::Status { .. }) => Ok(()),
    }
}
