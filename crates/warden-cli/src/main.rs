use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::translate::{OpArg, TranslateArgs};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Warden query translation engine")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. "debug", "warden_runtime=trace").
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration, schema and policy files.
    Check {
        /// Path to the engine configuration file.
        #[arg(long, short, default_value = "warden.yaml")]
        config: PathBuf,
    },

    /// Print the store requests a query would produce, without a database.
    Translate {
        #[arg(long, short, default_value = "warden.yaml")]
        config: PathBuf,

        #[arg(long, short)]
        model: String,

        #[arg(long, value_enum, default_value = "get-many")]
        op: OpArg,

        /// Filter string, e.g. "title=*rust*,published=true".
        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        fields: Option<String>,

        #[arg(long)]
        include: Option<String>,

        #[arg(long)]
        sort_by: Option<String>,

        #[arg(long)]
        sort_order: Option<String>,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        offset: Option<u64>,

        /// Record key: a scalar, or a JSON object for composite keys.
        #[arg(long)]
        id: Option<String>,

        /// JSON payload for create/update/upsert (an array for upsert-many).
        #[arg(long)]
        data: Option<String>,

        /// Act as this principal instead of the system principal.
        #[arg(long, requires = "role")]
        as_user: Option<String>,

        #[arg(long, requires = "as_user")]
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Check { config } => commands::check::run(&config).await?,

        Command::Translate {
            config,
            model,
            op,
            filter,
            fields,
            include,
            sort_by,
            sort_order,
            limit,
            offset,
            id,
            data,
            as_user,
            role,
        } => {
            let args = TranslateArgs {
                model,
                op,
                filter,
                fields,
                include,
                sort_by,
                sort_order,
                limit,
                offset,
                id,
                data,
                as_user,
                role,
            };
            commands::translate::run(&config, args).await?
        }
    }

    Ok(())
}
