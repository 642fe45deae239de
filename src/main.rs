use clap::{Parser, Subcommand};
use uuid::Uuid;

use food_diary::{
    app::{build_app, serve},
    auth::{Capability, JwtKeys},
    config::AppConfig,
    db,
    state::AppState,
    telemetry,
};

/// food-diary - meal logging backend
#[derive(Parser)]
#[command(name = "food-diary")]
#[command(about = "Patient food diary HTTP service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind address (overrides APP_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides APP_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Apply database migrations
    Migrate,
    /// Print a signed access token for a patient
    IssueToken {
        patient_id: Uuid,

        /// Restrict the token to these capabilities (default: all)
        #[arg(long, value_delimiter = ',')]
        caps: Option<Vec<Capability>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.host.clone());
            let port = port.unwrap_or(config.port);
            let state = AppState::from_config(config).await?;
            serve(build_app(state), &host, port).await
        }
        Commands::Migrate => {
            let pool = db::connect(&config).await?;
            db::migrate(&pool).await
        }
        Commands::IssueToken { patient_id, caps } => {
            let token = JwtKeys::from_config(&config.jwt).sign_access(patient_id, caps)?;
            println!("{}", token);
            Ok(())
        }
    }
}
