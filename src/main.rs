use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use herald::{
    config::AppConfig,
    persistence::{SqliteStore, traits::EntityStore},
    senders::SenderRegistry,
    supervisor::Supervisor,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Directory holding `app.yaml`.
    #[arg(long, default_value = "configs")]
    config_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the dispatcher and the events worker until interrupted.
    Run(ConfigArgs),
    /// Initialises every sender and checks configured and stored contact types.
    Validate(ConfigArgs),
    /// Queues a test notification for a contact.
    TestContact {
        /// Identifier of the contact to notify.
        contact_id: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run_supervisor(&args.config_dir).await,
        Commands::Validate(args) => validate(&args.config_dir).await,
        Commands::TestContact { contact_id, config } => {
            test_contact(&config.config_dir, &contact_id).await
        }
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed.");
    }
    result
}

async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    tracing::debug!(database_url = %config.database_url, "Opening store...");
    let store = SqliteStore::new(&config.database_url).await?;
    store.run_migrations().await?;
    Ok(Arc::new(store))
}

async fn run_supervisor(config_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(config_dir, "Loading application configuration...");
    let config = AppConfig::new(Some(config_dir))?;
    let store = open_store(&config).await?;

    let supervisor = Supervisor::builder().config(config).store(Arc::clone(&store)).build()?;
    supervisor.run().await?;

    store.close().await;
    Ok(())
}

async fn validate(config_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new(Some(config_dir))?;
    let registry = SenderRegistry::from_config(&config.senders)?;
    registry.validate(config.contact_types.iter().map(String::as_str))?;

    let store = open_store(&config).await?;
    let contacts = store.get_all_contacts().await;
    store.close().await;
    let contacts = contacts?;
    registry.validate(contacts.iter().map(|c| c.contact_type.as_str()))?;

    tracing::info!(
        contact_types = ?registry.contact_types(),
        contacts = contacts.len(),
        "Configuration is valid."
    );
    Ok(())
}

async fn test_contact(config_dir: &str, contact_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new(Some(config_dir))?;
    let store = open_store(&config).await?;

    let supervisor = Supervisor::builder().config(config).store(Arc::clone(&store)).build()?;
    let result = supervisor.contacts().test_contact(contact_id, Utc::now()).await;
    store.close().await;
    result?;

    tracing::info!(contact_id, "Test notification queued.");
    Ok(())
}
