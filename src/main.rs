use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{AdminCommands, AdminOp, ApiKeyCommands, Commands, McpTokenCommands};
use keymint::config::{self, Config, LogFormat};
use keymint::errors::CredentialError;
use keymint::manager::{ApiKeyManager, CredentialManager, McpTokenManager};
use keymint::models::{CreateApiKey, CredentialKind};
use keymint::secret::Hasher;
use keymint::store::{CredentialStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(cfg.log_format);

    let args = cli::Cli::parse();

    let store = PgStore::connect(&cfg.database_url, cfg.db_max_connections)
        .await
        .context("failed to connect to the credential database")?;

    let result = match args.command {
        Commands::Migrate => {
            store.migrate().await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Commands::ApiKey { command } => {
            let manager: ApiKeyManager<PgStore> = build_manager(&cfg, store)?;
            handle_api_key_command(&manager, command).await
        }
        Commands::McpToken { command } => {
            let manager: McpTokenManager<PgStore> = build_manager(&cfg, store)?;
            handle_mcp_token_command(&manager, command).await
        }
        Commands::Admin { command } => match command {
            AdminCommands::ApiKeys { command } => {
                let manager: ApiKeyManager<PgStore> = build_manager(&cfg, store)?;
                handle_admin_command(&manager, command).await
            }
            AdminCommands::McpTokens { command } => {
                let manager: McpTokenManager<PgStore> = build_manager(&cfg, store)?;
                handle_admin_command(&manager, command).await
            }
        },
    };

    if let Err(ref e) = result {
        tracing::error!("Command failed: {:#}", e);
    }
    result
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "keymint=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn build_manager<K, S>(cfg: &Config, store: S) -> anyhow::Result<CredentialManager<K, S>>
where
    K: CredentialKind,
    S: CredentialStore<K>,
{
    let hasher = Hasher::new(cfg.hasher).context("invalid KEYMINT_HASH_* settings")?;
    Ok(CredentialManager::new(store, hasher).with_deadline(cfg.operation_timeout))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report a failed validation the way a protocol layer would: one generic
/// answer on stdout, the internal reason only in the logs.
fn reject(err: CredentialError) -> anyhow::Result<()> {
    let public = err.public();
    tracing::warn!(reason = err.kind(), "Token rejected");
    println!("{}", public.to_json());
    anyhow::bail!("{}", public.message)
}

async fn handle_api_key_command(
    manager: &ApiKeyManager<PgStore>,
    cmd: ApiKeyCommands,
) -> anyhow::Result<()> {
    match cmd {
        ApiKeyCommands::Create {
            owner,
            name,
            description,
            expires_at,
            workloads,
        } => {
            let issued = manager
                .create(
                    owner,
                    CreateApiKey {
                        name,
                        description,
                        expires_at,
                        authorized_workload_ids: workloads,
                    },
                )
                .await?;
            print_json(&issued.credential)?;
            println!("\nToken (shown once): {}", issued.token.as_str());
        }
        ApiKeyCommands::List { owner } => print_json(&manager.list(owner).await?)?,
        ApiKeyCommands::Get { owner, id } => print_json(&manager.get(owner, id).await?)?,
        ApiKeyCommands::Delete { owner, id } => {
            manager.delete(owner, id).await?;
            println!("Deleted API key {id}");
        }
        ApiKeyCommands::Validate { token, workload } => {
            let credential = match manager.validate(&token).await {
                Ok(c) => c,
                Err(e) if e.is_rejection() => return reject(e),
                Err(e) => return Err(e.into()),
            };
            if let Some(workload) = workload {
                if !credential.authorizes(&workload) {
                    tracing::warn!(
                        credential_id = credential.id,
                        workload = %workload,
                        "API key not authorized for workload"
                    );
                    anyhow::bail!("API key is not authorized for workload {workload}");
                }
            }
            print_json(&credential)?;
        }
    }
    Ok(())
}

async fn handle_mcp_token_command(
    manager: &McpTokenManager<PgStore>,
    cmd: McpTokenCommands,
) -> anyhow::Result<()> {
    match cmd {
        McpTokenCommands::Create { owner } => {
            let issued = manager.create(owner, ()).await?;
            print_json(&issued.credential)?;
            println!("\nToken (shown once): {}", issued.token.as_str());
        }
        McpTokenCommands::List { owner } => print_json(&manager.list(owner).await?)?,
        McpTokenCommands::Get { owner, id } => print_json(&manager.get(owner, id).await?)?,
        McpTokenCommands::Delete { owner, id } => {
            manager.delete(owner, id).await?;
            println!("Deleted MCP token {id}");
        }
        McpTokenCommands::Validate { token } => match manager.validate(&token).await {
            Ok(credential) => print_json(&credential)?,
            Err(e) if e.is_rejection() => return reject(e),
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

async fn handle_admin_command<K>(
    manager: &CredentialManager<K, PgStore>,
    op: AdminOp,
) -> anyhow::Result<()>
where
    K: CredentialKind,
    PgStore: CredentialStore<K>,
{
    let admin = manager.admin();
    match op {
        AdminOp::List => print_json(&admin.list().await?)?,
        AdminOp::Get { id } => print_json(&admin.get(id).await?)?,
        AdminOp::Delete { id } => {
            admin.delete(id).await?;
            println!("Deleted {} {id}", K::LABEL);
        }
        AdminOp::Touch { id } => {
            admin.touch_last_used(id).await?;
            println!("Recorded use of {} {id}", K::LABEL);
        }
    }
    Ok(())
}
