use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// API key and MCP token issuance
#[derive(Parser)]
#[command(name = "keymint", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Manage API keys
    ApiKey {
        #[command(subcommand)]
        command: ApiKeyCommands,
    },

    /// Manage MCP tokens
    McpToken {
        #[command(subcommand)]
        command: McpTokenCommands,
    },

    /// Operate on every owner's credentials
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
pub enum ApiKeyCommands {
    /// Issue a new API key. The token is printed once.
    Create {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Expiry as an RFC 3339 timestamp
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,
        /// Authorized workload id; `*` for all. Repeatable or comma-separated.
        #[arg(long = "workload", value_delimiter = ',', required = true)]
        workloads: Vec<String>,
    },
    /// List an owner's API keys
    List {
        #[arg(long)]
        owner: i64,
    },
    /// Show one API key
    Get {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        id: i64,
    },
    /// Delete an API key
    Delete {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        id: i64,
    },
    /// Validate a token, optionally checking access to a workload
    Validate {
        token: String,
        #[arg(long)]
        workload: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum McpTokenCommands {
    /// Issue a new MCP token. The token is printed once.
    Create {
        #[arg(long)]
        owner: i64,
    },
    /// List an owner's MCP tokens
    List {
        #[arg(long)]
        owner: i64,
    },
    /// Show one MCP token
    Get {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        id: i64,
    },
    /// Delete an MCP token (succeeds if already gone)
    Delete {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        id: i64,
    },
    /// Validate a token
    Validate { token: String },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// API keys across all owners
    ApiKeys {
        #[command(subcommand)]
        command: AdminOp,
    },
    /// MCP tokens across all owners
    McpTokens {
        #[command(subcommand)]
        command: AdminOp,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum AdminOp {
    /// List every credential
    List,
    /// Show a credential by id
    Get {
        #[arg(long)]
        id: i64,
    },
    /// Delete a credential by id
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Record a use now
    Touch {
        #[arg(long)]
        id: i64,
    },
}
