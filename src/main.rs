//! Wardwatch command line
//!
//! Drives the engine against a local SQLite file. Results are printed as
//! JSON on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and print row counts
//! wardwatch --database ./ward.db init
//!
//! # Mint a development token (needs token_secret)
//! export WARDWATCH_TOKEN=$(wardwatch dev-token sub-asha --email asha@example.org)
//!
//! # File, inspect and move a complaint
//! wardwatch file --title "Pothole" --description "Near the school" --category roads --ward 3
//! wardwatch show <id>
//! wardwatch transition <id> resolved --note "Patched" --expect in_review
//!
//! # Read and acknowledge notifications
//! wardwatch inbox
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use wardwatch::auth::extract_token_from_header;
use wardwatch::db::complaints::{ComplaintEdit, ComplaintQuery};
use wardwatch::services::complaints::NewComplaint;
use wardwatch::services::users::NewStaff;
use wardwatch::services::OutboxSink;
use wardwatch::{
    Actor, Category, CommentVisibility, ComplaintStatus, ComplaintVisibility, Config, Database,
    Role, Services, StatusChange, TokenVerifier, WardError,
};

#[derive(Parser, Debug)]
#[command(name = "wardwatch")]
#[command(about = "Access-control and lifecycle engine for ward complaints")]
struct Args {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "WARDWATCH_DATABASE")]
    database: Option<PathBuf>,

    /// Bearer token of the acting user (raw or "Bearer <token>"); omit for anonymous reads
    #[arg(long, global = true, env = "WARDWATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Shared secret of the identity issuer
    #[arg(long, global = true, env = "WARDWATCH_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Log filter, e.g. "debug" or "wardwatch=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database (and the config file, if missing)
    Init,
    /// Issue a token the way the identity provider would
    DevToken {
        subject: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
    /// Resolve the current token to a user
    Whoami,
    /// File a new complaint
    File {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        category: Category,
        #[arg(long)]
        ward: u32,
        #[arg(long)]
        address: Option<String>,
        #[arg(long, default_value = "PUBLIC")]
        visibility: ComplaintVisibility,
    },
    /// List visible complaints
    List {
        #[arg(long)]
        ward: Option<u32>,
        #[arg(long)]
        status: Option<ComplaintStatus>,
        #[arg(long)]
        category: Option<Category>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one complaint
    Show { id: String },
    /// Status history of a complaint
    History { id: String },
    /// Edit an open complaint you filed
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        visibility: Option<ComplaintVisibility>,
    },
    /// Delete a complaint (admin)
    Delete { id: String },
    /// Move a complaint to a new status
    Transition {
        id: String,
        status: ComplaintStatus,
        #[arg(long)]
        note: Option<String>,
        /// Fail if the complaint is no longer in this status
        #[arg(long)]
        expect: Option<ComplaintStatus>,
    },
    /// Assign an officer to a complaint
    Assign { id: String, officer_id: String },
    /// Hand back the active assignment
    Transfer { id: String, reason: String },
    /// Escalate the active assignment to administrators
    Escalate { id: String, reason: String },
    /// Assignment trail of a complaint (staff)
    Assignments { id: String },
    /// Comments visible to the current user
    Comments { id: String },
    /// Post a comment
    Comment {
        id: String,
        content: String,
        #[arg(long, default_value = "PUBLIC")]
        visibility: CommentVisibility,
    },
    /// Pre-register an officer or administrator (admin)
    RegisterStaff {
        email: String,
        display_name: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        ward: Option<u32>,
    },
    /// Change a user's role and ward (admin)
    SetRole {
        user_id: String,
        role: Role,
        #[arg(long)]
        ward: Option<u32>,
    },
    /// Print and acknowledge your pending notifications
    Inbox,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    match run(args) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<WardError>() {
            Some(ward_err) => {
                let body = json!({
                    "error": ward_err.kind(),
                    "status": ward_err.status_code(),
                    "message": ward_err.to_string(),
                });
                eprintln!("{}", body);
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::from_default_env().add_directive("wardwatch=info".parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) if path.exists() => Config::load(path)?,
        _ => Config::default(),
    };

    // Apply CLI overrides
    if let Some(path) = &args.database {
        config.database_path = path.clone();
    }
    if let Some(secret) = &args.token_secret {
        config.token_secret = Some(secret.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Print a value as pretty JSON on stdout
fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn verifier(config: &Config) -> anyhow::Result<TokenVerifier> {
    let secret = config
        .token_secret
        .clone()
        .ok_or_else(|| anyhow!("token_secret is not configured"))?;
    Ok(TokenVerifier::new(secret)?)
}

/// Resolve `--token` to an actor; no token means anonymous
fn current_actor(
    args: &Args,
    config: &Config,
    services: &Services,
) -> anyhow::Result<Option<Actor>> {
    let Some(token) = extract_token_from_header(args.token.as_deref()) else {
        debug!("No token supplied, acting anonymously");
        return Ok(None);
    };
    let claims = verifier(config)?.verify(token)?;
    let user = services.identity.resolve(&claims)?;
    Ok(Some(user.actor()))
}

fn require(actor: Option<Actor>) -> Result<Actor, WardError> {
    actor.ok_or_else(|| WardError::Authentication("this command requires --token".into()))
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if let Command::DevToken { subject, email, ttl } = &args.command {
        let token = verifier(&config)?.issue(subject, email.as_deref(), *ttl)?;
        println!("{}", token);
        return Ok(());
    }

    let db = Arc::new(
        Database::open_with_timeout(&config.database_path, config.busy_timeout())
            .with_context(|| format!("opening {}", config.database_path.display()))?,
    );
    let services = Services::with_outbox(db.clone(), &config);

    if let Command::Init = &args.command {
        if let Some(path) = &args.config {
            if !path.exists() {
                config.save(path)?;
                info!(path = %path.display(), "Created default config");
            }
        }
        info!(path = %config.database_path.display(), "Database ready");
        return emit(&db.stats()?);
    }

    let actor = current_actor(&args, &config, &services)?;

    match args.command {
        Command::Init | Command::DevToken { .. } => Ok(()),
        Command::Whoami => {
            let actor = require(actor)?;
            emit(&services.users.get(&actor.id)?)
        }
        Command::File {
            title,
            description,
            category,
            ward,
            address,
            visibility,
        } => {
            let input = NewComplaint {
                title,
                description,
                category,
                ward,
                address,
                visibility,
            };
            emit(&services.complaints.create(&require(actor)?, input)?)
        }
        Command::List {
            ward,
            status,
            category,
            limit,
            offset,
        } => {
            let query = ComplaintQuery {
                ward,
                status,
                category,
                limit,
                offset,
            };
            emit(&services.complaints.list(actor.as_ref(), &query)?)
        }
        Command::Show { id } => emit(&services.complaints.get(actor.as_ref(), &id)?),
        Command::History { id } => emit(&services.complaints.history(actor.as_ref(), &id)?),
        Command::Edit {
            id,
            title,
            description,
            address,
            visibility,
        } => {
            let edit = ComplaintEdit {
                title,
                description,
                address,
                visibility,
            };
            emit(&services.complaints.edit(&require(actor)?, &id, edit)?)
        }
        Command::Delete { id } => {
            services.complaints.delete(&require(actor)?, &id)?;
            emit(&json!({ "deleted": id }))
        }
        Command::Transition {
            id,
            status,
            note,
            expect,
        } => {
            let change = StatusChange {
                new_status: status,
                note,
                expected_current: expect,
            };
            emit(&services.lifecycle.transition_status(&require(actor)?, &id, change)?)
        }
        Command::Assign { id, officer_id } => {
            emit(&services.assignments.assign(&require(actor)?, &id, &officer_id)?)
        }
        Command::Transfer { id, reason } => {
            emit(&services.assignments.transfer(&require(actor)?, &id, &reason)?)
        }
        Command::Escalate { id, reason } => {
            emit(&services.assignments.escalate(&require(actor)?, &id, &reason)?)
        }
        Command::Assignments { id } => {
            emit(&services.assignments.assignments(&require(actor)?, &id)?)
        }
        Command::Comments { id } => {
            emit(&services.comments.list_visible_comments(actor.as_ref(), &id)?)
        }
        Command::Comment {
            id,
            content,
            visibility,
        } => emit(&services.comments.post(&require(actor)?, &id, &content, visibility)?),
        Command::RegisterStaff {
            email,
            display_name,
            role,
            ward,
        } => {
            let input = NewStaff {
                email,
                display_name,
                role,
                ward,
            };
            emit(&services.users.register_staff(&require(actor)?, input)?)
        }
        Command::SetRole { user_id, role, ward } => {
            emit(&services.users.set_role(&require(actor)?, &user_id, role, ward)?)
        }
        Command::Inbox => {
            let actor = require(actor)?;
            emit(&OutboxSink::new(db.clone()).drain(&actor.id)?)
        }
    }
}
