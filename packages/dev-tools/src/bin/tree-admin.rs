//! Tree Administration CLI
//!
//! Small development tool for inspecting and seeding a TreePerm database
//! from the shell. All output is pretty-printed JSON on stdout; logs go to
//! stderr.
//!
//! # Usage
//!
//! ```bash
//! # Create the schema (idempotent)
//! cargo run --bin tree-admin -- init
//!
//! # Add nodes
//! cargo run --bin tree-admin -- add team
//! cargo run --bin tree-admin -- add alpha team
//! cargo run --bin tree-admin -- add-leaf svc1 team.alpha
//!
//! # Inspect
//! cargo run --bin tree-admin -- tree
//! cargo run --bin tree-admin -- search svc1
//! cargo run --bin tree-admin -- keys
//! cargo run --bin tree-admin -- grants alice
//! ```
//!
//! # Configuration
//!
//! Reads `TREEPERM_DB_PATH`, `TREEPERM_BUSY_TIMEOUT_MS` and `TREEPERM_WAL`;
//! defaults to `~/.treeperm/database/treeperm.db`. Log level follows
//! `RUST_LOG`, defaulting to `info`.

use serde_json::json;
use treeperm_core::{
    config::TreeConfig,
    models::{GrantQuery, NewNode, NodeQuery, NodeRef},
    services::{PermissionResolver, RoleService, TreeService},
};

const USAGE: &str = "usage: tree-admin <command> [args]

commands:
  init                      create the database schema
  add <name> [parent-path]  create a non-leaf node
  add-leaf <name> <parent>  create a leaf node under a parent path
  tree [path]               print the enabled tree, optionally below a path
  search <value>            run a value search over enabled nodes
  keys [value]              list enabled leaf nodes, optionally filtered
  grants <user>             list a user's grants and granted paths";

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let arg = |i: usize| args.get(i).map(String::as_str);

    let config = TreeConfig::from_env()?;
    tracing::info!("Using database at {}", config.database_path.display());
    let service = TreeService::open(&config).await?;

    match (command.as_str(), arg(1), arg(2)) {
        ("init", _, _) => {
            print_json(&json!({ "database": config.database_path }))?;
        }
        ("add", Some(name), parent) => {
            let request = NewNode::root(name).with_parent(parent.map(NodeRef::path));
            print_json(&service.create_node(request).await?)?;
        }
        ("add-leaf", Some(name), Some(parent)) => {
            let request = NewNode::leaf(name, NodeRef::path(parent));
            print_json(&service.create_node(request).await?)?;
        }
        ("tree", path, _) => {
            let query = match path {
                Some(path) => NodeQuery::enabled().with_within(vec![path.to_string()]),
                None => NodeQuery::enabled(),
            };
            print_json(&service.tree(&query, path.is_some()).await?)?;
        }
        ("search", Some(value), _) => {
            print_json(&service.search(Some(value), &NodeQuery::new()).await?)?;
        }
        ("keys", value, _) => {
            print_json(&service.search_keys(value).await?)?;
        }
        ("grants", Some(user), _) => {
            let roles = RoleService::new(service.store());
            let resolver = PermissionResolver::new(service.store());
            let grants = roles.list_grants(&GrantQuery::for_user(user)).await?;
            let paths = resolver.resolve_granted_paths(user, None).await?;
            print_json(&json!({ "grants": grants, "grantedPaths": paths }))?;
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
