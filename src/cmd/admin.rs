//! Database administration — `sitecraft init-db` and `sitecraft create-user`.

use anyhow::{Context, Result};

use sitecraft::config::AppConfig;
use sitecraft::studio::auth::{hash_password, normalize_email, validate_password};
use sitecraft::studio::db::StudioDb;

fn open_db(config: &AppConfig) -> Result<StudioDb> {
    let path = &config.database.path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    StudioDb::new(path)
}

pub fn cmd_init_db(config: &AppConfig) -> Result<()> {
    open_db(config)?;
    println!("Database initialized at {}", config.database.path.display());
    Ok(())
}

pub fn cmd_create_user(
    config: &AppConfig,
    email: &str,
    password: &str,
    name: Option<&str>,
) -> Result<()> {
    let email = normalize_email(email)?;
    validate_password(password)?;
    let db = open_db(config)?;
    let hash = hash_password(password)?;
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    let user = db.create_user(&email, name, &hash)?;
    tracing::info!(user_id = user.id, "user created from cli");
    println!("Created user {} (id {})", user.email, user.id);
    Ok(())
}
