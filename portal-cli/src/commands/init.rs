//! Initialize identity and register with the relay.

use anyhow::{Context, Result};

use super::App;
use crate::config::set_dir_permissions_0700;

/// Run the init command.
pub async fn run(app: &App) -> Result<()> {
    set_dir_permissions_0700(&app.data_dir).await?;

    let identity = app.identity()?;
    let friends = app.friends().await?;
    let already = friends.user_id().await;

    let transfer = app.transfer(identity.clone(), friends)?;
    let user_id = transfer
        .register(&identity)
        .await
        .context("Failed to register with the relay")?;

    if already.is_some() {
        println!("Already initialized.");
    } else {
        println!("Registered with {}", app.config.server_url);
    }
    println!();
    println!("  User ID:     {}", user_id);
    println!("  Fingerprint: {}", identity.public_key().fingerprint());
    println!();
    println!("Share your user ID with a friend, then set theirs with");
    println!("'portal-cli receiver <id>'.");

    Ok(())
}
