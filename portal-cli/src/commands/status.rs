//! Show identity, friends and the configured receiver.

use anyhow::Result;

use super::App;
use crate::config::Settings;

/// Run the status command.
pub async fn run(app: &App) -> Result<()> {
    println!("=== portal-cli status ===");
    println!();

    // Never creates a key: status is read-only.
    let Some(identity) = app.stored_identity()? else {
        println!("Identity: NOT INITIALIZED");
        println!();
        println!("Run 'portal-cli init' to create one.");
        return Ok(());
    };

    let friends = app.friends().await?;
    let settings = Settings::load(&app.data_dir).await?;

    println!("Identity:");
    match friends.user_id().await {
        Some(id) => println!("  User ID:     {}", id),
        None => println!("  User ID:     NOT REGISTERED"),
    }
    println!("  Fingerprint: {}", identity.public_key().fingerprint());
    println!();

    match &settings.receiver_id {
        Some(id) => println!("Receiver: {}", id),
        None => println!("Receiver: not set"),
    }
    println!();

    let list = friends.list().await;
    println!("Friends: {}", list.len());
    for friend in list {
        println!("  {}  {}", friend.id, friend.public_key.fingerprint());
    }
    println!();
    println!("Relay: {}", app.config.server_url);

    Ok(())
}
