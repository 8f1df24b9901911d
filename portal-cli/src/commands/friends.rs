//! List or add friends.

use anyhow::{anyhow, Context, Result};
use clipportal_types::UserId;

use super::App;

/// List known friends.
pub async fn list(app: &App) -> Result<()> {
    let friends = app.friends().await?;
    let list = friends.list().await;
    if list.is_empty() {
        println!("No friends yet.");
        return Ok(());
    }
    for friend in list {
        println!("{}  {}", friend.id, friend.public_key.fingerprint());
    }
    Ok(())
}

/// Fetch a user's key from the relay and trust it.
pub async fn add(app: &App, id: &str) -> Result<()> {
    let id = UserId::parse(id).context("Friend ID must be 8 digits")?;
    let friends = app.friends().await?;
    let relay = app.relay()?;

    let friend = friends
        .get_or_fetch(&id, relay.as_ref())
        .await
        .map_err(|e| anyhow!("Failed to add friend {}: {}", id, e))?;

    println!("Trusted {}", friend.id);
    println!("  Fingerprint: {}", friend.public_key.fingerprint());
    println!("Compare the fingerprint with your friend's 'portal-cli status'.");
    Ok(())
}
