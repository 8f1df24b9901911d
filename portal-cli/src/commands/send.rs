//! Send text or a file.

use anyhow::{anyhow, Context, Result};
use clipportal_client::ClipboardContent;
use clipportal_types::UserId;
use std::path::PathBuf;

use super::App;
use crate::config::Settings;

/// What to send.
#[derive(Debug)]
pub enum Payload {
    /// Literal text.
    Text(String),
    /// A file on disk.
    File(PathBuf),
}

/// Run the send command.
pub async fn run(app: &App, payload: Payload, to: Option<&str>) -> Result<()> {
    let receiver = match to {
        Some(id) => Some(UserId::parse(id).context("Receiver ID must be 8 digits")?),
        None => Settings::load(&app.data_dir).await?.receiver_id,
    };

    let content = match payload {
        Payload::Text(text) => ClipboardContent::text(text),
        Payload::File(path) => ClipboardContent::file(&path)
            .with_context(|| format!("Cannot send {}", path.display()))?,
    };

    let identity = app.identity()?;
    let friends = app.friends().await?;
    let transfer = app.transfer(identity, friends)?;

    let friend = transfer
        .send_to(&content, receiver.as_ref())
        .await
        .map_err(|e| anyhow!(e.send_message()))?;

    match content.filename() {
        Some(name) => println!("Sent {} to {}", name, friend.id),
        None => println!("Sent text to {}", friend.id),
    }
    Ok(())
}
