//! Set the outgoing receiver.

use anyhow::{Context, Result};
use clipportal_types::UserId;

use super::App;
use crate::config::Settings;

/// Run the receiver command.
pub async fn run(app: &App, id: &str) -> Result<()> {
    let id = UserId::parse(id).context("Receiver ID must be 8 digits")?;

    let mut settings = Settings::load(&app.data_dir).await?;
    settings.receiver_id = Some(id.clone());
    settings.save(&app.data_dir).await?;

    println!("Receiver set to {}", id);
    Ok(())
}
