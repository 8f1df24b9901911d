//! Stay connected and receive clipboard content.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clipportal_client::{
    codec::create_unique_file, ClientError, ClipboardContent, ClipboardSession, ClipboardSink,
    Friend, SessionEvent, SessionOptions, SessionServices, TrustError, WsConnector,
};
use clipportal_core::ConnectionState;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::App;

/// Prints text to stdout and moves files into an output directory.
#[derive(Debug)]
pub struct CliSink {
    output_dir: PathBuf,
}

impl CliSink {
    /// Create a sink writing files into `output_dir`.
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl ClipboardSink for CliSink {
    async fn write(&self, content: ClipboardContent, from: &Friend) -> io::Result<()> {
        match content {
            ClipboardContent::Text(text) => {
                println!("{}", text);
                Ok(())
            }
            ClipboardContent::File { path, filename } => {
                tokio::fs::create_dir_all(&self.output_dir).await?;
                let (dest, file) = create_unique_file(&self.output_dir, &filename)
                    .await
                    .map_err(io::Error::other)?;
                drop(file);
                tokio::fs::copy(&path, &dest).await?;
                tokio::fs::remove_file(&path).await?;
                eprintln!("Saved {} from {}", dest.display(), from.id);
                Ok(())
            }
        }
    }
}

/// Run the listen command until Ctrl-C.
pub async fn run(app: &App, output_dir: Option<PathBuf>, deny_unknown: bool) -> Result<()> {
    let identity = app.existing_identity()?;
    let friends = app.friends().await?;
    if friends.user_id().await.is_none() {
        anyhow::bail!("Not registered. Run 'portal-cli init' first.");
    }

    let output_dir = match output_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };
    let session = ClipboardSession::new(
        SessionServices {
            identity,
            friends,
            api: app.relay()?,
            connector: Arc::new(WsConnector::new(&app.config.websocket_url)),
            sink: Arc::new(CliSink::new(output_dir)),
        },
        SessionOptions {
            connect_timeout: app.config.connect_timeout(),
            staging_dir: app.staging_dir(),
            ..SessionOptions::default()
        },
    );

    let mut events = session.subscribe();
    session.start_connection().await?;
    eprintln!("Listening as {}. Press Ctrl-C to stop.", app.config.websocket_url);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => handle(&session, event, deny_unknown, &mut stdin).await?,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("missed {} session events", missed);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.stop_connection().await;
    Ok(())
}

async fn handle<R>(
    session: &ClipboardSession,
    event: SessionEvent,
    deny_unknown: bool,
    stdin: &mut tokio::io::Lines<R>,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match event {
        SessionEvent::StatusChanged(status) => match (status.state, status.last_error) {
            (state, _) if state.is_authenticated() => eprintln!("Connected."),
            (ConnectionState::Disconnected, Some(error)) => {
                eprintln!("Disconnected: {}. Retrying...", error)
            }
            _ => {}
        },
        SessionEvent::TrustRequested {
            sender,
            fingerprint,
        } => {
            if deny_unknown {
                if answer(session.deny_pending(&sender).await)?.is_some() {
                    eprintln!("Ignored content from unknown sender {}.", sender);
                }
                return Ok(());
            }
            eprintln!(
                "{} wants to send you content (key {}).",
                sender,
                fingerprint.as_deref().unwrap_or("unavailable")
            );
            eprint!("Accept and add as friend? [y/N] ");
            let reply = stdin.next_line().await?.unwrap_or_default();
            if matches!(reply.trim(), "y" | "Y" | "yes") {
                if let Some(accepted) = answer(session.accept_pending(&sender).await)? {
                    eprintln!("{} is now a friend.", accepted.friend.id);
                    if accepted.resume.is_none() {
                        eprintln!("Their content was replaced before it could be fetched.");
                    }
                }
            } else if answer(session.deny_pending(&sender).await)?.is_some() {
                eprintln!("Denied {}.", sender);
            }
        }
        SessionEvent::ContentReceived { from, kind, .. } => {
            tracing::info!("received {} from {}", kind, from);
        }
        SessionEvent::ReceiveFailed {
            from,
            error,
            security,
        } => {
            if security {
                eprintln!("WARNING: content from {} failed verification: {}", from, error);
            } else {
                eprintln!("Could not receive from {}: {}", from, error);
            }
        }
    }
    Ok(())
}

/// A request that was replaced or already answered is skipped; a replacing
/// request has its own prompt queued behind this one.
fn answer<T>(result: Result<T, ClientError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::Trust(e @ TrustError::RequestChanged { .. })) => {
            eprintln!("Not applied: {}.", e);
            Ok(None)
        }
        Err(ClientError::Trust(TrustError::NoPendingRequest)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipportal_types::{PublicKeyBytes, UserId};
    use tempfile::tempdir;

    fn friend() -> Friend {
        Friend::new(UserId::parse("11112222").unwrap(), PublicKeyBytes::new([1; 32]))
    }

    #[tokio::test]
    async fn files_are_moved_with_unique_names() {
        let staging = tempdir().unwrap();
        let out = tempdir().unwrap();
        let sink = CliSink::new(out.path().to_path_buf());

        for body in [b"first".as_slice(), b"second".as_slice()] {
            let staged = staging.path().join("staged");
            std::fs::write(&staged, body).unwrap();
            sink.write(
                ClipboardContent::File {
                    path: staged.clone(),
                    filename: "report.pdf".into(),
                },
                &friend(),
            )
            .await
            .unwrap();
            assert!(!staged.exists());
        }

        assert_eq!(std::fs::read(out.path().join("report.pdf")).unwrap(), b"first");
        assert_eq!(std::fs::read(out.path().join("report-2.pdf")).unwrap(), b"second");
    }

    #[test]
    fn stale_answers_are_skipped() {
        let changed = ClientError::Trust(TrustError::RequestChanged {
            expected: UserId::parse("55556666").unwrap(),
            pending: UserId::parse("77778888").unwrap(),
        });
        assert!(answer::<()>(Err(changed)).unwrap().is_none());
        assert!(answer::<()>(Err(TrustError::NoPendingRequest.into())).unwrap().is_none());
        assert!(answer::<()>(Err(ClientError::Protocol("x".into()))).is_err());
        assert_eq!(answer(Ok(7)).unwrap(), Some(7));
    }
}
