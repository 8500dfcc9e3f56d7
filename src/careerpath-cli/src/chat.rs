//! Driving a [`ChatSession`] from the terminal.

use std::io::Write;

use anyhow::{Context, Result};
use careerpath_client::{ChatRequest, ChatSession, Completion, SessionReport, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::render::{ReplyRenderer, write_citations};

/// Send one request and render its reply as it streams.
///
/// Ctrl-C cancels the reply; whatever arrived so far stays on screen.
pub async fn stream_reply(chat: &mut ChatSession, request: ChatRequest) -> Result<SessionReport> {
    let handle = chat.send(request)?;
    let mut snapshots = handle.snapshots();
    let mut renderer = ReplyRenderer::new();
    let mut stdout = std::io::stdout();

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        if let Some(reply) = snapshot.transcript.last().filter(|m| m.is_assistant()) {
            renderer.update(&reply.text, &mut stdout)?;
        }
        if snapshot.state.is_finalized() {
            break;
        }
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupt received, cancelling reply");
                handle.cancel();
            }
        }
    }

    let report = handle.finish().await?;
    if let Some(reply) = report.transcript.last().filter(|m| m.is_assistant()) {
        renderer.update(&reply.text, &mut stdout)?;
    }
    renderer.finish(&mut stdout)?;

    match report.state {
        SessionState::Finalized(Ok(Completion::Cancelled)) => println!("(cancelled)"),
        SessionState::Finalized(Ok(_)) => {
            if let Some(reply) = report.transcript.last().filter(|m| m.is_assistant()) {
                write_citations(&reply.citations, &mut stdout)?;
            }
        }
        _ => {
            if let Some(err) = &report.error {
                warn!(error = %err, "Reply failed");
            }
        }
    }
    if report.diagnostics.malformed_frames > 0 {
        debug!(
            malformed = report.diagnostics.malformed_frames,
            "Some stream frames were skipped"
        );
    }
    Ok(report)
}

/// Read messages from stdin until EOF or `/exit`, sending each with
/// `make_request`.
pub async fn interactive<F>(chat: &mut ChatSession, mut make_request: F) -> Result<()>
where
    F: FnMut(String) -> ChatRequest,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            println!();
            return Ok(());
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "/quit" => return Ok(()),
            _ => {}
        }
        stream_reply(chat, make_request(line.to_string())).await?;
    }
}
