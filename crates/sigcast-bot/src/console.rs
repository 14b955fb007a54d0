//! Line-oriented console transport.
//!
//! Messages arrive on stdin as blocks separated by blank lines. The first
//! line names the sender (`@operator` or `@<subscriber id>`), the rest is
//! the message text. Replies and notifications go to stdout.

use crate::app::{Application, Sender};
use sigcast_core::SubscriberId;
use sigcast_notify::{BoxFuture, Notification, NotificationSink, NotifyResult};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: Sender,
    pub text: String,
}

/// Parse a `@operator` / `@<id>` header line.
pub fn parse_sender(header: &str) -> Option<Sender> {
    let name = header.trim().strip_prefix('@')?;
    if name.eq_ignore_ascii_case("operator") {
        return Some(Sender::Operator);
    }
    name.parse::<SubscriberId>().ok().map(Sender::Subscriber)
}

/// Turn one blank-line separated block into a message.
pub fn parse_block(block: &str) -> Result<InboundMessage, String> {
    let block = block.trim();
    let (header, body) = block.split_once('\n').unwrap_or((block, ""));
    let sender = parse_sender(header)
        .ok_or_else(|| format!("Expected '@operator' or '@<id>' header, got '{}'", header.trim()))?;
    let text = body.trim();
    if text.is_empty() {
        return Err("Empty message".to_string());
    }
    Ok(InboundMessage {
        sender,
        text: text.to_string(),
    })
}

/// Read blocks from `reader` until EOF, replying to each on stdout.
pub async fn run<R>(app: &Application, reader: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    info!("Console transport ready");
    let mut lines = reader.lines();
    let mut block = String::new();

    loop {
        let line = lines.next_line().await?;
        let end_of_block = line.as_deref().map_or(true, |l| l.trim().is_empty());

        if let Some(line) = &line {
            if !end_of_block {
                block.push_str(line);
                block.push('\n');
            }
        }

        if end_of_block && !block.trim().is_empty() {
            dispatch(app, &block).await;
            block.clear();
        }
        if line.is_none() {
            break;
        }
    }

    info!("Console input closed");
    Ok(())
}

async fn dispatch(app: &Application, block: &str) {
    match parse_block(block) {
        Ok(message) => {
            debug!(sender = ?message.sender, "Inbound message");
            let reply = app.handle(message.sender, &message.text).await;
            print_block(&format!("[reply {}]", label(message.sender)), &reply);
        }
        Err(e) => {
            warn!(error = %e, "Unreadable console block");
            print_block("[console]", &e);
        }
    }
}

fn label(sender: Sender) -> String {
    match sender {
        Sender::Operator => "operator".to_string(),
        Sender::Subscriber(id) => id.to_string(),
    }
}

fn print_block(header: &str, body: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{header}\n{body}\n");
    let _ = stdout.flush();
}

/// Notification sink printing to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn deliver(&self, notification: Notification) -> BoxFuture<'_, NotifyResult<()>> {
        Box::pin(async move {
            print_block(&format!("[to {}]", notification.recipient), &notification.render());
            Ok(())
        })
    }
}
