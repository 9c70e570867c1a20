//! One-shot command execution.

use crate::Commands;
use colored::Colorize;
use std::time::{Duration, Instant};
use wsline_core::{Event, Message, WebSocket};

/// Executes a command on an open socket, closes it, and returns the output.
pub async fn execute(
    mut socket: WebSocket,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match cmd {
        Commands::Repl => unreachable!(),

        Commands::Send {
            message,
            binary,
            wait,
        } => {
            let data = read_message_arg(&message)?;
            let message = if binary {
                Message::binary(data)
            } else {
                Message::text(String::from_utf8(data)?)
            };
            socket.send(message).await?;

            if wait == 0 {
                String::new()
            } else {
                match tokio::time::timeout(Duration::from_secs(wait), socket.next_message()).await
                {
                    Ok(Some(Ok(reply))) => format_message(&reply),
                    Ok(Some(Err(e))) => return Err(e.into()),
                    Ok(None) => "Connection closed before a reply".yellow().to_string(),
                    Err(_) => "No reply".yellow().to_string(),
                }
            }
        }

        Commands::Ping { payload } => {
            let started = Instant::now();
            socket.ping(payload.clone()).await?;
            loop {
                match socket.recv().await {
                    Some(Event::Pong(data)) if data == payload.as_bytes() => {
                        break format!(
                            "{} in {:.2} ms",
                            "PONG".green(),
                            started.elapsed().as_secs_f64() * 1000.0
                        );
                    }
                    Some(Event::Error(e)) => return Err(e.into()),
                    Some(Event::Close(_)) | None => {
                        return Err("connection closed before pong".into());
                    }
                    Some(_) => continue,
                }
            }
        }
    };

    let _ = socket.close().await;
    Ok(output)
}

/// Reads `@path` arguments from disk; anything else is taken literally.
pub fn read_message_arg(arg: &str) -> std::io::Result<Vec<u8>> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read(path),
        None => Ok(arg.as_bytes().to_vec()),
    }
}

/// Splits `Name: value` into its parts.
pub fn parse_header(header: &str) -> Option<(&str, &str)> {
    let (name, value) = header.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

pub fn format_message(message: &Message) -> String {
    match message {
        Message::Text(_) => match message.as_text() {
            Some(text) => text.to_string(),
            None => format!("{} {} bytes", "[invalid utf-8]".red(), message.payload().len()),
        },
        Message::Binary(data) => format!("{} {}", "[binary]".cyan(), hex(data)),
    }
}

/// Renders an inbound event for the terminal.
pub fn format_event(event: &Event) -> String {
    match event {
        Event::Message(message) => format!("{} {}", "<".green(), format_message(message)),
        Event::Ping(data) => format!("{} {}", "< ping".dimmed(), String::from_utf8_lossy(data)),
        Event::Pong(data) => format!("{} {}", "< pong".dimmed(), String::from_utf8_lossy(data)),
        Event::Close(Some(code)) => format!("{} ({})", "Server closed".yellow(), code),
        Event::Close(None) => "Server closed".yellow().to_string(),
        Event::Error(e) => format!("{}: {}", "Error".red(), e),
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
