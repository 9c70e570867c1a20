//! Interactive REPL.

use crate::commands::{format_event, read_message_arg};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use wsline_client::Client;
use wsline_core::{Event, Message, WebSocketSender};

const HELP_TEXT: &str = r#"
Lines not starting with '/' are sent as text messages.

Available commands:
  /help                       Show this help
  /binary <text|@file>        Send a binary message
  /ping [payload]             Send a ping
  /close [code] [reason]      Close the connection
  /quit, /exit                Close and exit the REPL
"#;

pub async fn run(client: Client) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "wsline CLI".bold().cyan());
    println!("Connecting to {}...", client.config().url);

    let socket = client.connect().await?;
    println!("{}", "Connected!".green());

    let (sender, mut receiver) = socket.split();

    // Inbound traffic is printed as it arrives, between prompts.
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            let closing = matches!(event, Event::Close(_) | Event::Error(_));
            println!("{}", format_event(&event));
            if closing {
                break;
            }
        }
        println!("{}", "Disconnected.".dimmed());
    });

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".wsline_history"))
        .unwrap_or_else(|_| ".wsline_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type '/help' for available commands.\n");

    loop {
        if printer.is_finished() {
            break;
        }

        let prompt = format!("{} ", "wsline>".cyan());
        // Blocks this worker only; the printer and socket driver run on others.
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                match execute_repl_command(&sender, &line).await {
                    Ok(Some(output)) => {
                        if !output.is_empty() {
                            println!("{}", output);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = sender.close().await;
    drop(sender);
    let _ = printer.await;

    Ok(())
}

async fn execute_repl_command(
    sender: &WebSocketSender,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let Some(command) = line.strip_prefix('/') else {
        sender.send(Message::text(line)).await?;
        return Ok(Some(String::new()));
    };

    let (cmd, rest) = match command.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (command, ""),
    };

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "binary" | "b" => {
            if rest.is_empty() {
                return Ok(Some("Usage: /binary <text|@file>".to_string()));
            }
            let data = read_message_arg(rest)?;
            let len = data.len();
            sender.send(Message::binary(data)).await?;
            Ok(Some(format!("{} {} bytes", "> binary".dimmed(), len)))
        }

        "ping" => {
            sender.ping(rest.to_string()).await?;
            Ok(Some(String::new()))
        }

        "close" => {
            let (code, reason) = match rest.split_once(char::is_whitespace) {
                Some((code, reason)) => (code, reason.trim()),
                None => (rest, ""),
            };
            if code.is_empty() {
                sender.close().await?;
            } else {
                sender.close_with(code.parse()?, reason).await?;
            }
            Ok(None)
        }

        _ => Ok(Some(format!(
            "Unknown command: /{}. Type '/help' for help.",
            cmd
        ))),
    }
}
