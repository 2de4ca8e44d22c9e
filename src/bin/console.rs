//! Terminal chat with Docteur Analyste.
//! Run with: cargo run --bin docteur-console
//!
//! Commands: `/nouvelle` starts over, `/suggestions` lists the follow-ups,
//! `/s <n>` asks follow-up `n`, `/quitter` exits.

use std::io::Write;

use anyhow::Context;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use docteur_analyste::assistant::agent::{AgentInvoker, EventSink, TurnEvent};
use docteur_analyste::assistant::core::config::AnalystConfig;
use docteur_analyste::assistant::core::ids::SessionId;
use docteur_analyste::assistant::pipeline::ChatSession;
use docteur_analyste::server::state::connect;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Quit,
    Reset,
    ListSuggestions,
    Suggestion(usize),
    Ask(String),
    Nothing,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Nothing;
        }
        if !line.starts_with('/') {
            return Self::Ask(line.to_string());
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("/quitter" | "/q"), None) => Self::Quit,
            (Some("/nouvelle"), None) => Self::Reset,
            (Some("/suggestions"), None) => Self::ListSuggestions,
            (Some("/s"), Some(n)) => match n.parse::<usize>() {
                Ok(n) if n >= 1 => Self::Suggestion(n - 1),
                _ => Self::Unknown(line.to_string()),
            },
            _ => Self::Unknown(line.to_string()),
        }
    }
}

enum Input {
    Text(String),
    Suggestion(usize),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let config = AnalystConfig::load().context("chargement de la configuration")?;
    let invoker = connect(&config)
        .await
        .context("connexion aux services impossible")?;
    let mut session = ChatSession::from_config(SessionId::new(), &config);

    print_history(&session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Nothing => {}
            Command::Reset => {
                session.new_conversation();
                print_history(&session);
            }
            Command::ListSuggestions => print_suggestions(session.suggestions()),
            Command::Suggestion(index) => {
                ask(&mut session, &invoker, Input::Suggestion(index)).await?;
            }
            Command::Ask(text) => ask(&mut session, &invoker, Input::Text(text)).await?,
            Command::Unknown(raw) => {
                eprintln!("Commande inconnue : {raw} (/nouvelle, /suggestions, /s <n>, /quitter)");
            }
        }
    }
    Ok(())
}

async fn ask(session: &mut ChatSession, invoker: &AgentInvoker, input: Input) -> anyhow::Result<()> {
    let (sink, mut stream) = EventSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event {
                TurnEvent::Status(step) => eprintln!("… {}", step.label()),
                TurnEvent::SqlIssued(_) => {}
                TurnEvent::Fragment(piece) => {
                    print!("{piece}");
                    let _ = std::io::stdout().flush();
                }
                TurnEvent::Completed(outcome) => {
                    println!();
                    print_suggestions(&outcome.suggestions);
                }
            }
        }
    });

    let result = match input {
        Input::Text(text) => session.submit(invoker, &text, &sink).await,
        Input::Suggestion(index) => session.submit_suggestion(invoker, index, &sink).await,
    };
    drop(sink);
    printer.await.context("affichage de la réponse")?;

    if let Err(err) = result {
        eprintln!("{err}");
    }
    Ok(())
}

fn print_history(session: &ChatSession) {
    for turn in session.rendered_history() {
        println!("[{}] {}", turn.role, turn.content);
    }
}

fn print_suggestions(suggestions: &[String]) {
    println!("Suggestions :");
    for (i, suggestion) in suggestions.iter().enumerate() {
        println!("  {}. {suggestion}", i + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/quitter"), Command::Quit);
        assert_eq!(Command::parse(" /nouvelle "), Command::Reset);
        assert_eq!(Command::parse("/suggestions"), Command::ListSuggestions);
        assert_eq!(Command::parse("/s 2"), Command::Suggestion(1));
        assert_eq!(Command::parse("/s 0"), Command::Unknown("/s 0".to_string()));
        assert_eq!(Command::parse(""), Command::Nothing);
        assert_eq!(
            Command::parse("Combien d'hospitalisations ?"),
            Command::Ask("Combien d'hospitalisations ?".to_string())
        );
    }
}
