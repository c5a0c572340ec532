// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use palaver::auth::{is_well_formed_token, AuthError, FileTokenStore, SessionAuth};
use palaver::budget::{TokenBudget, TokenEstimator};
use palaver::client::ChatClient;
use palaver::message::{ChatMessage, Role};
use palaver::stream::{StreamEvent, StreamFailure};

use std::io::Write as _;
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(name = "palaver", about = "Streaming chat client")]
struct Cli {
    /// Backend base URL
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "PALAVER_BASE_URL")]
    base_url: String,

    /// Model name sent with completion requests
    #[arg(long, default_value = "local-llm", env = "PALAVER_MODEL")]
    model: String,

    /// File holding the persisted session token
    #[arg(long, default_value = "palaver.token", env = "PALAVER_TOKEN_FILE")]
    token_file: String,

    /// Adopt this token for the session (overrides the persisted one)
    #[arg(long, env = "PALAVER_TOKEN")]
    login: Option<String>,

    /// Save the exchange to a new conversation on the backend
    #[arg(long)]
    save: bool,

    /// The prompt to send
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let session = SessionAuth::new(FileTokenStore::new(&cli.token_file));

    if let Some(token) = &cli.login {
        if !is_well_formed_token(token) {
            eprintln!("error: the provided token is not a well-formed JWT");
            std::process::exit(1);
        }
        if let Err(e) = session.login(token.clone()) {
            eprintln!("error: could not persist the token: {e}");
            std::process::exit(1);
        }
        tracing::info!("token adopted for this session");
    } else {
        match session.restore() {
            Ok(true) => {}
            Ok(false) => {
                eprintln!(
                    "error: no session found; pass --login <token> or set PALAVER_TOKEN"
                );
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("error: could not read the token store: {e}");
                std::process::exit(1);
            }
        }
    }

    // Re-check the store right before acting on the credential.
    if let Err(e) = session.check_integrity() {
        match e {
            AuthError::Tampered => {
                eprintln!("error: the stored token changed behind this session; logged out");
            }
            other => eprintln!("error: {other}"),
        }
        std::process::exit(1);
    }

    let token = session.token().expect("session restored above");

    let client = ChatClient::new(&cli.base_url);

    if let Err(e) = client.verify_token(&token).await {
        if e.is_auth() {
            eprintln!("error: {e}");
            if let Err(e) = session.logout() {
                tracing::warn!(error = %e, "could not clear the rejected token");
            }
        } else {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }

    let prompt = if cli.prompt.is_empty() {
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err() || input.trim().is_empty() {
            eprintln!("error: no prompt given");
            std::process::exit(1);
        }
        input.trim().to_string()
    } else {
        cli.prompt.join(" ")
    };

    let messages = vec![ChatMessage::text(Role::User, &prompt)];

    // Budget gate: refuse before the backend does.
    let budget = TokenBudget::new(client.clone());
    let estimator = TokenEstimator::new();
    let gauge = budget.gauge(estimator.estimate_messages(&messages)).await;
    tracing::debug!(
        total = gauge.total,
        percent = gauge.percent,
        status = ?gauge.status,
        "input budget"
    );
    if gauge.blocks_submission() {
        eprintln!(
            "error: prompt is an estimated {} tokens, {}% of the input budget",
            gauge.total, gauge.percent
        );
        std::process::exit(1);
    }

    let mut stream = match client.stream_chat(&token, &cli.model, &messages).await {
        Ok(stream) => stream,
        Err(e) => {
            if e.is_auth() {
                let _ = session.logout();
            }
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let mut reply = String::new();
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Fragment(text) => {
                print!("{text}");
                let _ = stdout.flush();
                reply.push_str(&text);
            }
            StreamEvent::Done => break,
            StreamEvent::Failed(StreamFailure(reason)) => {
                eprintln!("\nerror: stream failed: {reason}");
                std::process::exit(1);
            }
        }
    }
    println!();

    if cli.save {
        save_exchange(&client, &token, &cli.model, &prompt, &reply).await;
    }
}

/// Persist the exchange as a new conversation. Failures are logged,
/// never fatal: the reply was already shown.
async fn save_exchange(client: &ChatClient, token: &str, model: &str, prompt: &str, reply: &str) {
    let title: String = prompt.chars().take(48).collect();
    let conversation = match client.create_conversation(token, &title, model).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "could not create the conversation");
            return;
        }
    };
    for (role, content) in [(Role::User, prompt), (Role::Assistant, reply)] {
        if let Err(e) = client
            .save_message(token, conversation.id, role, content)
            .await
        {
            tracing::warn!(error = %e, "could not save a message");
            return;
        }
    }
    tracing::info!(conversation_id = conversation.id, "exchange saved");
}
