//! Chat client commands.

use std::future::Future;
use std::io::{IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chat_core::{ChatOptions, ChatSession, HttpTransport, Role, ToolRef, TurnOutcome};
use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Cli;
use super::render::TurnPrinter;
use crate::config::Config;
use crate::core::tools::{self, HEROKU_TOOLS, McpServer, Preset};

/// Model and tool choices from the command line.
#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    pub model: Option<String>,
    pub reasoning: bool,
    pub tools: Vec<String>,
    pub preset: Option<Preset>,
}

impl From<&Cli> for ChatArgs {
    fn from(cli: &Cli) -> Self {
        Self {
            model: cli.model.clone(),
            reasoning: cli.reasoning,
            tools: cli.tools.clone(),
            preset: cli.preset,
        }
    }
}

impl ChatArgs {
    /// Whether resolving these choices requires the MCP server listing.
    #[must_use]
    pub fn needs_mcp(&self) -> bool {
        self.preset.is_some_and(Preset::uses_mcp)
            || self
                .tools
                .iter()
                .any(|name| !HEROKU_TOOLS.iter().any(|tool| tool.id == name.as_str()))
    }
}

/// Resolve request options from config and command-line choices.
///
/// Extended thinking is dropped when tools are selected or the model does not
/// support it.
#[must_use]
pub fn chat_options(config: &Config, args: &ChatArgs, mcp: &[ToolRef]) -> ChatOptions {
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.chat.model.clone());

    let mut selected = args.preset.map(|preset| preset.tools(mcp)).unwrap_or_default();
    selected.extend(tools::resolve(&args.tools, mcp));
    let tools = tools::dedup(selected);

    let supported = match config.chat_model(&model) {
        Some(entry) => entry.reasoning,
        None => {
            tracing::warn!(model = %model, "model is not configured for chat");
            false
        }
    };

    let mut reasoning = args.reasoning || config.chat.reasoning;
    if reasoning && !tools.is_empty() {
        tracing::warn!("extended thinking is disabled while tools are selected");
        reasoning = false;
    } else if reasoning && !supported {
        tracing::warn!(model = %model, "model does not support extended thinking");
        reasoning = false;
    }

    ChatOptions {
        model,
        reasoning,
        tools,
        history_limit: config.chat.history_limit,
    }
}

/// Fetch MCP tools through the proxy's `/api/mcp-servers` route.
///
/// # Errors
///
/// Returns error if the endpoint is invalid or the listing cannot be fetched.
pub async fn fetch_mcp_tools(config: &Config) -> Result<Vec<ToolRef>> {
    let url = reqwest::Url::parse(&config.chat.endpoint)
        .context("Invalid chat endpoint")?
        .join("/api/mcp-servers")?;

    let mut request = reqwest::Client::new().get(url);
    if let Some(token) = &config.api.token {
        request = request.bearer_auth(token);
    }

    let servers: Vec<McpServer> = request
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("Failed to parse MCP server listing")?;

    Ok(tools::mcp_tool_refs(&servers))
}

async fn mcp_tools_for(config: &Config, args: &ChatArgs) -> Vec<ToolRef> {
    if !args.needs_mcp() {
        return Vec::new();
    }

    match fetch_mcp_tools(config).await {
        Ok(tools) => tools,
        Err(e) => {
            tracing::warn!(error = %e, "MCP tools unavailable");
            Vec::new()
        }
    }
}

/// Build a chat session against the configured endpoint.
///
/// # Errors
///
/// Returns error if the chat endpoint is empty.
pub async fn session(config: &Config, args: &ChatArgs) -> Result<ChatSession> {
    let mcp = mcp_tools_for(config, args).await;
    let options = chat_options(config, args, &mcp);

    let mut transport = HttpTransport::new(config.chat.endpoint.clone())?;
    if let Some(token) = &config.api.token {
        transport = transport.with_token(token.clone());
    }

    tracing::info!(
        endpoint = %config.chat.endpoint,
        model = %options.model,
        reasoning = options.reasoning,
        tools = options.tools.len(),
        "chat session ready"
    );

    Ok(ChatSession::new(Arc::new(transport), options))
}

/// Drive one turn, printing updates as they arrive. Ctrl-C stops the turn.
async fn run_turn<F>(session: &ChatSession, start: usize, turn: F) -> Result<TurnOutcome>
where
    F: Future<Output = TurnOutcome>,
{
    let mut updates = session.subscribe();
    let mut updates_open = true;
    let mut stopping = false;

    let mut stdout = std::io::stdout();
    let mut printer = TurnPrinter::new(start, stdout.is_terminal());

    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            changed = updates.changed(), if updates_open => {
                if changed.is_err() {
                    updates_open = false;
                    continue;
                }
                let messages = updates.borrow_and_update().messages.clone();
                printer.render(&messages, &mut stdout)?;
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                session.stop();
            }
        }
    };

    printer.finish(&session.messages(), &mut stdout)?;
    Ok(outcome)
}

fn report(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Failed(error) => eprintln!(
            "{} {} (type /retry to try again)",
            "error:".red().bold(),
            error.message
        ),
        TurnOutcome::Stopped => eprintln!("{}", "(stopped)".dark_grey()),
        TurnOutcome::Completed | TurnOutcome::Skipped => {}
    }
}

/// Ask a single question and stream the answer to stdout.
///
/// # Errors
///
/// Returns error if the turn fails.
pub async fn ask(config: &Config, args: &ChatArgs, prompt: &str) -> Result<()> {
    let session = session(config, args).await?;
    session.set_input(prompt);

    let start = session.messages().len() + 1;
    match run_turn(&session, start, session.handle_submit()).await? {
        TurnOutcome::Failed(error) => anyhow::bail!(error.message),
        TurnOutcome::Skipped => anyhow::bail!("Nothing to ask"),
        TurnOutcome::Completed | TurnOutcome::Stopped => Ok(()),
    }
}

/// Interactive chat on stdin.
///
/// # Errors
///
/// Returns error if reading input or writing output fails.
pub async fn interactive(config: &Config, args: &ChatArgs) -> Result<()> {
    let session = session(config, args).await?;
    let options = session.options();

    println!(
        "Chatting with {}. Commands: /retry, /clear, /quit",
        options.model.as_str().bold()
    );
    if !options.tools.is_empty() {
        let names: Vec<&str> = options.tools.iter().map(|tool| tool.name.as_str()).collect();
        println!("Tools: {}", names.join(", "));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", ">".cyan().bold());
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else {
            println!();
            break;
        };

        let outcome = match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("Conversation cleared.");
                continue;
            }
            "/retry" => {
                let messages = session.messages();
                let Some(last_user) = messages.iter().rposition(|m| m.role == Role::User) else {
                    println!("Nothing to retry.");
                    continue;
                };
                run_turn(&session, last_user + 1, session.reload()).await?
            }
            text => {
                session.set_input(text);
                let start = session.messages().len() + 1;
                run_turn(&session, start, session.handle_submit()).await?
            }
        };

        report(&outcome);
    }

    Ok(())
}

/// Print Heroku tools, presets, and MCP tools reachable through the proxy.
///
/// # Errors
///
/// Returns error if writing output fails.
pub async fn list_tools(config: &Config) -> Result<()> {
    println!("{}", "Heroku tools".bold());
    for tool in HEROKU_TOOLS {
        println!("  {:<28} {}", tool.id, tool.label);
    }

    println!();
    println!("{}", "Presets".bold());
    for preset in Preset::ALL {
        println!(
            "  {:<28} {}: {}",
            preset.id(),
            preset.label(),
            preset.description()
        );
    }

    println!();
    match fetch_mcp_tools(config).await {
        Ok(mcp) if mcp.is_empty() => println!("No MCP tools available."),
        Ok(mcp) => {
            println!("{}", "MCP tools".bold());
            for tool in &mcp {
                println!(
                    "  {:<28} {}",
                    tool.name,
                    tool.description.as_deref().unwrap_or_default()
                );
            }
        }
        Err(e) => {
            tracing::debug!(error = ?e, "MCP listing failed");
            println!("MCP tools unavailable: {e}");
        }
    }

    std::io::stdout().flush()?;
    Ok(())
}
