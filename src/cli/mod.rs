//! CLI command parsing and execution.

pub mod chat;
pub mod render;

use clap::{Parser, Subcommand};

use crate::core::tools::Preset;

/// Portal Assist - streaming chat client and inference proxy.
#[derive(Parser)]
#[command(name = "portal-assist")]
#[command(about = "Streaming chat client and inference proxy for the admin portal assistant")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Model to chat with.
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Request extended thinking.
    #[arg(short, long, global = true)]
    pub reasoning: bool,

    /// Tool to enable (repeatable).
    #[arg(short, long = "tool", global = true)]
    pub tools: Vec<String>,

    /// Enable a preset bundle of tools.
    #[arg(short, long, value_enum, global = true)]
    pub preset: Option<Preset>,

    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat.
    #[command(visible_alias = "c")]
    Chat,

    /// Ask a single question and stream the answer.
    #[command(visible_alias = "a")]
    Ask {
        /// The question to ask.
        prompt: String,
    },

    /// Start the inference proxy server.
    Serve {
        /// Host to bind to.
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to.
        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// List available tools and presets.
    Tools,

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration.
    Show,

    /// Show the configuration file path.
    Path,
}
