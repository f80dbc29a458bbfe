use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Axon LLM client
#[derive(Debug, Parser)]
#[command(name = "axon", about = "Talk to any configured LLM provider")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "axon.toml", env = "AXON_CONFIG")]
    pub config: PathBuf,

    /// Configured client to use (defaults to the first one)
    #[arg(long, env = "AXON_CLIENT")]
    pub client: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a chat completion
    Chat {
        /// User message
        prompt: String,

        /// System message sent before the prompt
        #[arg(long)]
        system: Option<String>,

        /// Print tokens as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Generate images
    Image {
        /// Image description
        prompt: String,

        /// Image dimensions, e.g. 1024x1024
        #[arg(long)]
        size: Option<String>,

        /// Number of images
        #[arg(short, long, default_value_t = 1)]
        n: u32,

        /// Return base64 data instead of URLs
        #[arg(long)]
        b64: bool,
    },

    /// Synthesize speech into a file
    Speech {
        /// Text to speak
        input: String,

        /// Voice preset
        #[arg(long, default_value = "alloy")]
        voice: String,

        /// Output file
        #[arg(short, long, default_value = "speech.mp3")]
        output: PathBuf,
    },
}
