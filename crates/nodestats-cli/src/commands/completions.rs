//! Shell completion generation.
//!
//! ```bash
//! # Bash (add to ~/.bashrc)
//! eval "$(nodestats completions bash)"
//!
//! # Fish
//! nodestats completions fish > ~/.config/fish/completions/nodestats.fish
//! ```

use std::io;

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{Shell, generate};

use crate::Cli;

#[derive(Args, Clone, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: &CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "nodestats", &mut io::stdout());
    Ok(())
}
