// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mines co-change coupling from git history", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the git repository to analyze
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Files and developers which change together
    #[arg(long)]
    pub couples: bool,

    /// Functions which change together (Go, Python and Rust sources)
    #[arg(long)]
    pub shotness: bool,

    /// Write the bitcode-encoded report instead of text
    #[arg(long)]
    pub binary: bool,

    /// Write the report to this file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Developer identities: one person per line, aliases separated by `|`
    #[arg(long)]
    pub people_dict: Option<PathBuf>,

    /// Query which selects the structural entities
    #[arg(long)]
    pub shotness_xpath_struct: Option<String>,

    /// Query which resolves the name of each selected entity
    #[arg(long)]
    pub shotness_xpath_name: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Walk every parent of merge commits instead of the first one only
    #[arg(long)]
    pub all_parents: bool,

    /// Increase logging verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge binary reports of several runs into one binary report
    Combine {
        /// Reports written with --binary
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl Args {
    /// Flags of the requested analyses
    pub fn analysis_flags(&self) -> Vec<&'static str> {
        [("couples", self.couples), ("shotness", self.shotness)]
            .into_iter()
            .filter_map(|(flag, on)| on.then_some(flag))
            .collect()
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
