use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "qres", about = "inspect and edit qres resource containers")]
pub struct Cli {
    /// Container file to operate on.
    pub file: PathBuf,

    #[command(subcommand)]
    pub action: Action,

    /// Enable verbose logging (equivalent to RUST_LOG=debug).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Action {
    /// Dump version and section offsets.
    Header,
    /// Walk the tree linearly and dump each entry's fields.
    Entries,
    /// Walk the names section and dump offsets and names.
    Names,
    /// Pretty-print the tree.
    Tree,
    /// List children of a directory.
    Ls {
        #[arg(default_value = ":/")]
        path: String,
    },
    /// Write a file's body to stdout.
    Cat { path: String },
    /// Remove an entry; emits the rewritten container to stdout.
    Rm { path: String },
    /// Move an entry into a directory; emits the rewritten container to stdout.
    Mv { source: String, dest: String },
    /// Insert a host file into a directory; emits the rewritten container to stdout.
    Add { host_file: PathBuf, dest: String },
    /// Re-emit the container unchanged.
    Repack,
}
