use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
use crate::cli::{Action, Cli};

use qrescore::ResourceLibrary;

fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("qres: {message}");
            ExitCode::FAILURE
        }
    }
}

fn install_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut lib = ResourceLibrary::open(&cli.file).map_err(|e| e.to_string())?;
    let version = lib.header().map(|h| h.version).unwrap_or(3);

    match &cli.action {
        Action::Header => {
            let header = lib.header().expect("an opened library always has a header");
            println!("version: {}", header.version);
            println!("tree_offset: {}", header.tree_offset);
            println!("data_offset: {}", header.data_offset);
            println!("names_offset: {}", header.names_offset);
            if header.version >= 3 {
                println!("overall_flags: {:#06x}", header.overall_flags);
            }
            Ok(())
        }
        Action::Entries => {
            for entry in lib.entries().into_iter().flatten() {
                if entry.is_dir {
                    let (first_child, child_count) = entry.dir_payload.unwrap_or((0, 0));
                    println!(
                        "{:>5} dir  {:08x} {:<24} children={first_child}..{}",
                        entry.index,
                        entry.name_hash,
                        entry.name,
                        first_child + child_count
                    );
                } else {
                    println!(
                        "{:>5} file {:08x} {:<24} flags={:#06x} data_offset={}",
                        entry.index,
                        entry.name_hash,
                        entry.name,
                        entry.flags,
                        entry.file_data_offset.unwrap_or(0)
                    );
                }
            }
            Ok(())
        }
        Action::Names => {
            let names = lib.names().transpose().map_err(|e| e.to_string())?;
            for record in names.into_iter().flatten() {
                println!("{:>8} {:08x} {}", record.offset, record.hash, record.name);
            }
            Ok(())
        }
        Action::Tree => {
            let mut out = String::new();
            lib.print_tree(&mut out).expect("writing to a String cannot fail");
            print!("{out}");
            Ok(())
        }
        Action::Ls { path } => {
            let entries = lib.ls(path).map_err(|e| e.to_string())?;
            for entry in entries {
                println!("{entry}");
            }
            Ok(())
        }
        Action::Cat { path } => {
            let bytes = lib.cat(path).map_err(|e| e.to_string())?;
            io::stdout().write_all(&bytes).map_err(|e| e.to_string())
        }
        Action::Rm { path } => {
            lib.rm(path).map_err(|e| e.to_string())?;
            emit(&lib, version)
        }
        Action::Mv { source, dest } => {
            lib.mv(source, dest).map_err(|e| e.to_string())?;
            emit(&lib, version)
        }
        Action::Add { host_file, dest } => {
            let payload = fs::read(host_file).map_err(|e| e.to_string())?;
            let name = host_file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| format!("not a valid file name: {}", host_file.display()))?;
            lib.add(name, dest, payload).map_err(|e| e.to_string())?;
            emit(&lib, version)
        }
        Action::Repack => emit(&lib, version),
    }
}

fn emit<R: qrescore::bin::ByteSource + Send + 'static>(
    lib: &ResourceLibrary<R>,
    version: u32,
) -> Result<(), String> {
    let mut out = io::stdout();
    lib.save(&mut out, version).map_err(|e| e.to_string())
}
