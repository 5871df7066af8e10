use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;
use wilower::dispatch::local_ids::{rounded_simd_width, thread_stride};
use wilower::dispatch::{DispatchField, DISPATCH_BUFFER_SIZE, IMPLICIT_ARGS_VERSION};
use wilower::{Module, PlatformConfig};

#[derive(Parser)]
#[command(
    name = "wilower",
    version,
    about = "Lower GPU work-item queries to hidden arguments or dispatch-buffer reads"
)]
struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG applies otherwise
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Textual listing
    Text,
    /// JSON module, readable by `lower` and `print`
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Lower every work-item query of a module
    Lower {
        /// Input module (.json)
        input: PathBuf,
        /// Platform name (xe-lp, xe-hpc) or path to a platform .toml
        #[arg(long, default_value = "xe-lp")]
        platform: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Emit::Text)]
        emit: Emit,
    },
    /// Print the textual listing of a module
    Print {
        /// Input module (.json)
        input: PathBuf,
    },
    /// Show the dispatch side-buffer layout and local-id table strides
    Layout,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Lower {
            input,
            platform,
            output,
            emit,
        } => cmd_lower(&input, &platform, output, emit),
        Command::Print { input } => cmd_print(&input),
        Command::Layout => cmd_layout(),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_module(input: &Path) -> Module {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", input.display(), e);
            process::exit(1);
        }
    };
    match wilower::parse_module(&source) {
        Ok(module) => module,
        Err(diag) => {
            diag.render(&input.display().to_string(), &source);
            process::exit(1);
        }
    }
}

fn cmd_lower(input: &Path, platform: &str, output: Option<PathBuf>, emit: Emit) {
    let platform = match PlatformConfig::from_arg(platform) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!(
                "help: built-in platforms: {}",
                wilower::config::BUILTIN_PLATFORMS.join(", ")
            );
            process::exit(1);
        }
    };
    let mut module = load_module(input);
    tracing::debug!(platform = %platform.name, functions = module.functions.len(), "lowering");

    let stats = match wilower::lower_and_report(&mut module, &platform) {
        Ok(stats) => stats,
        Err(_) => process::exit(1),
    };

    let rendered = match emit {
        Emit::Text => module.to_string(),
        Emit::Json => match serde_json::to_string_pretty(&module) {
            Ok(json) => json + "\n",
            Err(e) => {
                eprintln!("error: cannot serialize module: {}", e);
                process::exit(1);
            }
        },
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
            let total: usize = stats.iter().map(|s| s.total()).sum();
            eprintln!(
                "Lowered {} queries in {} functions ({}) -> {}",
                total,
                stats.len(),
                platform.display_name,
                path.display()
            );
        }
        None => print!("{}", rendered),
    }
}

fn cmd_print(input: &Path) {
    let module = load_module(input);
    print!("{}", module);
}

fn cmd_layout() {
    println!(
        "dispatch side buffer (version {}, {} bytes)",
        IMPLICIT_ARGS_VERSION, DISPATCH_BUFFER_SIZE
    );
    println!("  {:<20} {:>6} {:>6}", "field", "offset", "width");
    for field in DispatchField::ALL {
        println!(
            "  {:<20} {:>6} {:>6}",
            field.name(),
            field.offset(),
            field.width()
        );
    }
    println!();
    println!("local-id table");
    println!("  {:<6} {:>8} {:>14}", "simd", "lanes", "thread stride");
    for simd in [8, 16, 32] {
        println!(
            "  {:<6} {:>8} {:>14}",
            simd,
            rounded_simd_width(simd),
            thread_stride(simd)
        );
    }
}
