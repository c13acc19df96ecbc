//! Dagsmith CLI - compile YAML workflow specifications

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use dagsmith::{CompileError, FixSuggestion, WorkflowCompiler, WorkflowSummary};

#[derive(Parser)]
#[command(name = "dagsmith")]
#[command(about = "Compiler for declarative YAML workflow specifications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a specification and write the engine manifest
    Generate {
        /// Path to the YAML specification file
        spec: PathBuf,

        /// Output directory for the generated manifest
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Validate and show the summary without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Structurally validate a specification (no operator resolution)
    Validate {
        /// Path to the YAML specification file
        spec: PathBuf,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the built-in operator registry
    Operators,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            spec,
            output,
            dry_run,
            verbose,
        } => generate(&spec, output, dry_run, verbose),
        Commands::Validate { spec, verbose } => validate(&spec, verbose),
        Commands::Operators => {
            list_operators();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn generate(
    spec: &Path,
    output: Option<PathBuf>,
    dry_run: bool,
    verbose: bool,
) -> Result<(), CompileError> {
    let compiler = WorkflowCompiler::new();
    let compiled = compiler.compile_file(spec)?;

    if verbose || dry_run {
        print_summary(&compiled.summary);
    }

    if dry_run {
        println!("{} specification is valid", "✓".green());
        return Ok(());
    }

    let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&output_dir)?;
    let output_file = output_dir.join(format!("{}.json", compiled.summary.dag_id));

    let manifest = serde_json::to_string_pretty(&compiled.manifest())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&output_file, manifest)?;

    println!(
        "{} manifest written: {}",
        "✓".green(),
        output_file.display()
    );
    Ok(())
}

fn validate(spec: &Path, verbose: bool) -> Result<(), CompileError> {
    let summary = WorkflowCompiler::new().check_file(spec)?;

    println!(
        "{} workflow '{}' is valid ({} tasks)",
        "✓".green(),
        summary.dag_id,
        summary.task_count
    );
    if verbose {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &WorkflowSummary) {
    println!("{}", "Workflow summary:".cyan().bold());
    println!("  DAG ID: {}", summary.dag_id);
    println!("  Tasks: {}", summary.task_count);
    let operators: Vec<String> = summary
        .operators
        .iter()
        .map(|(op, count)| {
            if *count > 1 {
                format!("{} x{}", op, count)
            } else {
                op.clone()
            }
        })
        .collect();
    println!("  Operators: {}", operators.join(", "));
    println!("  Max depth: {}", summary.max_depth);
    println!("  Parallel groups: {}", summary.parallel_groups);
    println!(
        "  Dependencies: {}",
        if summary.has_dependencies { "yes" } else { "no" }
    );
}

fn list_operators() {
    let compiler = WorkflowCompiler::new();
    let names = compiler.registry().builtin_names();

    println!("{}", "Built-in operators:".cyan().bold());
    for name in &names {
        println!("  • {}", name);
    }
    println!("\nTotal: {} operators", names.len());
}
