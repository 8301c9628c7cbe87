use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgshield::config::Config;
use pkgshield::output::{self, OutputFormat};
use pkgshield::{Ecosystem, ScanOptions, ShieldError};

const EXIT_CODE_ISSUES_FOUND: i32 = 1;

#[derive(Parser)]
#[command(
    name = "pkgshield",
    about = "Malicious package scanner for PyPI and npm",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan PyPI packages or verify a PyPI project manifest
    Pypi {
        #[command(subcommand)]
        command: EcosystemCommands,
    },

    /// Scan npm packages or verify an npm project manifest
    Npm {
        #[command(subcommand)]
        command: EcosystemCommands,
    },

    /// Generate a starter .pkgshield.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum EcosystemCommands {
    /// Scan a single package (a registry name or a local directory)
    Scan {
        /// Package name on the registry, or path to an extracted tree
        target: String,

        /// Specific version to scan (defaults to the newest release)
        #[arg(long, short = 'v')]
        version: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Scan every dependency resolved from a manifest file
    Verify {
        /// Path to the dependency manifest (e.g. requirements.txt)
        manifest: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// List all available rules
    ListRules,
}

#[derive(Args)]
struct CommonArgs {
    /// Run only these rules (repeatable)
    #[arg(long, short = 'r')]
    rules: Vec<String>,

    /// Run the full catalog except these rules (repeatable)
    #[arg(long, short = 'x')]
    exclude_rules: Vec<String>,

    /// Output format (console, json, sarif)
    #[arg(long, short = 'f', default_value = "console")]
    format: String,

    /// Write output to file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Config file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Exit with a non-zero status code if at least one issue is identified
    #[arg(long)]
    exit_non_zero_on_finding: bool,
}

impl CommonArgs {
    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            config_path: self.config.clone(),
            rules: self.rules.iter().cloned().collect::<BTreeSet<_>>(),
            exclude_rules: self.exclude_rules.iter().cloned().collect::<BTreeSet<_>>(),
        }
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat::from_str_lenient(&self.format).unwrap_or_else(|| {
            eprintln!("Warning: unknown format '{}', using console", self.format);
            OutputFormat::Console
        })
    }

    fn emit(&self, rendered: &str) -> Result<(), ShieldError> {
        match &self.output {
            Some(path) => std::fs::write(path, rendered)?,
            None => print!("{rendered}"),
        }
        Ok(())
    }
}

fn main() {
    // Diagnostics go to stderr; reports stay on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pypi { command } => run_ecosystem(Ecosystem::PyPi, command),
        Commands::Npm { command } => run_ecosystem(Ecosystem::Npm, command),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_ecosystem(
    ecosystem: Ecosystem,
    command: EcosystemCommands,
) -> Result<i32, ShieldError> {
    match command {
        EcosystemCommands::Scan {
            target,
            version,
            common,
        } => cmd_scan(ecosystem, target, version, common),
        EcosystemCommands::Verify { manifest, common } => {
            cmd_verify(ecosystem, manifest, common)
        }
        EcosystemCommands::ListRules => cmd_list_rules(ecosystem),
    }
}

fn cmd_scan(
    ecosystem: Ecosystem,
    target: String,
    version: Option<String>,
    common: CommonArgs,
) -> Result<i32, ShieldError> {
    let options = common.scan_options();
    let (identifier, report) =
        pkgshield::scan_package(ecosystem, &target, version.as_deref(), &options)?;

    let rendered = output::render_package(&identifier, &report, common.output_format())?;
    common.emit(&rendered)?;

    Ok(if common.exit_non_zero_on_finding && report.issues > 0 {
        EXIT_CODE_ISSUES_FOUND
    } else {
        0
    })
}

fn cmd_verify(
    ecosystem: Ecosystem,
    manifest: PathBuf,
    common: CommonArgs,
) -> Result<i32, ShieldError> {
    let options = common.scan_options();
    let outcome = pkgshield::verify_manifest(ecosystem, &manifest, &options)?;

    for diagnostic in &outcome.diagnostics {
        eprintln!("{diagnostic}");
    }

    let rendered = output::render_project(
        &manifest.display().to_string(),
        &outcome.report,
        common.output_format(),
    )?;
    common.emit(&rendered)?;

    Ok(
        if common.exit_non_zero_on_finding && outcome.report.total_issues() > 0 {
            EXIT_CODE_ISSUES_FOUND
        } else {
            0
        },
    )
}

fn cmd_list_rules(ecosystem: Ecosystem) -> Result<i32, ShieldError> {
    let (sourcecode, metadata) = pkgshield::list_rules(ecosystem);

    if !sourcecode.is_empty() {
        println!("Available source code rules:");
        for rule in &sourcecode {
            println!("\t{rule}");
        }
    }
    if !metadata.is_empty() {
        println!("Available metadata rules:");
        for rule in &metadata {
            println!("\t{rule}");
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, ShieldError> {
    let path = PathBuf::from(".pkgshield.toml");

    if path.exists() && !force {
        eprintln!(".pkgshield.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .pkgshield.toml");

    Ok(0)
}
