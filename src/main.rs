use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use keg::download::{HttpDownloader, ProgressObserver};
use keg::resolver::{ApiResolver, ChainResolver, FormulaResolver, TapResolver};
use keg::runner::SystemRunner;
use keg::{cellar, symlink};
use keg::{Config, Installer, KegError, Options};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keg")]
#[command(author, version, about = "A Homebrew-compatible package installer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install formulae
    Install {
        /// Formula names
        formulae: Vec<String>,

        /// Build from source even when a bottle exists
        #[arg(short = 's', long)]
        build_from_source: bool,

        /// Use a bottle even when a source build was requested
        #[arg(long)]
        force_bottle: bool,

        /// Skip installing dependencies
        #[arg(long)]
        ignore_dependencies: bool,

        /// Install only the dependencies, not the formula itself
        #[arg(long)]
        only_dependencies: bool,

        /// Also install test dependencies
        #[arg(long)]
        include_test: bool,

        /// Install the HEAD (development) version
        #[arg(long = "HEAD")]
        head: bool,

        /// Keep temporary build files and downloaded archives
        #[arg(long)]
        keep_tmp: bool,

        /// Build with debug symbols
        #[arg(long)]
        debug_symbols: bool,

        /// Reinstall even if already installed
        #[arg(short, long)]
        force: bool,

        /// Show what would be installed without doing it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Treat size mismatches during verification as errors
        #[arg(long)]
        strict: bool,

        /// Compiler to use for source builds (sets CC/CXX)
        #[arg(long, value_name = "COMPILER")]
        cc: Option<String>,
    },

    /// List installed formulae
    List {
        /// Show all installed versions
        #[arg(long)]
        versions: bool,
    },

    /// Show information about a formula
    Info {
        /// Formula name
        formula: String,
    },

    /// Uninstall formulae
    Uninstall {
        /// Formula names
        formulae: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {e}", "Error:".red().bold());
        if let Some(keg_err) = e.downcast_ref::<KegError>() {
            for suggestion in keg_err.suggestions() {
                eprintln!("  {} {suggestion}", "hint:".yellow());
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::detect();

    match cli.command {
        Commands::Install {
            formulae,
            build_from_source,
            force_bottle,
            ignore_dependencies,
            only_dependencies,
            include_test,
            head,
            keep_tmp,
            debug_symbols,
            force,
            dry_run,
            strict,
            cc,
        } => {
            if formulae.is_empty() {
                anyhow::bail!("no formulae given");
            }
            let options = Options {
                build_from_source,
                force_bottle,
                ignore_dependencies,
                only_dependencies,
                include_test,
                head_only: head,
                keep_tmp,
                debug_symbols,
                force,
                dry_run,
                verbose: cli.verbose,
                strict_verification: strict,
                compiler: cc,
            };
            install(&config, options, &formulae)
        }
        Commands::List { versions } => list(&config, versions),
        Commands::Info { formula } => info(&config, &formula),
        Commands::Uninstall { formulae } => uninstall(&config, &formulae),
    }
}

fn build_resolver(config: &Config) -> keg::Result<ChainResolver> {
    Ok(ChainResolver::new(
        Some(ApiResolver::new()?),
        TapResolver::new(config),
    ))
}

fn install(config: &Config, options: Options, formulae: &[String]) -> anyhow::Result<()> {
    let resolver = build_resolver(config)?;
    let downloader = HttpDownloader::new()?;
    // Stream build output when verbose; capture and surface on failure otherwise
    let runner = SystemRunner::new(options.verbose);

    let installer = Installer::new(
        config,
        options,
        Box::new(resolver),
        Box::new(downloader),
        Box::new(runner),
    )
    .with_observer(Box::new(BarObserver::new()));

    let mut failed = false;
    for name in formulae {
        match installer.install(name) {
            Ok(result) => {
                println!(
                    "{} {} {} ({}, {:.1}s)",
                    "Installed".green().bold(),
                    result.name.bold(),
                    result.version,
                    result.source.as_str(),
                    result.elapsed.as_secs_f64()
                );
            }
            Err(e) => {
                failed = true;
                eprintln!("{} {name}: {e}", "Error:".red().bold());
                for suggestion in e.suggestions() {
                    eprintln!("  {} {suggestion}", "hint:".yellow());
                }
            }
        }
    }
    if failed {
        anyhow::bail!("some installs failed");
    }
    Ok(())
}

fn list(config: &Config, versions: bool) -> anyhow::Result<()> {
    let mut kegs = cellar::list_installed(config)?;
    kegs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut last_name = String::new();
    for keg in kegs {
        if versions {
            println!("{} {}", keg.name.bold(), keg.version);
        } else if keg.name != last_name {
            println!("{}", keg.name);
            last_name = keg.name;
        }
    }
    Ok(())
}

fn info(config: &Config, name: &str) -> anyhow::Result<()> {
    let resolver = build_resolver(config)?;
    let formula = resolver.resolve(name)?;

    println!("{} {}", formula.name.bold(), formula.version.green());
    if let Some(desc) = &formula.desc {
        println!("{desc}");
    }
    if let Some(homepage) = &formula.homepage {
        println!("{}", homepage.blue().underline());
    }
    if let Some(license) = &formula.license {
        println!("License: {license}");
    }
    if !formula.dependencies.is_empty() {
        println!("Dependencies: {}", formula.dependencies.join(", "));
    }
    if formula.keg_only {
        println!("{}", "Keg-only: not linked into the prefix".yellow());
    }

    match cellar::installed_versions(config, &formula.name) {
        Ok(kegs) if !kegs.is_empty() => {
            for keg in kegs {
                let source = keg
                    .receipt
                    .as_ref()
                    .map(|r| format!(" (from {})", r.source))
                    .unwrap_or_default();
                println!("Installed: {}{source}", keg.path.display());
            }
        }
        _ => println!("Not installed"),
    }
    Ok(())
}

fn uninstall(config: &Config, formulae: &[String]) -> anyhow::Result<()> {
    if formulae.is_empty() {
        anyhow::bail!("no formulae given");
    }
    for name in formulae {
        let Some(version) = cellar::installed_version(config, name) else {
            eprintln!("{} {name} is not installed", "Error:".red().bold());
            continue;
        };
        symlink::unlink_keg(config, name, &version)?;
        cellar::remove_keg(config, name, &version)?;
        println!("{} {} {}", "Uninstalled".green().bold(), name.bold(), version);
    }
    Ok(())
}

/// Progress bar driven by downloader callbacks.
struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl ProgressObserver for BarObserver {
    fn on_progress(&self, bytes_read: u64, total: Option<u64>) {
        if self.bar.is_hidden() {
            self.bar
                .set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
        if let Some(total) = total {
            self.bar.set_length(total);
        }
        self.bar.set_position(bytes_read);
    }
}
