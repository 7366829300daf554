use arazu::deploy::config::{write_template, ConfigFormat, DEFAULT_CONFIG_PATH};
use arazu::deploy::errors::Result;
use arazu::deploy::{
    DeployConfig, DeployError, DeployOptions, Deployer, ErrorClass, Git2Client, ShellRunner,
};
use clap::{Parser, Subcommand};
use log::{error, LevelFilter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Run your build and push its output to a deploy branch.
#[derive(Parser)]
#[command(name = "arazu", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config template to fill in
    Init {
        /// Template syntax; toml writes arazu.toml instead of arazu.yaml
        #[arg(long, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,
    },
    /// Build, commit the build output and push it to the deploy branch
    ///
    /// Interrupting a deploy can leave its temporary deploy folder behind;
    /// remove it by hand.
    Deploy {
        /// Path to the config file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Run everything except the push. The deploy folder is kept and must
        /// be deleted by hand afterwards
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    init_logger(args.quiet, args.verbose);

    let outcome = run(args.command, args.quiet);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("ERROR - {err}");
            if err.class() != ErrorClass::Config {
                error!("Something went wrong and arazu aborted your deploy.");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, quiet: bool) -> Result<()> {
    // Relative paths are resolved once, here
    let cwd = std::env::current_dir().map_err(DeployError::WorkingDirUnavailable)?;

    match command {
        Command::Init { format } => init(&cwd, format, quiet),
        Command::Deploy { config, dry_run } => {
            let options = DeployOptions { dry_run, quiet };
            deploy(&cwd, &config, options)
        }
    }
}

fn init_logger(quiet: bool, verbose: bool) {
    let level = if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn init(cwd: &Path, format: ConfigFormat, quiet: bool) -> Result<()> {
    let path = cwd.join(format.default_path());
    write_template(&path, format)?;

    if !quiet {
        println!("new config template at \"{}\"!", format.default_path());
        println!("fill it out and run `arazu deploy`");
    }
    Ok(())
}

fn deploy(cwd: &Path, config_path: &Path, options: DeployOptions) -> Result<()> {
    let config = DeployConfig::load(&cwd.join(config_path))?;
    let result = Deployer::new(Git2Client, ShellRunner, cwd).deploy(&config, options)?;

    // A dry run always names the folder it leaves behind
    if let Some(staging_dir) = &result.staging_dir {
        if !options.quiet {
            println!("Dry Run Complete!");
        }
        println!("Deploy folder is: {}", staging_dir.display());
        if !options.quiet {
            println!("Delete the deploy folder when finished");
        }
    } else if !options.quiet {
        println!("Deploy complete for commit {}", result.source_sha);
    }
    Ok(())
}
