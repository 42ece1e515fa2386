//! # reqinstall: The Main Entry Point
//!
//! Parses the command line, initializes logging and runs the three stages in order:
//! 1. Bootstrap: find the interpreter and make sure pip works (fatal on failure).
//! 2. Install everything listed in `requirment.txt` (per-package failures are reported).
//! 3. Offer a desktop shortcut on Windows and tell the user we are done.
//!
//! With no arguments the tool does exactly that, using the directory of the executable.

use std::path::PathBuf;
use anyhow::Result;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod discovery;
mod installer;
mod invariant_ppt;
mod manifest;
mod notifier;
mod shortcut;
mod system;

use installer::{InstallReport, ManifestStatus, Outcome};
use system::PythonRuntime;

/// Command-line options. All of them are optional.
#[derive(Parser)]
#[command(name = "reqinstall")]
#[command(about = "Installs the Python packages listed in requirment.txt", long_about = None)]
struct Cli {
    /// Directory holding `requirment.txt` and `YoutubeDL.pyw`.
    ///
    /// Defaults to the directory containing this executable.
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Python interpreter to install into, instead of searching PATH and the registry.
    #[arg(long, value_name = "PATH")]
    python: Option<PathBuf>,

    /// Never show dialogs: confirmation is skipped and messages go to the console.
    #[arg(long)]
    no_gui: bool,

    /// Dry run: report what would be installed without running pip.
    ///
    /// The shortcut stage is skipped.
    #[arg(long)]
    dry_run: bool,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Runs the stages. Only the bootstrap stage can return an error.
fn run(cli: &Cli) -> Result<()> {
    let base_dir = discovery::resolve_base_dir(cli.dir.as_deref())?;

    let interpreter = discovery::find_interpreter(cli.python.as_deref())?;
    let runtime = PythonRuntime::new(interpreter);
    installer::ensure_pip(&runtime, cli.dry_run)?;

    let report = installer::install_from_manifest(&runtime, &manifest::manifest_path(&base_dir), cli.dry_run);

    if cli.dry_run {
        print_dry_run_summary(&report);
        return Ok(());
    }

    for pkg in report.failures() {
        warn!("{} n'a pas pu être installé.", pkg);
    }

    let notifier = notifier::select(cli.no_gui);
    let plan = shortcut::ShortcutPlan::new(&base_dir, runtime.interpreter(), shortcut::desktop_dir());
    let outcome = shortcut::offer_and_finish(
        notifier.as_ref(),
        &shortcut::ShellLinkWriter,
        &plan,
        &mut std::io::stdout(),
    );
    info!(
        "Terminé ({} paquet(s), raccourci {}).",
        report.outcomes.len(),
        if outcome.shortcut_written { "créé" } else { "inchangé" }
    );
    Ok(())
}

fn print_dry_run_summary(report: &InstallReport) {
    println!();
    println!("--- SIMULATION : aucune modification effectuée ---");
    println!("Fichier : {}", report.manifest.display());

    match &report.status {
        ManifestStatus::Missing => println!("  (fichier absent)"),
        ManifestStatus::Unreadable(reason) => println!("  (fichier illisible : {})", reason),
        ManifestStatus::Processed => {
            for (pkg, outcome) in &report.outcomes {
                println!("  {:<30} {}", pkg, outcome);
            }
            let pending = report.count(|o| *o == Outcome::WouldInstall);
            println!();
            if pending == 0 {
                println!("Rien à installer.");
            } else {
                println!("{} paquet(s) seraient installés. Relancez sans --dry-run pour appliquer.", pending);
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_default_run() {
        let cli = Cli::try_parse_from(["reqinstall"]).unwrap();
        assert!(cli.dir.is_none());
        assert!(cli.python.is_none());
        assert!(!cli.no_gui);
        assert!(!cli.dry_run);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "reqinstall", "--dir", "app", "--python", "py.exe", "--no-gui", "--dry-run", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("app")));
        assert_eq!(cli.python, Some(PathBuf::from("py.exe")));
        assert!(cli.no_gui);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn missing_interpreter_aborts_before_reading_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "reqinstall".into(),
            "--dir".into(),
            tmp.path().as_os_str().to_owned(),
            "--python".into(),
            tmp.path().join("missing-python").into_os_string(),
        ])
        .unwrap();

        assert!(run(&cli).is_err());
    }
}
