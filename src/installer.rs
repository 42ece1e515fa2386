//! # Installer Logic
//!
//! Core of the tool:
//! 1. Make sure pip is usable (`ensure_pip`). Failure here is fatal.
//! 2. Walk the manifest and install what is missing (`install_from_manifest`).
//!    Failures here are per package and never stop the loop.
//!
//! Everything goes through [`PackageOps`], so the logic runs unchanged against the mock.

use std::fmt;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use crate::invariant_ppt::assert_invariant;
use crate::manifest;
use crate::system::PackageOps;

/// What happened to one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Some version is already present; carries that version.
    AlreadyInstalled(String),
    Installed,
    /// pip failed; carries the reason.
    Failed(String),
    /// Dry run: pip would have been invoked.
    WouldInstall,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::AlreadyInstalled(v) => write!(f, "déjà installé ({})", v),
            Outcome::Installed => write!(f, "installé"),
            Outcome::Failed(reason) => write!(f, "échec : {}", reason),
            Outcome::WouldInstall => write!(f, "à installer"),
        }
    }
}

/// State of the manifest after the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    Processed,
    Missing,
    Unreadable(String),
}

/// Result of one pass over the manifest. Lives only for the current run.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub manifest: PathBuf,
    pub status: ManifestStatus,
    pub outcomes: Vec<(String, Outcome)>,
}

impl InstallReport {
    fn empty(manifest: &Path, status: ManifestStatus) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            status,
            outcomes: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Failed(_)))
            .map(|(name, _)| name.as_str())
    }

    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Message shown when the manifest is absent.
pub fn missing_manifest_message(path: &Path) -> String {
    format!("Erreur : {} non trouvé, aucune dépendance installée.", path.display())
}

/// Makes sure pip can be invoked, bootstrapping it through `ensurepip` if needed.
///
/// Errors are propagated: without an installer nothing else can work.
/// In a dry run a missing pip is only reported.
pub fn ensure_pip(ops: &impl PackageOps, dry_run: bool) -> Result<()> {
    if ops.pip_available() {
        return Ok(());
    }

    if dry_run {
        warn!("pip non trouvé : il serait installé via ensurepip.");
        return Ok(());
    }

    info!("pip non trouvé, installation...");
    ops.run_ensurepip().context("échec de l'installation de pip (ensurepip)")?;
    ops.upgrade_pip().context("échec de la mise à jour de pip")?;
    info!("pip installé et mis à jour.");
    Ok(())
}

/// Installs one package unless some version of it is already present.
///
/// Never fails: a pip error becomes [`Outcome::Failed`] so the caller can move on.
pub fn install_package(ops: &impl PackageOps, package: &str, dry_run: bool) -> Outcome {
    // A probe that cannot run counts as "not installed"; pip gets a chance to fix it.
    let present = match ops.installed(package) {
        Ok(found) => found,
        Err(e) => {
            warn!("Impossible de vérifier {} : {:#}", package, e);
            None
        }
    };

    if let Some(dist) = present {
        debug!("{} satisfied by {} {}", package, dist.name, dist.version);
        info!("{} déjà installé.", package);
        return Outcome::AlreadyInstalled(dist.version);
    }

    if dry_run {
        info!("{} serait installé.", package);
        return Outcome::WouldInstall;
    }

    match ops.install(package) {
        Ok(()) => {
            info!("{} installé avec succès.", package);
            Outcome::Installed
        }
        Err(e) => {
            error!("Erreur lors de l'installation de {}", package);
            debug!("{}: {:#}", package, e);
            Outcome::Failed(format!("{:#}", e))
        }
    }
}

/// Installs every package listed in the manifest at `manifest_path`.
///
/// A missing or unreadable manifest is reported and yields an empty report;
/// it does not abort the run.
pub fn install_from_manifest(ops: &impl PackageOps, manifest_path: &Path, dry_run: bool) -> InstallReport {
    if !manifest_path.exists() {
        error!("{}", missing_manifest_message(manifest_path));
        return InstallReport::empty(manifest_path, ManifestStatus::Missing);
    }

    let packages = match manifest::read_manifest(manifest_path) {
        Ok(p) => p,
        Err(e) => {
            error!("Erreur : {} illisible ({:#}), aucune dépendance installée.", manifest_path.display(), e);
            return InstallReport::empty(manifest_path, ManifestStatus::Unreadable(format!("{:#}", e)));
        }
    };

    let expected = packages.len();
    let mut report = InstallReport::empty(manifest_path, ManifestStatus::Processed);
    for pkg in packages {
        let outcome = install_package(ops, &pkg, dry_run);
        report.outcomes.push((pkg, outcome));
    }

    assert_invariant(
        report.outcomes.len() == expected,
        "Every manifest entry gets exactly one outcome",
        Some("Installer"),
    );

    info!("Vérification/installation de toutes les dépendances terminée !");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariant_ppt::contract_test;
    use crate::system::MockPackages;
    use proptest::prelude::*;

    fn manifest_in(dir: &Path, content: &str) -> PathBuf {
        let path = manifest::manifest_path(dir);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn installs_listed_packages_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_in(tmp.path(), "requests\n# comment\n\nnumpy\n");
        let mock = MockPackages::with_pip();

        let report = install_from_manifest(&mock, &path, false);

        assert_eq!(mock.install_calls(), vec!["requests", "numpy"]);
        assert_eq!(report.status, ManifestStatus::Processed);
        assert_eq!(report.count(|o| *o == Outcome::Installed), 2);
        contract_test("install_from_manifest", &["Every manifest entry gets exactly one outcome"]);
    }

    #[test]
    fn already_installed_packages_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_in(tmp.path(), "requests\nnumpy\n");
        let mock = MockPackages::with_pip().with_installed("requests", "2.32.3");

        let report = install_from_manifest(&mock, &path, false);

        assert_eq!(mock.install_calls(), vec!["numpy"]);
        assert_eq!(report.outcomes[0].1, Outcome::AlreadyInstalled("2.32.3".into()));
    }

    #[test]
    fn second_run_installs_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_in(tmp.path(), "requests\nnumpy\n");
        let mock = MockPackages::with_pip();

        install_from_manifest(&mock, &path, false);
        let second = install_from_manifest(&mock, &path, false);

        assert_eq!(mock.install_calls().len(), 2);
        assert!(second.outcomes.iter().all(|(_, o)| matches!(o, Outcome::AlreadyInstalled(_))));
    }

    #[test]
    fn failure_does_not_stop_later_packages() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_in(tmp.path(), "broken-pkg\nnumpy\n");
        let mock = MockPackages::with_pip().failing_on("broken-pkg");

        let report = install_from_manifest(&mock, &path, false);

        assert_eq!(mock.install_calls(), vec!["broken-pkg", "numpy"]);
        assert_eq!(report.failures().collect::<Vec<_>>(), vec!["broken-pkg"]);
        assert_eq!(report.outcomes[1].1, Outcome::Installed);
    }

    #[test]
    fn missing_manifest_installs_nothing_and_names_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest::manifest_path(tmp.path());
        let mock = MockPackages::with_pip();

        let report = install_from_manifest(&mock, &path, false);

        assert!(mock.calls().is_empty());
        assert_eq!(report.status, ManifestStatus::Missing);
        assert!(report.outcomes.is_empty());
        let msg = missing_manifest_message(&path);
        assert!(msg.contains(&path.display().to_string()));
        assert!(msg.starts_with("Erreur : "));
    }

    #[test]
    fn unreadable_manifest_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_in(tmp.path(), "");
        std::fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();
        let mock = MockPackages::with_pip();

        let report = install_from_manifest(&mock, &path, false);

        assert!(matches!(report.status, ManifestStatus::Unreadable(_)));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn dry_run_never_invokes_pip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_in(tmp.path(), "requests\nnumpy\n");
        let mock = MockPackages::default().with_installed("numpy", "1.26.4");

        ensure_pip(&mock, true).unwrap();
        let report = install_from_manifest(&mock, &path, true);

        assert!(mock.calls().is_empty());
        assert_eq!(report.outcomes[0].1, Outcome::WouldInstall);
        assert_eq!(report.outcomes[1].1, Outcome::AlreadyInstalled("1.26.4".into()));
    }

    #[test]
    fn ensure_pip_is_noop_when_present() {
        let mock = MockPackages::with_pip();
        ensure_pip(&mock, false).unwrap();
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn ensure_pip_bootstraps_then_upgrades() {
        let mock = MockPackages::default();
        ensure_pip(&mock, false).unwrap();
        assert_eq!(mock.calls(), vec!["ensurepip", "upgrade pip"]);
        assert!(mock.pip_available());
    }

    #[test]
    fn bootstrap_failure_propagates() {
        let mock = MockPackages {
            broken_bootstrap: true,
            ..Default::default()
        };
        let err = ensure_pip(&mock, false).unwrap_err();
        assert!(format!("{:#}", err).contains("ensurepip"));
        assert_eq!(mock.calls(), vec!["ensurepip"]);
    }

    proptest! {
        #[test]
        fn every_missing_entry_is_attempted_once_in_order(
            packages in prop::collection::vec("[a-z]{3,8}", 0..12),
            failing in prop::collection::vec("[a-z]{3,8}", 0..4),
        ) {
            let tmp = tempfile::tempdir().unwrap();
            let path = manifest_in(tmp.path(), &packages.join("\n"));
            let mut mock = MockPackages::with_pip();
            for f in &failing {
                mock = mock.failing_on(f);
            }

            let report = install_from_manifest(&mock, &path, false);

            // Duplicates are satisfied by their first successful install.
            let mut expected: Vec<String> = Vec::new();
            let mut done = std::collections::HashSet::new();
            for p in &packages {
                if done.contains(p) {
                    continue;
                }
                expected.push(p.clone());
                if !failing.contains(p) {
                    done.insert(p.clone());
                }
            }

            prop_assert_eq!(mock.install_calls(), expected);
            prop_assert_eq!(report.outcomes.len(), packages.len());
        }
    }
}
