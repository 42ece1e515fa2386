use std::path::{Path, PathBuf};
use std::process::Command;
use anyhow::{bail, Context, Result};
use log::{debug, trace};
use serde::Deserialize;

/// Looks a distribution up through `importlib.metadata` and prints it as JSON.
/// Exits with status 1 when the distribution is not installed.
const METADATA_PROBE: &str = "\
import json, sys
from importlib import metadata
try:
    dist = metadata.distribution(sys.argv[1])
except metadata.PackageNotFoundError:
    sys.exit(1)
print(json.dumps({'name': dist.metadata['Name'], 'version': dist.version}))
";

/// An installed distribution, as reported by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Distribution {
    pub name: String,
    pub version: String,
}

/// Abstraction over the Python environment that packages are installed into.
///
/// Every method has a side effect on (or queries) the shared interpreter, so the
/// installer logic only ever talks to this trait. Tests swap in a recording mock.
pub trait PackageOps {
    /// Is `pip` importable by the interpreter?
    fn pip_available(&self) -> bool;

    /// Run the interpreter's bundled pip bootstrap (`ensurepip --upgrade`).
    fn run_ensurepip(&self) -> Result<()>;

    /// Upgrade pip itself to the latest release.
    fn upgrade_pip(&self) -> Result<()>;

    /// Look up installed metadata for `package`. `Ok(None)` means absent.
    fn installed(&self, package: &str) -> Result<Option<Distribution>>;

    /// Install a single package with pip.
    fn install(&self, package: &str) -> Result<()>;
}

/// The real interpreter, driven through subprocesses.
pub struct PythonRuntime {
    interpreter: PathBuf,
}

impl PythonRuntime {
    pub fn new(interpreter: PathBuf) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    fn command(&self) -> Command {
        Command::new(&self.interpreter)
    }

    /// Runs `python <args>` with inherited stdio, failing on a non-zero exit.
    fn run_checked(&self, args: &[&str]) -> Result<()> {
        debug!("Running {:?} {}", self.interpreter, args.join(" "));
        let status = self
            .command()
            .args(args)
            .status()
            .with_context(|| format!("impossible de lancer {}", self.interpreter.display()))?;

        if !status.success() {
            bail!("`python {}` a échoué (code de sortie {:?})", args.join(" "), status.code());
        }
        Ok(())
    }
}

impl PackageOps for PythonRuntime {
    fn pip_available(&self) -> bool {
        match self.command().args(["-m", "pip", "--version"]).output() {
            Ok(out) if out.status.success() => {
                debug!("Found {}", String::from_utf8_lossy(&out.stdout).trim());
                true
            }
            Ok(out) => {
                trace!("pip probe failed: {}", String::from_utf8_lossy(&out.stderr).trim());
                false
            }
            Err(e) => {
                debug!("Could not run pip probe: {}", e);
                false
            }
        }
    }

    fn run_ensurepip(&self) -> Result<()> {
        self.run_checked(&["-m", "ensurepip", "--upgrade"])
    }

    fn upgrade_pip(&self) -> Result<()> {
        self.run_checked(&["-m", "pip", "install", "--upgrade", "pip"])
    }

    fn installed(&self, package: &str) -> Result<Option<Distribution>> {
        let out = self
            .command()
            .args(["-c", METADATA_PROBE, package])
            .output()
            .with_context(|| format!("impossible de lancer {}", self.interpreter.display()))?;

        if !out.status.success() {
            trace!("{} not found: {}", package, String::from_utf8_lossy(&out.stderr).trim());
            return Ok(None);
        }

        let dist: Distribution = serde_json::from_slice(&out.stdout)
            .with_context(|| format!("métadonnées illisibles pour {}", package))?;
        Ok(Some(dist))
    }

    fn install(&self, package: &str) -> Result<()> {
        self.run_checked(&["-m", "pip", "install", package])
    }
}

/// A recording stand-in for the interpreter.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockPackages {
    /// Installed distributions: name -> version.
    pub installed: std::sync::Mutex<std::collections::HashMap<String, String>>,
    /// Packages whose installation fails.
    pub failing: std::collections::HashSet<String>,
    pub pip_present: std::sync::Mutex<bool>,
    /// Make `run_ensurepip` fail.
    pub broken_bootstrap: bool,
    /// Every mutating call, in order (e.g. `install requests`).
    pub calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockPackages {
    pub fn with_pip() -> Self {
        Self {
            pip_present: std::sync::Mutex::new(true),
            ..Default::default()
        }
    }

    pub fn with_installed(self, name: &str, version: &str) -> Self {
        self.installed.lock().unwrap().insert(name.to_string(), version.to_string());
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Packages handed to `install`, in order.
    pub fn install_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("install ").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[cfg(test)]
impl PackageOps for MockPackages {
    fn pip_available(&self) -> bool {
        *self.pip_present.lock().unwrap()
    }

    fn run_ensurepip(&self) -> Result<()> {
        self.record("ensurepip".to_string());
        if self.broken_bootstrap {
            bail!("ensurepip is disabled in this environment");
        }
        *self.pip_present.lock().unwrap() = true;
        Ok(())
    }

    fn upgrade_pip(&self) -> Result<()> {
        self.record("upgrade pip".to_string());
        Ok(())
    }

    fn installed(&self, package: &str) -> Result<Option<Distribution>> {
        let map = self.installed.lock().unwrap();
        Ok(map.get(package).map(|version| Distribution {
            name: package.to_string(),
            version: version.clone(),
        }))
    }

    fn install(&self, package: &str) -> Result<()> {
        self.record(format!("install {}", package));
        if self.failing.contains(package) {
            bail!("No matching distribution found for {}", package);
        }
        self.installed.lock().unwrap().insert(package.to_string(), "1.0".to_string());
        Ok(())
    }
}
