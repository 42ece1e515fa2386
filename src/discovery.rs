//! # Discovery Module
//!
//! Finds the Python interpreter that packages are installed into, and the
//! directory the installer runs from.
//!
//! ## Interpreter lookup order
//!
//! 1.  **Explicit**: `--python <PATH>`, made absolute.
//! 2.  **PATH**: the first directory holding `python3`/`python` (`python.exe` on Windows).
//!     Microsoft Store alias folders (`WindowsApps`) are skipped: their `python.exe`
//!     is a stub that opens the Store.
//! 3.  **Registry** (Windows): PEP 514 entries under `Software\Python\PythonCore`,
//!     `HKCU` before `HKLM`, newest version first.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use walkdir::WalkDir;

#[cfg(windows)]
const INTERPRETER_NAMES: &[&str] = &["python.exe", "python3.exe"];
#[cfg(not(windows))]
const INTERPRETER_NAMES: &[&str] = &["python3", "python"];

/// Directory containing the running executable. Manifest and companion script live here.
pub fn installer_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("chemin de l'exécutable introuvable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("l'exécutable n'a pas de dossier parent")
}

/// The installer directory as an absolute path: `--dir` if given, else [`installer_dir`].
///
/// The shortcut stores this as its working directory, so it must not depend on the caller's cwd.
pub fn resolve_base_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => absolute(dir),
        None => installer_dir(),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("chemin invalide : {}", path.display()))
}

/// Resolves the interpreter to use, as an absolute path. Failure here is a bootstrap failure.
pub fn find_interpreter(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("interpréteur Python introuvable : {}", path.display());
        }
        return absolute(path);
    }

    let found = std::env::var_os("PATH")
        .and_then(|path_var| scan_path(&path_var))
        .or_else(scan_registry);

    match found {
        Some(path) => {
            let path = absolute(&path)?;
            info!("Interpréteur Python : {}", path.display());
            Ok(path)
        }
        None => bail!("aucun interpréteur Python trouvé (PATH, registre). Utilisez --python <chemin>."),
    }
}

/// Returns the first interpreter found in the directories of a `PATH`-style value.
pub fn scan_path(path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .filter(|dir| !is_store_alias_dir(dir))
        .filter(|dir| dir.is_dir())
        .find_map(|dir| find_in_dir(&dir))
}

fn is_store_alias_dir(dir: &Path) -> bool {
    dir.components()
        .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case("WindowsApps"))
}

/// Looks for an interpreter directly inside `dir` (depth 1), honouring name priority.
fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    debug!("Scanning directory: {:?}", dir);
    let mut best: Option<(usize, PathBuf)> = None;

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        // Follows symlinks: `python3` is usually one.
        if !path.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        let rank = INTERPRETER_NAMES.iter().position(|candidate| {
            if cfg!(windows) {
                name.eq_ignore_ascii_case(candidate)
            } else {
                name == *candidate
            }
        });

        if let Some(rank) = rank {
            if best.as_ref().is_none_or(|(r, _)| rank < *r) {
                best = Some((rank, path.to_path_buf()));
            }
        }
    }

    best.map(|(_, path)| path)
}

#[cfg(windows)]
fn scan_registry() -> Option<PathBuf> {
    use windows_registry::{CURRENT_USER, LOCAL_MACHINE};

    let key_path = r"Software\Python\PythonCore";

    for hive in [CURRENT_USER, LOCAL_MACHINE] {
        let Ok(core) = hive.open(key_path) else {
            continue;
        };

        let mut tags: Vec<String> = core.keys().into_iter().flatten().collect();
        tags.sort_by_key(|t| std::cmp::Reverse(tag_version(t)));

        for tag in tags {
            let Ok(install) = core.open(format!(r"{}\InstallPath", tag)) else {
                continue;
            };

            let exe = install
                .get_string("ExecutablePath")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    install
                        .get_string("")
                        .ok()
                        .filter(|s| !s.is_empty())
                        .map(|dir| PathBuf::from(dir).join("python.exe"))
                });

            if let Some(exe) = exe.filter(|p| p.is_file()) {
                debug!("Registry PythonCore\\{} -> {:?}", tag, exe);
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(not(windows))]
fn scan_registry() -> Option<PathBuf> {
    None
}

/// Numeric `(major, minor)` of a PythonCore tag such as `3.12`, `3.11-32` or `3.13t`.
#[cfg(any(windows, test))]
fn tag_version(tag: &str) -> (u32, u32) {
    let numeric = tag.split('-').next().unwrap_or(tag);
    let mut parts = numeric.split('.').map(leading_number);
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Parses the leading digits of `part`, ignoring suffixes like the free-threaded `t`.
#[cfg(any(windows, test))]
fn leading_number(part: &str) -> u32 {
    let end = part.find(|c: char| !c.is_ascii_digit()).unwrap_or(part.len());
    part[..end].parse().unwrap_or(0)
}
