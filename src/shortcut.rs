//! # Desktop Shortcut
//!
//! Last stage of a run. On Windows the user is asked whether a desktop
//! shortcut to `YoutubeDL.pyw` should be created; either way the run ends with
//! a completion message, as a dialog when one could be shown, otherwise on the
//! console.
//!
//! Nothing in this stage is fatal: a dialog or COM failure falls back to the console.

use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{error, info, warn};
use crate::notifier::Notifier;

pub const SHORTCUT_FILE_NAME: &str = "YoutubeDL.lnk";
pub const SCRIPT_FILE_NAME: &str = "YoutubeDL.pyw";

pub const CONFIRM_TITLE: &str = "Créer un raccourci ?";
pub const CONFIRM_CREATE: &str = "Voulez-vous créer un raccourci sur le bureau pour YoutubeDL ?";
pub const CONFIRM_REPLACE: &str =
    "Un raccourci YoutubeDL existe déjà sur le bureau. Voulez-vous le remplacer ?";
pub const DONE_TITLE: &str = "Installation terminée";
pub const DONE_MESSAGE: &str = "Toutes les dépendances ont été installées avec succès !";

/// Everything needed to persist a `.lnk` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutDescriptor {
    pub target: PathBuf,
    /// Command-line arguments, already quoted.
    pub arguments: String,
    pub working_dir: PathBuf,
    pub icon: PathBuf,
}

/// Persists shortcut descriptors.
pub trait ShortcutWriter {
    fn write(&self, descriptor: &ShortcutDescriptor, destination: &Path) -> Result<()>;
}

/// Writes `.lnk` files through the `IShellLinkW` / `IPersistFile` COM interfaces.
pub struct ShellLinkWriter;

#[cfg(windows)]
impl ShortcutWriter for ShellLinkWriter {
    fn write(&self, descriptor: &ShortcutDescriptor, destination: &Path) -> Result<()> {
        use windows::core::{Interface, HSTRING, PCWSTR};
        use windows::Win32::System::Com::{
            CoCreateInstance, CoInitializeEx, CoUninitialize, IPersistFile, CLSCTX_INPROC_SERVER,
            COINIT_APARTMENTTHREADED,
        };
        use windows::Win32::UI::Shell::{IShellLinkW, ShellLink};

        /// Balances a successful `CoInitializeEx`.
        struct ComApartment;
        impl Drop for ComApartment {
            fn drop(&mut self) {
                unsafe { CoUninitialize() };
            }
        }

        let target = HSTRING::from(descriptor.target.as_os_str());
        let arguments = HSTRING::from(descriptor.arguments.as_str());
        let working_dir = HSTRING::from(descriptor.working_dir.as_os_str());
        let icon = HSTRING::from(descriptor.icon.as_os_str());
        let destination = HSTRING::from(destination.as_os_str());

        unsafe {
            CoInitializeEx(None, COINIT_APARTMENTTHREADED)
                .ok()
                .context("initialisation COM")?;
            let _apartment = ComApartment;

            let link: IShellLinkW = CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER)
                .context("création de l'objet ShellLink")?;
            link.SetPath(PCWSTR(target.as_ptr()))?;
            link.SetArguments(PCWSTR(arguments.as_ptr()))?;
            link.SetWorkingDirectory(PCWSTR(working_dir.as_ptr()))?;
            link.SetIconLocation(PCWSTR(icon.as_ptr()), 0)?;

            let file: IPersistFile = link.cast()?;
            file.Save(PCWSTR(destination.as_ptr()), true)
                .context("enregistrement du raccourci")?;
        }
        Ok(())
    }
}

#[cfg(not(windows))]
impl ShortcutWriter for ShellLinkWriter {
    fn write(&self, _descriptor: &ShortcutDescriptor, destination: &Path) -> Result<()> {
        anyhow::bail!(
            "création de raccourci non prise en charge sur {} ({})",
            std::env::consts::OS,
            destination.display()
        )
    }
}

/// Paths involved in the shortcut offer, computed once per run.
#[derive(Debug, Clone)]
pub struct ShortcutPlan {
    /// Installer directory: working directory of the shortcut, home of the script.
    pub script_dir: PathBuf,
    /// Interpreter that runs the script; also provides the icon.
    pub interpreter: PathBuf,
    pub desktop: Option<PathBuf>,
}

impl ShortcutPlan {
    pub fn new(script_dir: &Path, interpreter: &Path, desktop: Option<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.to_path_buf(),
            interpreter: interpreter.to_path_buf(),
            desktop,
        }
    }

    pub fn script(&self) -> PathBuf {
        self.script_dir.join(SCRIPT_FILE_NAME)
    }

    pub fn destination(&self) -> Result<PathBuf> {
        let desktop = self.desktop.as_ref().context("dossier Bureau introuvable")?;
        Ok(desktop.join(SHORTCUT_FILE_NAME))
    }

    pub fn descriptor(&self) -> ShortcutDescriptor {
        ShortcutDescriptor {
            target: self.interpreter.clone(),
            arguments: format!("\"{}\"", self.script().display()),
            working_dir: self.script_dir.clone(),
            icon: self.interpreter.clone(),
        }
    }
}

/// The user's desktop folder, falling back to `<home>/Desktop`.
pub fn desktop_dir() -> Option<PathBuf> {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.desktop_dir().map(Path::to_path_buf))
        .or_else(|| directories::BaseDirs::new().map(|b| b.home_dir().join("Desktop")))
}

/// Prompt wording: replacing an existing shortcut is asked differently.
pub fn confirmation_message(destination: &Path) -> &'static str {
    if destination.exists() {
        CONFIRM_REPLACE
    } else {
        CONFIRM_CREATE
    }
}

/// How the stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageOutcome {
    pub shortcut_written: bool,
    /// The completion message was shown as a dialog (otherwise it went to the console).
    pub popup_shown: bool,
}

/// Runs the shortcut offer and always ends with the completion message.
///
/// When no dialog could be shown the message goes to `console` instead.
pub fn offer_and_finish(
    notifier: &dyn Notifier,
    writer: &dyn ShortcutWriter,
    plan: &ShortcutPlan,
    console: &mut dyn Write,
) -> StageOutcome {
    let mut outcome = StageOutcome::default();

    if notifier.is_interactive() {
        match offer_with_dialogs(notifier, writer, plan) {
            Ok(written) => {
                outcome.shortcut_written = written;
                outcome.popup_shown = true;
            }
            Err(e) => error!("Erreur interface graphique ou création raccourci : {:#}", e),
        }
    }

    if !outcome.popup_shown {
        if let Err(e) = writeln!(console, "{}", DONE_MESSAGE) {
            error!("Impossible d'écrire sur la console : {}", e);
        }
    }
    outcome
}

/// Dialog path. Returns whether a shortcut was written.
///
/// Errors from the dialogs themselves propagate; a failed shortcut write does not.
fn offer_with_dialogs(
    notifier: &dyn Notifier,
    writer: &dyn ShortcutWriter,
    plan: &ShortcutPlan,
) -> Result<bool> {
    let destination = plan.destination()?;
    let accepted = notifier.confirm(CONFIRM_TITLE, confirmation_message(&destination))?;

    let mut written = false;
    if accepted {
        let script = plan.script();
        if script.exists() {
            match writer.write(&plan.descriptor(), &destination) {
                Ok(()) => {
                    info!("Raccourci créé : {}", destination.display());
                    written = true;
                }
                Err(e) => error!("Erreur lors de la création du raccourci : {:#}", e),
            }
        } else {
            warn!("{} introuvable, raccourci non créé.", script.display());
        }
    }

    notifier.inform(DONE_TITLE, DONE_MESSAGE)?;
    Ok(written)
}
