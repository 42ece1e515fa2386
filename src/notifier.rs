//! # Notifier
//!
//! How the installer talks to the user once the packages are done: native
//! message boxes on Windows, plain console text everywhere else. The choice is
//! made once at startup by [`select`]; callers only see the [`Notifier`] trait.

use anyhow::Result;

/// Confirmation and notification capability.
pub trait Notifier {
    /// True when `confirm` can actually ask the user something.
    fn is_interactive(&self) -> bool;

    /// Blocking yes/no question. `Ok(true)` means "yes".
    fn confirm(&self, title: &str, message: &str) -> Result<bool>;

    /// Blocking information message.
    fn inform(&self, title: &str, message: &str) -> Result<()>;
}

/// Console-only notifier. Never prompts.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn is_interactive(&self) -> bool {
        false
    }

    fn confirm(&self, _title: &str, _message: &str) -> Result<bool> {
        Ok(false)
    }

    fn inform(&self, _title: &str, message: &str) -> Result<()> {
        println!("{}", message);
        Ok(())
    }
}

/// Native Win32 message boxes.
#[cfg(windows)]
pub struct DialogNotifier;

#[cfg(windows)]
impl DialogNotifier {
    fn message_box(
        title: &str,
        message: &str,
        style: windows::Win32::UI::WindowsAndMessaging::MESSAGEBOX_STYLE,
    ) -> Result<windows::Win32::UI::WindowsAndMessaging::MESSAGEBOX_RESULT> {
        use windows::core::{HSTRING, PCWSTR};
        use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_SETFOREGROUND, MB_TOPMOST};

        let text = HSTRING::from(message);
        let caption = HSTRING::from(title);

        // MessageBoxW returns 0 when the box could not be shown (no desktop, out of memory...).
        let result = unsafe {
            MessageBoxW(
                None,
                PCWSTR(text.as_ptr()),
                PCWSTR(caption.as_ptr()),
                style | MB_TOPMOST | MB_SETFOREGROUND,
            )
        };
        if result.0 == 0 {
            anyhow::bail!("MessageBoxW a échoué : {}", std::io::Error::last_os_error());
        }
        Ok(result)
    }
}

#[cfg(windows)]
impl Notifier for DialogNotifier {
    fn is_interactive(&self) -> bool {
        true
    }

    fn confirm(&self, title: &str, message: &str) -> Result<bool> {
        use windows::Win32::UI::WindowsAndMessaging::{IDYES, MB_ICONQUESTION, MB_YESNO};

        let answer = Self::message_box(title, message, MB_YESNO | MB_ICONQUESTION)?;
        Ok(answer == IDYES)
    }

    fn inform(&self, title: &str, message: &str) -> Result<()> {
        use windows::Win32::UI::WindowsAndMessaging::{MB_ICONINFORMATION, MB_OK};

        Self::message_box(title, message, MB_OK | MB_ICONINFORMATION)?;
        Ok(())
    }
}

/// Picks the notifier for this platform. `force_console` disables dialogs everywhere.
pub fn select(force_console: bool) -> Box<dyn Notifier> {
    #[cfg(windows)]
    if !force_console {
        return Box::new(DialogNotifier);
    }

    log::debug!("Using console notifications (force_console = {})", force_console);
    Box::new(ConsoleNotifier)
}

/// Scripted notifier for tests: answers `confirm` with a fixed reply and records every call.
#[cfg(test)]
#[derive(Default)]
pub struct MockNotifier {
    pub interactive: bool,
    pub answer: bool,
    pub fail_confirm: bool,
    pub fail_inform: bool,
    pub shown: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl MockNotifier {
    pub fn answering(answer: bool) -> Self {
        Self {
            interactive: true,
            answer,
            ..Default::default()
        }
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notifier for MockNotifier {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&self, title: &str, message: &str) -> Result<bool> {
        if self.fail_confirm {
            anyhow::bail!("no desktop session");
        }
        self.shown.lock().unwrap().push((title.to_string(), message.to_string()));
        Ok(self.answer)
    }

    fn inform(&self, title: &str, message: &str) -> Result<()> {
        if self.fail_inform {
            anyhow::bail!("no desktop session");
        }
        self.shown.lock().unwrap().push((title.to_string(), message.to_string()));
        Ok(())
    }
}
