//! # Manifest
//!
//! The list of required packages: a UTF-8 text file, one package per line,
//! sitting next to the installer. Blank lines and `#` comments are ignored.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::trace;
use crate::invariant_ppt::assert_invariant;

/// Fixed name of the manifest file. The spelling is part of the contract with existing installs.
pub const MANIFEST_FILE_NAME: &str = "requirment.txt";

const COMMENT_MARKER: char = '#';

/// Location of the manifest inside the installer directory.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE_NAME)
}

/// Reads and parses the manifest at `path`.
///
/// Fails if the file cannot be opened or is not valid UTF-8.
pub fn read_manifest(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("lecture de {}", path.display()))?;
    Ok(parse_manifest(&content))
}

/// Turns manifest text into package identifiers, preserving file order.
///
/// Each line is trimmed; empty lines and lines starting with `#` are dropped.
pub fn parse_manifest(content: &str) -> Vec<String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let packages: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .inspect(|pkg| trace!("Manifest entry: {}", pkg))
        .collect();

    assert_invariant(
        packages.iter().all(|p| !p.is_empty() && !p.starts_with(COMMENT_MARKER)),
        "Manifest entries are never blank or comments",
        Some("Manifest"),
    );

    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariant_ppt::contract_test;
    use proptest::prelude::*;

    #[test]
    fn skips_blank_and_comment_lines_in_order() {
        let parsed = parse_manifest("requests\n# comment\n\nnumpy\n");
        assert_eq!(parsed, vec!["requests", "numpy"]);
        contract_test("parse_manifest", &["Manifest entries are never blank or comments"]);
    }

    #[test]
    fn trims_whitespace_and_crlf() {
        let parsed = parse_manifest("  yt-dlp  \r\n\t# indented comment\r\n   \r\nPySide6\r\n");
        assert_eq!(parsed, vec!["yt-dlp", "PySide6"]);
    }

    #[test]
    fn ignores_byte_order_mark() {
        let parsed = parse_manifest("\u{feff}requests\nnumpy");
        assert_eq!(parsed, vec!["requests", "numpy"]);
    }

    #[test]
    fn keeps_version_specifiers_verbatim() {
        let parsed = parse_manifest("requests>=2.31\nnumpy==1.26.4\n");
        assert_eq!(parsed, vec!["requests>=2.31", "numpy==1.26.4"]);
    }

    #[test]
    fn read_manifest_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_path(tmp.path());
        std::fs::write(&path, "requests\n# comment\n\nnumpy\n").unwrap();

        assert_eq!(read_manifest(&path).unwrap(), vec!["requests", "numpy"]);
    }

    #[test]
    fn read_manifest_rejects_invalid_utf8() {
        let tmp = tempfile::tempdir().unwrap();
        let path = manifest_path(tmp.path());
        std::fs::write(&path, [0x72, 0x65, 0xff, 0xfe, 0x0a]).unwrap();

        let err = read_manifest(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(MANIFEST_FILE_NAME));
    }

    #[test]
    fn manifest_path_uses_fixed_name() {
        let dir = PathBuf::from("installer");
        assert_eq!(manifest_path(&dir), dir.join("requirment.txt"));
    }

    proptest! {
        #[test]
        fn blank_and_comment_lines_never_become_packages(
            lines in prop::collection::vec(
                prop_oneof![
                    "[a-zA-Z][a-zA-Z0-9_.-]{0,12}",
                    "[ \t]*#[ -~]{0,12}",
                    "[ \t]{0,4}",
                ],
                0..20,
            )
        ) {
            let content = lines.join("\n");
            let parsed = parse_manifest(&content);

            for pkg in &parsed {
                prop_assert!(!pkg.is_empty());
                prop_assert!(!pkg.starts_with('#'));
                prop_assert_eq!(pkg.trim(), pkg.as_str());
            }

            let expected: Vec<String> = lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect();
            prop_assert_eq!(parsed, expected);
        }
    }
}
