// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archiver output suppression.
//!
//! 7-Zip is chatty. Every run prints a banner, scanning notices, archive
//! properties, per-file counts, and progress percentages. None of that helps
//! the user when a build goes fine, so lines matching a __suppression list__
//! are dropped. Whatever is left is logged, and kept for the error report if
//! the archiver fails.
//!
//! The default list is plain data in [`SEVEN_ZIP_NOISE`]. Callers can extend
//! it with their own patterns, e.g., through the `archiver.suppress` field of
//! an archive descriptor.

use regex::Regex;

/// Default noise patterns of 7-Zip console output.
pub const SEVEN_ZIP_NOISE: &[&str] = &[
    r"^7-Zip .* Copyright \(c\) 1999.* Igor Pavlov.*$",
    r"^p7zip Version .*$",
    r"^Open archive: .*$",
    r"^--.*$",
    r"^Path = .*$",
    r"^Type = .*$",
    r"^Physical Size = .*$",
    r"^Headers Size = .*$",
    r"^Method = .*$",
    r"^Solid = .*$",
    r"^Blocks = .*$",
    r"^Scanning the drive:.*$",
    r"^.* files?, .* bytes.*$",
    r"^\d+ (files?|folders?)$",
    r"^Updating archive: .*$",
    r"^Creating archive: .*$",
    r"^Add new data to archive: .*$",
    r"^Items to compress: .*$",
    r"^ .*M Scan .*$",
    r"^Files read from disk: .*$",
    r"^Archive size: .*$",
    r"^Everything is Ok.*$",
    r"^\s*\d+%.*$",
    r"^Extract .*$",
    r"^Scanning the drive for archives:.*$",
    r"^Extracting archive:.*$",
    r"^Offset\s+=\s+\d+$",
    r"^Folders:\s+\d+",
    r"^Files:\s+\d+",
    r"^Size:\s+\d+",
    r"^Compressed:\s+\d+",
];

/// Ordered list of patterns for output lines to drop.
#[derive(Debug, Clone, Default)]
pub struct SuppressList {
    patterns: Vec<Regex>,
}

impl SuppressList {
    /// Construct new suppression list from patterns.
    ///
    /// # Errors
    ///
    /// - Return [`regex::Error`] if a pattern is not a valid regex.
    pub fn new(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self, regex::Error> {
        let mut list = Self::default();
        list.extend(patterns)?;
        Ok(list)
    }

    /// Construct suppression list for 7-Zip console output.
    pub fn seven_zip() -> Self {
        let patterns = SEVEN_ZIP_NOISE
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();

        Self { patterns }
    }

    /// Add more patterns to the list.
    ///
    /// # Errors
    ///
    /// - Return [`regex::Error`] if a pattern is not a valid regex. Patterns
    ///   before the invalid one are kept.
    pub fn extend(
        &mut self,
        patterns: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<(), regex::Error> {
        for pattern in patterns {
            self.patterns.push(Regex::new(pattern.as_ref())?);
        }

        Ok(())
    }

    /// Check if line should be dropped.
    ///
    /// Blank lines are always dropped.
    pub fn is_suppressed(&self, line: &str) -> bool {
        let line = clean_line(line);
        line.trim().is_empty() || self.patterns.iter().any(|pattern| pattern.is_match(&line))
    }

    /// Split raw output into lines, keeping only the ones worth showing.
    ///
    /// Both `\r` and `\n` end a line, since progress output redraws itself
    /// through carriage returns.
    pub fn filter(&self, output: &str) -> Vec<String> {
        output
            .split(['\r', '\n'])
            .filter(|line| !self.is_suppressed(line))
            .map(clean_line)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// Progress output erases itself with backspaces.
fn clean_line(line: &str) -> String {
    line.chars().filter(|c| *c != '\u{8}').collect()
}
