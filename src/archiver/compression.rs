// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Compression modes.

use serde::{Deserialize, Serialize};

/// How the archiver should compress added files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionMode {
    /// Store files without compression.
    ///
    /// Used for payloads that are already compressed, like an inner program
    /// archive wrapped by an installer.
    Store,

    /// Solid LZMA2 compression.
    ///
    /// Switches force the 7z container, whatever extension the output has.
    Lzma2(Lzma2Settings),
}

impl CompressionMode {
    /// Select compression mode for job.
    pub fn select(copy_mode: bool, lzma2: &Lzma2Settings) -> Self {
        if copy_mode {
            Self::Store
        } else {
            Self::Lzma2(lzma2.clone())
        }
    }

    /// Render mode as archiver switches.
    pub fn switches(&self) -> Vec<String> {
        match self {
            Self::Store => vec!["-mx0".into()],
            Self::Lzma2(settings) => settings.switches(),
        }
    }
}

/// Tuning knobs for LZMA2 compression.
///
/// Defaults trade build time for the smallest practical installer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Lzma2Settings {
    /// Dictionary of the LZMA2 coder, e.g., "1024m".
    pub dictionary: String,

    /// Compression level from 0 to 9.
    pub level: u8,

    /// Number of fast bytes, i.e., maximum match length.
    pub fast_bytes: u16,

    /// Dictionary size switch, e.g., "32m".
    pub dictionary_size: String,

    /// Use solid blocks.
    pub solid: bool,
}

impl Default for Lzma2Settings {
    fn default() -> Self {
        Self {
            dictionary: "1024m".into(),
            level: 9,
            fast_bytes: 64,
            dictionary_size: "32m".into(),
            solid: true,
        }
    }
}

impl Lzma2Settings {
    fn switches(&self) -> Vec<String> {
        vec![
            "-t7z".into(),
            format!("-m0=lzma2:d{}", self.dictionary),
            format!("-mx={}", self.level),
            "-aoa".into(),
            format!("-mfb={}", self.fast_bytes),
            format!("-md={}", self.dictionary_size),
            format!("-ms={}", if self.solid { "on" } else { "off" }),
        ]
    }
}
