// Vendor detection strategies for prompts and pagination
//
// Prompt and pagination patterns are empirical: they match what the common
// network-OS families actually print, not any documented grammar. New
// vendors plug in here without touching the session driver.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Supported device vendor families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Vendor {
    Huawei,
    Cisco,
    H3c,
    Generic,
}

impl Vendor {
    /// Stable lowercase tag, used in CLI args and parser rule lookups.
    pub fn tag(&self) -> &'static str {
        match self {
            Vendor::Huawei => "huawei",
            Vendor::Cisco => "cisco",
            Vendor::H3c => "h3c",
            Vendor::Generic => "generic",
        }
    }

    pub fn profile(&self) -> &'static VendorProfile {
        match self {
            Vendor::Huawei => &HUAWEI,
            Vendor::Cisco => &CISCO,
            Vendor::H3c => &H3C,
            Vendor::Generic => &GENERIC,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "huawei" => Ok(Vendor::Huawei),
            "cisco" => Ok(Vendor::Cisco),
            "h3c" => Ok(Vendor::H3c),
            "generic" => Ok(Vendor::Generic),
            other => Err(format!("Unknown vendor '{}'", other)),
        }
    }
}

/// Per-vendor CLI behavior consumed by the session driver and segmenter
pub struct VendorProfile {
    /// Matches a line that is nothing but a ready prompt
    pub prompt: Lazy<Regex>,
    /// Matches a line that begins with a prompt token (command echo lines)
    pub prompt_prefix: Lazy<Regex>,
    /// Substrings the CLI prints while holding output for a keypress
    pub pagination_markers: &'static [&'static str],
    /// Keystroke that releases the next page. A bare space: a newline would
    /// execute an empty command on several vendors.
    pub continuation: &'static [u8],
    /// Full-configuration dump command for backups
    pub backup_command: &'static str,
}

impl VendorProfile {
    /// Whether the line consists solely of a ready prompt.
    pub fn is_prompt_line(&self, line: &str) -> bool {
        self.prompt.is_match(line.trim_end())
    }

    /// Whether the line begins with a prompt token. True for command echo
    /// lines, where the device prints the prompt and the echoed input
    /// together.
    pub fn is_prompt_prefixed(&self, line: &str) -> bool {
        self.prompt_prefix.is_match(line)
    }

    /// Count pagination marker occurrences in a chunk of output.
    pub fn pagination_hits(&self, text: &str) -> usize {
        self.pagination_markers
            .iter()
            .map(|m| text.matches(m).count())
            .sum()
    }
}

static HUAWEI: VendorProfile = VendorProfile {
    prompt: Lazy::new(|| Regex::new(r"^[<\[][\w.\-/:]+[>\]]$").unwrap()),
    prompt_prefix: Lazy::new(|| Regex::new(r"^[<\[][\w.\-/:]+[>\]]").unwrap()),
    pagination_markers: &["---- More ----"],
    continuation: b" ",
    backup_command: "display current-configuration",
};

static CISCO: VendorProfile = VendorProfile {
    prompt: Lazy::new(|| Regex::new(r"^[\w.\-]+[>#]$").unwrap()),
    prompt_prefix: Lazy::new(|| Regex::new(r"^[\w.\-]+[>#]").unwrap()),
    pagination_markers: &["--More--", " --More-- "],
    continuation: b" ",
    backup_command: "show running-config",
};

static H3C: VendorProfile = VendorProfile {
    prompt: Lazy::new(|| Regex::new(r"^[<\[][\w.\-/:]+[>\]]$").unwrap()),
    prompt_prefix: Lazy::new(|| Regex::new(r"^[<\[][\w.\-/:]+[>\]]").unwrap()),
    pagination_markers: &["---- More ----", "---- More----"],
    continuation: b" ",
    backup_command: "display current-configuration",
};

static GENERIC: VendorProfile = VendorProfile {
    prompt: Lazy::new(|| Regex::new(r"^(?:[<\[][\w.\-/:]+[>\]]|[\w.\-]+[>#])$").unwrap()),
    prompt_prefix: Lazy::new(|| Regex::new(r"^(?:[<\[][\w.\-/:]+[>\]]|[\w.\-]+[>#])").unwrap()),
    pagination_markers: &["---- More ----", "--More--", "-- More --"],
    continuation: b" ",
    backup_command: "show running-config",
};
