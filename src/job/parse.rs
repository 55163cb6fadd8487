// Result parsing boundary
//
// Parsers are pure lookups from (vendor, command, cleaned output) to
// structured data. The engine survives any parser misbehavior: no rule,
// a None, or even a panic all degrade to the raw text block.

use std::panic::AssertUnwindSafe;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use crate::device::Vendor;

/// Pure lookup from command output to structured data.
///
/// `None` means "no rule for this input"; the caller keeps the raw text.
pub trait ResultParser: Send + Sync {
    fn parse(&self, vendor: Vendor, command: &str, output: &str) -> Option<Value>;
}

/// Parser that never matches. Every block falls back to raw text.
pub struct RawTextParser;

impl ResultParser for RawTextParser {
    fn parse(&self, _vendor: Vendor, _command: &str, _output: &str) -> Option<Value> {
        None
    }
}

static HUAWEI_CPU: Lazy<Regex> = Lazy::new(|| Regex::new(r"CPU Usage\s*:\s*(\d+)%").unwrap());
static CISCO_CPU: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CPU utilization for five seconds:\s*(\d+)%").unwrap());
static HUAWEI_MEMORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Memory Using Percentage\s*(?:Is)?\s*:\s*(\d+)%").unwrap());
static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^.*?(?:VRP|IOS|Comware).*?[Vv]ersion\s+([\w.\-()]+)").unwrap());

/// Rule table for the common health commands.
///
/// Deliberately small: anything it does not recognize passes through as raw
/// text, which operators still find useful.
pub struct BuiltinParser;

impl ResultParser for BuiltinParser {
    fn parse(&self, vendor: Vendor, command: &str, output: &str) -> Option<Value> {
        if command.contains("cpu-usage") {
            return capture_usage(&HUAWEI_CPU, output);
        }

        if command.contains("processes cpu") {
            return capture_usage(&CISCO_CPU, output);
        }

        if command.contains("memory") {
            return match vendor {
                Vendor::Huawei | Vendor::H3c => capture_usage(&HUAWEI_MEMORY, output),
                _ => None,
            };
        }

        if command.contains("version") {
            return VERSION
                .captures(output)
                .map(|caps| json!({ "version": caps[1].to_string() }));
        }

        None
    }
}

fn capture_usage(pattern: &Regex, output: &str) -> Option<Value> {
    let caps = pattern.captures(output)?;
    let usage: u64 = caps[1].parse().ok()?;
    Some(json!({ "usage": usage }))
}

/// Invoke a parser, absorbing panics. A panicking rule is logged and treated
/// as "no rule".
pub fn parse_block(
    parser: &dyn ResultParser,
    vendor: Vendor,
    command: &str,
    output: &str,
) -> Option<Value> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| parser.parse(vendor, command, output))) {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(%vendor, %command, "result parser panicked, keeping raw text");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huawei_cpu_usage() {
        let parsed = BuiltinParser
            .parse(
                Vendor::Huawei,
                "display cpu-usage",
                "CPU Usage   : 37% Max: 91%",
            )
            .unwrap();
        assert_eq!(parsed, json!({ "usage": 37 }));
    }

    #[test]
    fn test_cisco_cpu_utilization() {
        let parsed = BuiltinParser
            .parse(
                Vendor::Cisco,
                "show processes cpu",
                "CPU utilization for five seconds: 12%/0%; one minute: 9%",
            )
            .unwrap();
        assert_eq!(parsed, json!({ "usage": 12 }));
    }

    #[test]
    fn test_unknown_command_has_no_rule() {
        assert!(BuiltinParser
            .parse(Vendor::Huawei, "display interface brief", "GE1/0/1 up up")
            .is_none());
    }

    #[test]
    fn test_version_extraction() {
        let output = "Huawei Versatile Routing Platform Software\n\
            VRP (R) software, Version 8.180 (CE6850 V200R005C10SPC800)";
        let parsed = BuiltinParser
            .parse(Vendor::Huawei, "display version", output)
            .unwrap();
        assert_eq!(parsed, json!({ "version": "8.180" }));
    }

    #[test]
    fn test_parser_panic_degrades_to_raw_text() {
        struct PanickingParser;
        impl ResultParser for PanickingParser {
            fn parse(&self, _: Vendor, _: &str, _: &str) -> Option<Value> {
                panic!("rule table corrupted")
            }
        }

        let result = parse_block(&PanickingParser, Vendor::Huawei, "display cpu-usage", "37%");
        assert!(result.is_none());
    }
}
