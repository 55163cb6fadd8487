// Transcript segmentation
//
// Pure text processing: one raw transcript plus the ordered command list in,
// one cleaned block per command out. Never fails; output that cannot be
// located degrades to a bounded forward scan, and output that cleans down
// to nothing becomes an explicit sentinel.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::device::VendorProfile;

/// Block content for a command that ran but produced no text
pub const NO_OUTPUT_SENTINEL: &str = "No output returned.";

/// How many lines the fallback scan may consume when a command's echo
/// cannot be located
const FALLBACK_SCAN_LINES: usize = 50;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[()][0-9A-B]").unwrap());

/// Strip terminal artifacts from raw shell output: carriage returns,
/// backspace erasures, VT100 escapes, and pagination markers.
pub fn clean_output(text: &str, profile: &VendorProfile) -> String {
    let without_cr = text.replace('\r', "");

    // Backspaces first: vendors erase their own pagination marker with
    // BS/space runs, and resolving those reconstructs the intended text
    let mut resolved = String::with_capacity(without_cr.len());
    for ch in without_cr.chars() {
        if ch == '\u{8}' {
            resolved.pop();
        } else {
            resolved.push(ch);
        }
    }

    let mut cleaned = ANSI_ESCAPE.replace_all(&resolved, "").into_owned();

    // Residual markers from vendors that do not erase them
    for marker in profile.pagination_markers {
        cleaned = cleaned.replace(marker, "");
    }

    cleaned
}

/// Split one transcript into cleaned per-command blocks, in command order.
///
/// Each command's block runs from its echoed text to the next prompt-only
/// line (or the next command's echo, whichever comes first). A command whose
/// echo cannot be found gets a bounded forward scan from the last cursor.
pub fn segment(transcript: &str, commands: &[String], profile: &VendorProfile) -> Vec<String> {
    let cleaned = clean_output(transcript, profile);
    let lines: Vec<&str> = cleaned.lines().collect();

    let mut blocks = Vec::with_capacity(commands.len());
    let mut cursor = 0usize;

    for (i, command) in commands.iter().enumerate() {
        let next_command = commands.get(i + 1);

        let block = match find_echo(&lines, cursor, command) {
            Some(echo_idx) => {
                let start = echo_idx + 1;
                let end = block_end(&lines, start, next_command, profile);
                cursor = end;
                lines[start..end].join("\n")
            }
            None => {
                // Bounded forward scan from the last cursor, stopping at the
                // first prompt-only line
                let limit = (cursor + FALLBACK_SCAN_LINES).min(lines.len());
                let mut end = limit;
                for (idx, line) in lines.iter().enumerate().take(limit).skip(cursor) {
                    if profile.is_prompt_line(line) {
                        end = idx;
                        break;
                    }
                }
                let text = lines[cursor..end].join("\n");
                cursor = end;
                text
            }
        };

        let trimmed = block.trim();
        blocks.push(if trimmed.is_empty() {
            NO_OUTPUT_SENTINEL.to_string()
        } else {
            trimmed.to_string()
        });
    }

    blocks
}

fn find_echo(lines: &[&str], from: usize, command: &str) -> Option<usize> {
    lines
        .iter()
        .skip(from)
        .position(|line| line.contains(command))
        .map(|pos| pos + from)
}

fn block_end(
    lines: &[&str],
    start: usize,
    next_command: Option<&String>,
    profile: &VendorProfile,
) -> usize {
    for (idx, line) in lines.iter().enumerate().skip(start) {
        // A bare prompt or a prompt carrying the next echo both end the block
        if profile.is_prompt_line(line) || profile.is_prompt_prefixed(line) {
            return idx;
        }
        if let Some(next) = next_command {
            if line.contains(next.as_str()) {
                return idx;
            }
        }
    }
    lines.len()
}
