//! # Worktodo — Work-Queue Intake
//!
//! Parses the assignment file a coordinator hands to workers, one task per
//! line:
//!
//! ```text
//! PRP=FEEE9DCD59A0855711265C1165C4C693,1,2,124647911,-1,77,0
//! DoubleCheck=E0F583710728343C61643028FBDBA0FB,70198703,75,1
//! Cert=B2EE67DC0A514753E488794C9DD6F6BD,1,2,82997591,-1,162105
//! ```
//!
//! `PRPDC` aliases `PRP` and `Test` aliases `DoubleCheck`. The leading
//! 32-hex-digit token is the assignment ID; `N/A` and empty AIDs are
//! tolerated. The `1,2,<E>,-1` quadruple spells k·b^n+c = 1·2^E−1.
//! Unparseable lines (including exponents at or below 1000) are logged and
//! skipped, never fatal — the queue may contain directives meant for other
//! tools.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Prp,
    Ll,
    Cert,
}

/// One parsed worktodo assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub exponent: u32,
    /// Assignment ID (may be empty).
    pub aid: String,
    /// The verbatim worktodo line, used to delete the task on completion.
    pub line: String,
    /// Squaring count, for Cert tasks only.
    pub squarings: u32,
}

fn is_hex32(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a single worktodo line. Returns `None` for comments, blanks, and
/// lines this worker does not understand.
pub fn parse_line(line: &str) -> Option<Task> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (kind_str, rest) = line.split_once('=')?;
    let kind = match kind_str {
        "PRP" | "PRPDC" => TaskKind::Prp,
        "Test" | "DoubleCheck" => TaskKind::Ll,
        "Cert" => TaskKind::Cert,
        _ => return None,
    };

    let mut parts: Vec<&str> = rest.split(',').collect();

    if kind == TaskKind::Cert {
        if parts.len() != 6 || !is_hex32(parts[0]) {
            return None;
        }
        let aid = parts[0].to_string();
        if parts[1] != "1" || parts[2] != "2" || parts[4] != "-1" {
            return None;
        }
        let exponent: u32 = parts[3].parse().ok()?;
        let squarings: u32 = parts[5].parse().ok()?;
        if exponent <= 1000 || squarings <= 100 {
            return None;
        }
        return Some(Task {
            kind,
            exponent,
            aid,
            line: line.to_string(),
            squarings,
        });
    }

    if !parts.is_empty() && (parts[0] == "N/A" || parts[0].is_empty()) {
        parts.remove(0);
    }
    let mut aid = String::new();
    if !parts.is_empty() && is_hex32(parts[0]) {
        aid = parts[0].to_string();
        parts.remove(0);
    }

    let exp_str = if parts.len() >= 4 && parts[0] == "1" && parts[1] == "2" && parts[3] == "-1" {
        parts[2]
    } else {
        parts.first().copied().unwrap_or("")
    };
    let exponent: u32 = exp_str.parse().ok()?;
    if exponent <= 1000 {
        return None;
    }
    Some(Task {
        kind,
        exponent,
        aid,
        line: line.to_string(),
        squarings: 0,
    })
}

/// All tasks in a worktodo file, in file order. Ignored lines are logged.
pub fn tasks(path: &Path) -> Result<Vec<Task>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read worktodo file {}", path.display()))?;
    let mut out = Vec::new();
    for line in content.lines() {
        match parse_line(line) {
            Some(task) => out.push(task),
            None => {
                if !line.trim().is_empty() && !line.starts_with('#') {
                    warn!(line, "worktodo line ignored");
                }
            }
        }
    }
    Ok(out)
}

/// The best task to run next: the smallest-exponent Cert if any (certs are
/// urgent and short), otherwise the first PRP/LL in file order.
pub fn best_task(path: &Path) -> Result<Option<Task>> {
    let all = tasks(path)?;
    let best_cert = all
        .iter()
        .filter(|t| t.kind == TaskKind::Cert)
        .min_by_key(|t| t.exponent)
        .cloned();
    Ok(best_cert.or_else(|| all.into_iter().next()))
}

/// Remove a completed task's line from the file. Atomic rewrite; returns
/// whether a line was removed.
pub fn delete_task(path: &Path, task: &Task) -> Result<bool> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read worktodo file {}", path.display()))?;
    let mut removed = false;
    let mut kept: Vec<&str> = Vec::new();
    for line in content.lines() {
        if !removed && line.trim_end_matches(['\r', '\n']) == task.line {
            removed = true;
            continue;
        }
        kept.push(line);
    }
    if removed {
        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &rewritten)?;
        fs::rename(&tmp, path)?;
    }
    Ok(removed)
}
