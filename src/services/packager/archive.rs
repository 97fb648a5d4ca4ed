//! Building blocks of the self-extracting script.
//!
//! Each embedded file becomes one [`ArchiveBlock`]: a quoted here-document
//! bracketed by a delimiter that is unique within the script and never occurs
//! as a line of the file itself. Quoting the delimiter turns off every kind of
//! shell expansion inside the block, so the bytes between the markers are
//! written out untouched.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;

const TOKEN_PREFIX: &str = "TS2SH_EOF_";
const MAX_NAME_CHARS: usize = 40;

/// Hands out delimiter tokens for one packaging run.
///
/// The base token is derived from the file's path only, so the same file set
/// always produces the same tokens. A numeric suffix is added when the base
/// token is already taken or appears as a line of the content.
#[derive(Debug, Default)]
pub struct DelimiterAllocator {
    used: HashSet<String>,
}

impl DelimiterAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, path: &str, content: &[u8]) -> String {
        let base = base_token(path);
        let mut token = base.clone();
        let mut suffix = 0u32;
        while self.used.contains(&token) || contains_line(content, token.as_bytes()) {
            suffix += 1;
            token = format!("{}_{}", base, suffix);
        }
        self.used.insert(token.clone());
        token
    }
}

/// `TS2SH_EOF_<NAME>_<hash>` where NAME is the path upper-cased with every
/// non-alphanumeric character mapped to `_`.
pub fn base_token(path: &str) -> String {
    let name: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();

    let digest = Sha256::digest(path.as_bytes());
    let hash: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();

    format!("{}{}_{}", TOKEN_PREFIX, name, hash)
}

fn contains_line(content: &[u8], line: &[u8]) -> bool {
    content.split(|b| *b == b'\n').any(|l| l == line)
}

/// Single-quote a string for bash. Embedded single quotes become `'\''`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn target(path: &str) -> String {
    format!("\"$TEMP_DIR\"/{}", shell_quote(path))
}

/// One embedded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBlock {
    pub path: String,
    pub delimiter: String,
    pub content: Vec<u8>,
}

impl ArchiveBlock {
    pub fn new(path: impl Into<String>, content: Vec<u8>, delimiters: &mut DelimiterAllocator) -> Self {
        let path = path.into();
        let delimiter = delimiters.allocate(&path, &content);
        Self {
            path,
            delimiter,
            content,
        }
    }

    /// Append the extraction commands for this file to `out`.
    ///
    /// A here-document always ends its output with a newline, so content
    /// without a trailing newline is read into a variable and written back
    /// with that final character stripped.
    pub fn render(&self, out: &mut Vec<u8>) {
        if let Some((parent, _)) = self.path.rsplit_once('/') {
            let _ = writeln!(out, "mkdir -p {}", target(parent));
        }

        let dest = target(&self.path);
        if self.content.is_empty() {
            let _ = writeln!(out, ": > {}", dest);
        } else if self.content.ends_with(b"\n") {
            let _ = writeln!(out, "cat > {} <<'{}'", dest, self.delimiter);
            out.extend_from_slice(&self.content);
            let _ = writeln!(out, "{}", self.delimiter);
        } else {
            let _ = writeln!(
                out,
                "IFS= read -r -d '' __ts2sh_blob <<'{}' || true",
                self.delimiter
            );
            out.extend_from_slice(&self.content);
            out.push(b'\n');
            let _ = writeln!(out, "{}", self.delimiter);
            let _ = writeln!(out, "printf '%s' \"${{__ts2sh_blob%?}}\" > {}", dest);
        }
        out.push(b'\n');
    }
}

/// Everything needed to assemble a script.
#[derive(Debug)]
pub struct ScriptPlan<'a> {
    pub project_name: &'a str,
    pub generated_at: DateTime<Utc>,
    pub entry_point: &'a str,
    /// Entry block first, the rest in path order.
    pub blocks: &'a [ArchiveBlock],
    /// Install dependencies from an embedded `package.json` before running.
    pub install_dependencies: bool,
}

/// Assemble the final script bytes.
pub fn assemble(plan: &ScriptPlan<'_>) -> Vec<u8> {
    let mut out = Vec::new();

    let _ = write!(
        out,
        r#"#!/bin/bash
#
# TS2SH generated executable
# Project: {project}
# Generated on: {generated}
#
set -u

if ! command -v node >/dev/null 2>&1; then
    echo "Error: Node.js is not installed. Please install Node.js to run this executable." >&2
    exit 1
fi
"#,
        project = plan.project_name,
        generated = plan.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    if plan.install_dependencies {
        out.extend_from_slice(
            br#"
if ! command -v npm >/dev/null 2>&1; then
    echo "Error: npm is not installed. Please install npm to run this executable." >&2
    exit 1
fi
"#,
        );
    }

    out.extend_from_slice(
        br#"
TEMP_DIR=$(mktemp -d) || {
    echo "Error: could not create a temporary directory." >&2
    exit 1
}

cleanup() {
    rm -rf "$TEMP_DIR"
}
trap cleanup EXIT
trap 'exit 130' INT
trap 'exit 143' TERM

"#,
    );

    for block in plan.blocks {
        block.render(&mut out);
    }

    if plan.install_dependencies {
        out.extend_from_slice(
            br#"if ! (cd "$TEMP_DIR" && npm install --silent --no-audit --no-fund >/dev/null 2>&1); then
    echo "Error: failed to install dependencies." >&2
    exit 1
fi

"#,
        );
    }

    let _ = writeln!(out, "node {} \"$@\"", target(plan.entry_point));
    out.extend_from_slice(b"exit $?\n");
    out
}
