//! Blocked-command validation.
//!
//! First defense layer: a fully built shell command is matched against a
//! static table of dangerous patterns before any container is provisioned.
//! Container hardening is the second, independent layer.

use regex::Regex;
use serde::{Deserialize, Serialize};

use secure_exec_core::{types::BlockedCommand, Error, Result};

/// Static table of `(pattern, description, reason)`.
///
/// Patterns are compiled case-insensitively.
const BLOCKED_PATTERNS: &[(&str, &str, &str)] = &[
    (
        r"--no-preserve-root",
        "Recursive delete of the root filesystem",
        "Disabling root preservation only serves to destroy the filesystem",
    ),
    (
        r#"\brm\s+(?:-{1,2}[\w-]+\s+)*-(?:[a-z]*r[a-z]*|-recursive)\s+(?:-{1,2}[\w-]+\s+)*["']?(?:/\*?|~/?|\\?\$home/?)["']?(?:\s|;|&|\||$)"#,
        "Recursive delete of a root or home directory",
        "Recursive deletion of / or the home directory is destructive",
    ),
    (
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        "Fork bomb",
        "Self-replicating shell function exhausts process resources",
    ),
    (
        r"\bmkfs(?:\.[a-z0-9]+)?\b",
        "Filesystem formatting",
        "Creating a filesystem destroys existing data on the device",
    ),
    (
        r"\bdd\b[^;&|]*\bof=/dev/(?:sd|hd|nvme|xvd|vd|mmcblk|disk)",
        "Raw disk write",
        "Writing directly to a block device destroys its contents",
    ),
    (
        r#">\s*["']?/dev/(?:sd|hd|nvme|xvd|vd|mmcblk|disk)[a-z0-9]*"#,
        "Raw disk write",
        "Redirecting output to a block device destroys its contents",
    ),
    (
        r"\bsudo\b",
        "Privilege escalation",
        "sudo attempts to gain root privileges",
    ),
    (
        r"(?:^|[;&|]\s*)su(?:\s+(?:-|root)|\s*$)",
        "Privilege escalation",
        "su attempts to switch to the root user",
    ),
    (
        r"\b(?:doas|pkexec)\b",
        "Privilege escalation",
        "doas/pkexec attempt to gain elevated privileges",
    ),
    (
        r"\bchmod\s+(?:-[a-z]+\s+)*0?777\s+/(?:\s|$)",
        "World-writable root filesystem",
        "Making / world-writable removes all filesystem protections",
    ),
    (
        r"\bchmod\s+(?:-[a-z]+\s+)*(?:[ugoa]*\+[rwx]*s|[0-7]?[4-7][0-7]{3})\b",
        "Setuid/setgid bit",
        "Setting setuid or setgid bits enables privilege escalation",
    ),
    (
        r"\bchown\s+(?:-[a-z]+\s+)*-[a-z]*r[a-z]*\s+\S+\s+/(?:\s|$)",
        "Recursive ownership change of the root filesystem",
        "Changing ownership of / breaks the system",
    ),
    (
        r"\b(?:curl|wget)\b[^|;&]*\|\s*(?:sudo\s+)?(?:ba|z|da|k)?sh\b",
        "Remote script execution",
        "Piping downloaded content into a shell executes unreviewed code",
    ),
    (
        r"\b(?:shutdown|reboot|halt|poweroff)\b",
        "System shutdown",
        "Stopping or restarting the host is not permitted",
    ),
    (
        r"\binit\s+[06]\b",
        "System shutdown",
        "Changing to runlevel 0 or 6 stops or restarts the host",
    ),
    (
        r#">\s*["']?/etc/(?:passwd|shadow|sudoers|group)\b"#,
        "Account database overwrite",
        "Overwriting account databases can lock out or elevate users",
    ),
    (
        r"\bkill\s+-(?:9|kill)\s+-1\b",
        "Kill all processes",
        "Signalling every process terminates the whole system",
    ),
    (
        r"/(?:var/)?run/(?:docker|podman/podman)\.sock",
        "Container escape",
        "Access to the engine socket grants control of the host",
    ),
    (
        r"\bnsenter\b",
        "Container escape",
        "Entering host namespaces breaks sandbox isolation",
    ),
];

struct CompiledPattern {
    regex: Regex,
    source: String,
    description: String,
    reason: String,
}

/// One command that matched a blocked pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedCommandMatch {
    pub command: String,
    pub blocked: BlockedCommand,
}

/// Result of validating a batch of commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandValidation {
    pub valid: bool,
    pub blocked: Vec<BlockedCommandMatch>,
}

/// Pure, side-effect-free matcher for dangerous shell commands.
pub struct BlockedCommandValidator {
    patterns: Vec<CompiledPattern>,
}

impl BlockedCommandValidator {
    /// Create a validator with the static pattern table.
    pub fn new() -> Self {
        let patterns = BLOCKED_PATTERNS
            .iter()
            .map(|(pattern, description, reason)| CompiledPattern {
                regex: Regex::new(&format!("(?i){}", pattern)).unwrap(),
                source: pattern.to_string(),
                description: description.to_string(),
                reason: reason.to_string(),
            })
            .collect();
        Self { patterns }
    }

    /// Add a custom blocked pattern.
    pub fn with_pattern(
        mut self,
        pattern: &str,
        description: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Self> {
        let regex = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
            Error::SecurityPolicy(format!("Invalid blocked pattern '{}': {}", pattern, e))
        })?;
        self.patterns.push(CompiledPattern {
            regex,
            source: pattern.to_string(),
            description: description.into(),
            reason: reason.into(),
        });
        Ok(self)
    }

    /// Number of patterns in the table.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern the command matches, if any.
    pub fn is_command_blocked(&self, command: &str) -> Option<BlockedCommand> {
        let matched = self.patterns.iter().find(|p| p.regex.is_match(command))?;
        tracing::warn!(
            pattern = %matched.source,
            description = %matched.description,
            "Blocked command pattern detected"
        );
        Some(BlockedCommand::new(
            matched.description.clone(),
            matched.reason.clone(),
            matched.source.clone(),
        ))
    }

    /// Validate a batch of commands, collecting every match.
    pub fn validate_commands<S: AsRef<str>>(&self, commands: &[S]) -> CommandValidation {
        let blocked: Vec<BlockedCommandMatch> = commands
            .iter()
            .filter_map(|command| {
                let command = command.as_ref();
                self.is_command_blocked(command)
                    .map(|blocked| BlockedCommandMatch {
                        command: command.to_string(),
                        blocked,
                    })
            })
            .collect();

        CommandValidation {
            valid: blocked.is_empty(),
            blocked,
        }
    }
}

impl Default for BlockedCommandValidator {
    fn default() -> Self {
        Self::new()
    }
}
