//! Tool name to shell command mapping.
//!
//! Commands are built from request arguments here, before validation, so
//! the blocked-command check always sees the exact text the sandbox runs.

use base64::Engine;
use serde_json::Value;

use secure_exec_core::{Error, Result};

type CommandBuilder = fn(&str, &Value) -> Result<String>;

/// Static tool table.
const TOOL_COMMANDS: &[(&str, CommandBuilder)] = &[
    ("file-read", file_read),
    ("file-write", file_write),
    ("file-list", file_list),
    ("file-delete", file_delete),
    ("shell", verbatim),
    ("exec", verbatim),
    ("bash", verbatim),
];

/// Whether `tool` has an entry in the tool table.
pub fn is_mapped(tool: &str) -> bool {
    TOOL_COMMANDS.iter().any(|(name, _)| *name == tool)
}

/// Names of every mapped tool.
pub fn mapped_tools() -> impl Iterator<Item = &'static str> {
    TOOL_COMMANDS.iter().map(|(name, _)| *name)
}

/// Build the shell command for `tool`.
///
/// Unmapped tools fall back to a string `command` argument. With neither,
/// the request cannot be resolved and `Error::UnknownTool` is returned.
pub fn build_command(tool: &str, args: &Value) -> Result<String> {
    if let Some((_, builder)) = TOOL_COMMANDS.iter().find(|(name, _)| *name == tool) {
        return builder(tool, args);
    }

    match args.get("command").and_then(Value::as_str) {
        Some(command) => Ok(command.to_string()),
        None => Err(Error::unknown_tool(tool)),
    }
}

/// Double-quote `value` for `sh`, escaping every character special inside
/// double quotes.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn required_str<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        Error::invalid_request(format!(
            "Tool '{}' requires a string '{}' argument",
            tool, key
        ))
    })
}

fn flag(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn file_read(tool: &str, args: &Value) -> Result<String> {
    let path = required_str(tool, args, "path")?;
    Ok(format!("cat {}", shell_quote(path)))
}

fn file_write(tool: &str, args: &Value) -> Result<String> {
    let path = required_str(tool, args, "path")?;
    let content = required_str(tool, args, "content")?;

    // Content travels base64-encoded so it is never interpreted by the shell.
    let encoded = match args.get("encoding").and_then(Value::as_str) {
        Some("base64") => {
            base64::engine::general_purpose::STANDARD
                .decode(content)
                .map_err(|e| {
                    Error::invalid_request(format!("Invalid base64 content for '{}': {}", path, e))
                })?;
            content.to_string()
        }
        Some("utf8") | Some("utf-8") | None => {
            base64::engine::general_purpose::STANDARD.encode(content.as_bytes())
        }
        Some(other) => {
            return Err(Error::invalid_request(format!(
                "Unsupported encoding '{}' for tool '{}'",
                other, tool
            )))
        }
    };

    let redirect = if flag(args, "append") { ">>" } else { ">" };
    Ok(format!(
        "printf '%s' '{}' | base64 -d {} {}",
        encoded,
        redirect,
        shell_quote(path)
    ))
}

fn file_list(_tool: &str, args: &Value) -> Result<String> {
    let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
    Ok(format!("ls -la {}", shell_quote(path)))
}

fn file_delete(tool: &str, args: &Value) -> Result<String> {
    let path = required_str(tool, args, "path")?;
    let flags = if flag(args, "recursive") { "-rf" } else { "-f" };
    Ok(format!("rm {} {}", flags, shell_quote(path)))
}

fn verbatim(tool: &str, args: &Value) -> Result<String> {
    required_str(tool, args, "command").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_read() {
        let command = build_command("file-read", &json!({"path": "/etc/passwd"})).unwrap();
        assert_eq!(command, "cat \"/etc/passwd\"");
    }

    #[test]
    fn test_quoting_neutralizes_expansion() {
        let command =
            build_command("file-read", &json!({"path": "/tmp/$(whoami)\"`id`\\"})).unwrap();
        assert_eq!(command, "cat \"/tmp/\\$(whoami)\\\"\\`id\\`\\\\\"");
    }

    #[test]
    fn test_file_write_encodes_content() {
        let command = build_command(
            "file-write",
            &json!({"path": "notes.txt", "content": "sudo make me a sandwich"}),
        )
        .unwrap();
        assert_eq!(
            command,
            "printf '%s' 'c3VkbyBtYWtlIG1lIGEgc2FuZHdpY2g=' | base64 -d > \"notes.txt\""
        );

        let append = build_command(
            "file-write",
            &json!({"path": "log", "content": "eA==", "encoding": "base64", "append": true}),
        )
        .unwrap();
        assert_eq!(append, "printf '%s' 'eA==' | base64 -d >> \"log\"");
    }

    #[test]
    fn test_file_write_rejects_bad_input() {
        let bad_b64 = build_command(
            "file-write",
            &json!({"path": "x", "content": "not base64!", "encoding": "base64"}),
        );
        assert!(matches!(bad_b64, Err(Error::InvalidRequest(_))));

        let bad_encoding = build_command(
            "file-write",
            &json!({"path": "x", "content": "y", "encoding": "latin1"}),
        );
        assert!(matches!(bad_encoding, Err(Error::InvalidRequest(_))));

        let missing = build_command("file-write", &json!({"path": "x"}));
        assert!(matches!(missing, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_file_list_and_delete() {
        assert_eq!(build_command("file-list", &json!({})).unwrap(), "ls -la \".\"");
        assert_eq!(
            build_command("file-delete", &json!({"path": "build", "recursive": true})).unwrap(),
            "rm -rf \"build\""
        );
        assert_eq!(
            build_command("file-delete", &json!({"path": "a.txt"})).unwrap(),
            "rm -f \"a.txt\""
        );
    }

    #[test]
    fn test_shell_aliases_are_verbatim() {
        for tool in ["shell", "exec", "bash"] {
            let command = build_command(tool, &json!({"command": "ls | wc -l"})).unwrap();
            assert_eq!(command, "ls | wc -l");
        }
        assert!(matches!(
            build_command("shell", &json!({})),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_unmapped_tool_fallback() {
        assert!(!is_mapped("python"));
        let command = build_command("python", &json!({"command": "python3 -V"})).unwrap();
        assert_eq!(command, "python3 -V");

        let unknown = build_command("python", &json!({"script": "print(1)"}));
        assert!(matches!(unknown, Err(Error::UnknownTool(name)) if name == "python"));
    }

    #[test]
    fn test_mapped_tools() {
        let tools: Vec<&str> = mapped_tools().collect();
        assert!(tools.contains(&"file-read"));
        assert!(tools.contains(&"bash"));
        assert_eq!(tools.len(), 7);
    }
}
