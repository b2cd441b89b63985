//! Input syntax: quote-aware scanning, tokenisation and prefix parsing.
//!
//! All scanners treat single quotes, double quotes and backslash escapes the
//! same way: a `|` inside quotes is data, not an operator.

use crate::classify::leading_token;
use crate::error::Failure;
use crate::remote::DispatchStrategy;
use memchr::memchr;

/// Marker for built-in internal commands.
pub const INTERNAL_PREFIX: char = '/';

/// Marker for device routing.
pub const DEVICE_PREFIX: char = '!';

/// Long and short force prefixes.
pub const FORCE_PREFIXES: [&str; 2] = ["/force", "/f"];

/// Raw input plus derived fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInput {
    pub raw: String,
    /// Case-folded leading token.
    pub name: Option<String>,
    /// Quote-aware argument list (after the leading token).
    pub args: Vec<String>,
    /// Contains a quote character.
    pub is_quoted: bool,
    /// Contains a pipe operator outside quotes.
    pub has_pipe: bool,
}

impl CommandInput {
    pub fn parse(raw: &str) -> Self {
        let tokens = tokenize(raw);
        Self {
            raw: raw.to_string(),
            name: leading_token(raw),
            args: tokens.into_iter().skip(1).collect(),
            is_quoted: raw.contains('"') || raw.contains('\''),
            has_pipe: has_unquoted_pipe(raw),
        }
    }
}

/// Scanner state shared by the quote-aware helpers.
#[derive(Default)]
struct QuoteState {
    in_single: bool,
    in_double: bool,
    escaped: bool,
}

impl QuoteState {
    /// Feed one char; returns true when it is outside any quote and unescaped.
    fn step(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match c {
            '\\' if !self.in_single => {
                self.escaped = true;
                false
            }
            '\'' if !self.in_double => {
                self.in_single = !self.in_single;
                false
            }
            '"' if !self.in_single => {
                self.in_double = !self.in_double;
                false
            }
            _ => !self.in_single && !self.in_double,
        }
    }

    fn is_open(&self) -> bool {
        self.in_single || self.in_double
    }
}

/// Check for a `|` operator outside quotes. `||` is a logical OR, not a pipe.
pub fn has_unquoted_pipe(cmd: &str) -> bool {
    if memchr(b'|', cmd.as_bytes()).is_none() {
        return false;
    }
    split_pipeline(cmd).map(|s| s.len() > 1).unwrap_or(true)
}

/// Split on unquoted `|`.
///
/// Returns `Err` for an unterminated quote or an empty segment. `||` is kept
/// inside the segment.
pub fn split_pipeline(cmd: &str) -> Result<Vec<String>, Failure> {
    let chars: Vec<char> = cmd.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut state = QuoteState::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let outside = state.step(c);
        if outside && c == '|' {
            if chars.get(i + 1) == Some(&'|') {
                current.push_str("||");
                i += 2;
                continue;
            }
            segments.push(std::mem::take(&mut current));
            i += 1;
            continue;
        }
        current.push(c);
        i += 1;
    }

    if state.is_open() {
        return Err(Failure::malformed(
            "Unterminated quote in pipeline",
            "close the quote or escape it",
        ));
    }
    segments.push(current);

    let segments: Vec<String> = segments.into_iter().map(|s| s.trim().to_string()).collect();
    if segments.len() > 1 && segments.iter().any(|s| s.is_empty()) {
        return Err(Failure::malformed(
            "Empty pipeline segment",
            "every '|' needs a command on both sides",
        ));
    }
    Ok(segments)
}

/// Quote-aware whitespace tokenizer. Quotes are removed from tokens.
pub fn tokenize(cmd: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    has_token = true;
                }
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

/// Strip a force prefix, returning the underlying command.
///
/// `Some(Err(_))` means the prefix was present without a command.
pub fn strip_force_prefix(input: &str) -> Option<Result<&str, Failure>> {
    let trimmed = input.trim_start();
    for prefix in FORCE_PREFIXES {
        let Some(rest) = trimmed.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            return Some(Err(Failure::malformed(
                "Force prefix without a command",
                "usage: /force <command>",
            )));
        }
        if rest.starts_with(char::is_whitespace) {
            let command = rest.trim();
            if command.is_empty() {
                return Some(Err(Failure::malformed(
                    "Force prefix without a command",
                    "usage: /force <command>",
                )));
            }
            return Some(Ok(command));
        }
    }
    None
}

/// Parsed device-routing target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRoute {
    /// Machine or group alias.
    pub alias: String,
    /// Optional dispatch strategy for groups.
    pub strategy: Option<DispatchStrategy>,
    /// The inner command to run remotely.
    pub command: String,
}

/// Parse `!<alias>[:<strategy>] <command>`.
///
/// Returns `None` when the input is not device syntax.
pub fn parse_device_route(input: &str) -> Option<Result<DeviceRoute, Failure>> {
    let rest = input.trim_start().strip_prefix(DEVICE_PREFIX)?;
    let usage = "usage: !<alias>[:<strategy>] <command>";

    let mut parts = rest.splitn(2, char::is_whitespace);
    let target = parts.next().unwrap_or_default();
    let command = parts.next().map(str::trim).unwrap_or_default();

    if target.is_empty() || command.is_empty() {
        return Some(Err(Failure::malformed("Incomplete device route", usage)));
    }

    let (alias, strategy) = match target.split_once(':') {
        Some((alias, strategy)) => match strategy.parse::<DispatchStrategy>() {
            Ok(s) => (alias, Some(s)),
            Err(e) => return Some(Err(Failure::malformed(e, usage))),
        },
        None => (target, None),
    };

    if alias.is_empty() {
        return Some(Err(Failure::malformed("Missing device alias", usage)));
    }

    Some(Ok(DeviceRoute {
        alias: alias.to_string(),
        strategy,
        command: command.to_string(),
    }))
}

/// Parsed `/name args…` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalInvocation {
    /// Lower-cased command name without the prefix.
    pub name: String,
    pub args: Vec<String>,
}

/// Parse an internal command. `None` when the input lacks the prefix.
pub fn parse_internal(input: &str) -> Option<InternalInvocation> {
    let rest = input.trim().strip_prefix(INTERNAL_PREFIX)?;
    let mut tokens = tokenize(rest).into_iter();
    let name = tokens.next().unwrap_or_default().to_lowercase();
    Some(InternalInvocation {
        name,
        args: tokens.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_quotes() {
        let segs = split_pipeline("echo 'a|b' | grep \"x|y\" | wc -l").unwrap();
        assert_eq!(segs, vec!["echo 'a|b'", "grep \"x|y\"", "wc -l"]);
    }

    #[test]
    fn test_split_keeps_logical_or() {
        let segs = split_pipeline("test -f x || echo missing").unwrap();
        assert_eq!(segs.len(), 1);
        assert!(!has_unquoted_pipe("test -f x || echo missing"));
    }

    #[test]
    fn test_split_escaped_pipe() {
        let segs = split_pipeline(r"echo a\|b").unwrap();
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn test_split_rejects_empty_segment() {
        assert!(matches!(
            split_pipeline("ls | | wc"),
            Err(Failure::Malformed { .. })
        ));
        assert!(split_pipeline("ls |").is_err());
    }

    #[test]
    fn test_split_rejects_unterminated_quote() {
        assert!(split_pipeline("echo 'abc | wc").is_err());
    }

    #[test]
    fn test_has_unquoted_pipe() {
        assert!(has_unquoted_pipe("ls | wc"));
        assert!(!has_unquoted_pipe("echo 'a | b'"));
        assert!(!has_unquoted_pipe("ls -la"));
    }

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"grep "hello world" 'a b' c\ d"#),
            vec!["grep", "hello world", "a b", "c d"]
        );
        assert_eq!(tokenize("  "), Vec::<String>::new());
        assert_eq!(tokenize("echo ''"), vec!["echo", ""]);
    }

    #[test]
    fn test_command_input_fields() {
        let input = CommandInput::parse("GREP -i 'foo bar' | wc");
        assert_eq!(input.name.as_deref(), Some("grep"));
        assert!(input.is_quoted);
        assert!(input.has_pipe);
        assert_eq!(input.args[0], "-i");
        assert_eq!(input.args[1], "foo bar");
    }

    #[test]
    fn test_force_prefix_forms() {
        assert_eq!(strip_force_prefix("/force rm -rf /").unwrap().unwrap(), "rm -rf /");
        assert_eq!(strip_force_prefix("/f ls").unwrap().unwrap(), "ls");
        assert!(strip_force_prefix("/f").unwrap().is_err());
        assert!(strip_force_prefix("/force   ").unwrap().is_err());
        assert!(strip_force_prefix("/foo bar").is_none());
        assert!(strip_force_prefix("/fix").is_none());
        assert!(strip_force_prefix("ls").is_none());
    }

    #[test]
    fn test_device_route_parse() {
        let route = parse_device_route("!prod rm -rf /").unwrap().unwrap();
        assert_eq!(route.alias, "prod");
        assert_eq!(route.strategy, None);
        assert_eq!(route.command, "rm -rf /");

        let route = parse_device_route("!web:round_robin uptime").unwrap().unwrap();
        assert_eq!(route.alias, "web");
        assert_eq!(route.strategy, Some(DispatchStrategy::RoundRobin));
    }

    #[test]
    fn test_device_route_errors() {
        assert!(parse_device_route("!prod").unwrap().is_err());
        assert!(parse_device_route("! ls").unwrap().is_err());
        assert!(parse_device_route("!web:warp ls").unwrap().is_err());
        assert!(parse_device_route("!:broadcast ls").unwrap().is_err());
        assert!(parse_device_route("ls").is_none());
    }

    #[test]
    fn test_parse_internal() {
        let inv = parse_internal("/Grep 'foo bar'").unwrap();
        assert_eq!(inv.name, "grep");
        assert_eq!(inv.args, vec!["foo bar"]);
        assert!(parse_internal("ls").is_none());
    }
}
