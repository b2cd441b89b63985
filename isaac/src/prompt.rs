//! Interactive confirmation prompts on the controlling terminal.

use dialoguer::Input;
use isaac_common::{ConfirmationRequest, PromptError, PromptKind, Prompter};
use std::io::IsTerminal;

/// Asks on stderr and reads the raw answer. Refuses to run without a tty, so
/// piped input can never answer a prompt.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn preamble(request: &ConfirmationRequest) -> Vec<String> {
        let mut lines = Vec::new();
        match &request.kind {
            PromptKind::ExecuteCorrected { original } => {
                lines.push(format!("  original:  {original}"));
                lines.push(format!("  corrected: {}", request.command));
            }
            PromptKind::ExecuteAnyway { advisory } => {
                for warning in &advisory.warnings {
                    lines.push(format!("  ! {warning}"));
                }
                for suggestion in &advisory.suggestions {
                    lines.push(format!("  - {suggestion}"));
                }
            }
            PromptKind::Unlock => {
                if let Some(required) = &request.required_response {
                    lines.push(format!("  type {required} exactly, anything else aborts"));
                }
            }
            PromptKind::Execute => {}
        }
        lines
    }

    fn prompt_text(request: &ConfirmationRequest) -> String {
        match request.kind {
            PromptKind::Unlock => request.message.clone(),
            _ => format!("{} [y/N]", request.message),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&self, request: &ConfirmationRequest) -> Result<String, PromptError> {
        if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
            return Err(PromptError::NotInteractive);
        }
        for line in Self::preamble(request) {
            eprintln!("{line}");
        }
        Input::<String>::new()
            .with_prompt(Self::prompt_text(request))
            .allow_empty(true)
            .report(false)
            .interact_text()
            .map_err(|e| {
                let message = e.to_string();
                match e {
                    dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                        PromptError::Closed
                    }
                    _ => PromptError::Io(message),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_common::{Tier, ValidationReport};

    #[test]
    fn test_preamble_lists_advisory_warnings() {
        let request = ConfirmationRequest {
            tier: Tier::Validate,
            command: "cp -r / /backup".to_string(),
            kind: PromptKind::ExecuteAnyway {
                advisory: ValidationReport {
                    safe: false,
                    warnings: vec!["targets the filesystem root".to_string()],
                    suggestions: vec![],
                },
            },
            message: "POTENTIALLY UNSAFE - Execute anyway: cp -r / /backup?".to_string(),
            token: None,
            required_response: None,
            target: None,
        };
        let lines = TerminalPrompter::preamble(&request);
        assert_eq!(lines, vec!["  ! targets the filesystem root".to_string()]);
        assert!(TerminalPrompter::prompt_text(&request).ends_with("[y/N]"));
    }

    #[test]
    fn test_unlock_prompt_has_no_yes_no_hint() {
        let request = ConfirmationRequest::unlock("rm -rf build");
        assert!(!TerminalPrompter::prompt_text(&request).contains("[y/N]"));
        assert_eq!(TerminalPrompter::preamble(&request).len(), 1);
    }
}
