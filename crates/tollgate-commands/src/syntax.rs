use crate::error::CommandError;

/// Operator command prefix, as in `,exec heal`
pub const COMMAND_PREFIX: char = ',';

/// A parsed `,name parameters` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub parameters: String,
}

impl CommandInvocation {
    pub fn parse(syntax: &str) -> Result<Self, CommandError> {
        let invalid = || CommandError::InvalidSyntax(syntax.to_string());

        let body = syntax.trim().strip_prefix(COMMAND_PREFIX).ok_or_else(invalid)?;
        let (name, parameters) = match body.split_once(char::is_whitespace) {
            Some((name, parameters)) => (name, parameters.trim()),
            None => (body, ""),
        };

        if name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            name: name.to_string(),
            parameters: parameters.to_string(),
        })
    }
}
