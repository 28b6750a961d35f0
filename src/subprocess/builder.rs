use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::error::ProcessError;
use super::ProcessCommand;

pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                env: HashMap::new(),
                working_dir: None,
                timeout: None,
                stdin: None,
            },
        }
    }

    /// Split a shell-style command line (`npx eslint . --format json`) into
    /// program and arguments. No shell is involved in running it.
    pub fn from_command_line(line: &str) -> Result<Self, ProcessError> {
        let words = shell_words::split(line)
            .map_err(|_| ProcessError::InvalidCommandLine(line.to_string()))?;
        let (program, args) = words
            .split_first()
            .ok_or_else(|| ProcessError::InvalidCommandLine(line.to_string()))?;
        Ok(Self::new(program).args(args))
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    /// A `None` timeout leaves the process unbounded
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command.timeout = timeout;
        self
    }

    pub fn stdin(mut self, input: String) -> Self {
        self.command.stdin = Some(input);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line_splits_quoted_words() {
        let cmd = ProcessCommandBuilder::from_command_line("npm run deploy -- --message 'hello world'")
            .unwrap()
            .arg("--env")
            .build();
        assert_eq!(cmd.program, "npm");
        assert_eq!(
            cmd.args,
            vec!["run", "deploy", "--", "--message", "hello world", "--env"]
        );
    }

    #[test]
    fn test_from_command_line_rejects_empty_and_unbalanced() {
        assert!(ProcessCommandBuilder::from_command_line("   ").is_err());
        assert!(ProcessCommandBuilder::from_command_line("echo 'open").is_err());
    }
}
