use crate::types::{SpectralError, SpectralResult, ToolOutput};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// A command line program invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTool {
    program: String,
    args: Vec<String>,
}

impl ExternalTool {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Run a Python script; an existing `.py` file goes through `python`,
    /// anything else is taken as a program on PATH.
    pub fn script(python: &str, script: &str) -> Self {
        if script.ends_with(".py") && Path::new(script).is_file() {
            Self::new(python).arg(script)
        } else {
            Self::new(script)
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Shell-like rendering for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn run(&self) -> SpectralResult<ToolOutput> {
        self.execute(None)
    }

    /// Run with `input` written to the program's stdin
    pub fn run_with_input(&self, input: &str) -> SpectralResult<ToolOutput> {
        self.execute(Some(input))
    }

    fn execute(&self, input: Option<&str>) -> SpectralResult<ToolOutput> {
        let command = self.command_line();
        log::info!("Running: {}", command);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SpectralError::ExternalToolFailure {
                command: command.clone(),
                status: "not started".to_string(),
                output: e.to_string(),
            })?;

        if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(text.as_bytes())?;
        }

        let result = child.wait_with_output()?;
        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr);
        if !stderr.trim().is_empty() {
            output.push_str(&stderr);
        }
        if !output.trim().is_empty() {
            log::info!("{}", output.trim_end());
        }

        if !result.status.success() {
            return Err(SpectralError::ExternalToolFailure {
                command,
                status: result.status.to_string(),
                output,
            });
        }

        Ok(ToolOutput { command, output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_spaces() {
        let tool = ExternalTool::new("gdal_calc.py")
            .arg("--calc=(A-B)/(A+B)")
            .arg("--outfile=/tmp/my out.tif");
        assert_eq!(tool.command_line(), "gdal_calc.py --calc=(A-B)/(A+B) '--outfile=/tmp/my out.tif'");
    }

    #[test]
    fn test_script_on_path_runs_directly() {
        let tool = ExternalTool::script("python", "gdal_pansharpen.py");
        assert_eq!(tool.program(), "gdal_pansharpen.py");
        assert!(tool.arguments().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_output() {
        let err = ExternalTool::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .run()
            .unwrap_err();
        match err {
            SpectralError::ExternalToolFailure { command, output, .. } => {
                assert!(command.starts_with("sh -c"));
                assert!(output.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_is_forwarded() {
        let out = ExternalTool::new("cat").run_with_input("hello\n").unwrap();
        assert_eq!(out.output, "hello\n");
    }

    #[test]
    fn test_missing_program() {
        let err = ExternalTool::new("definitely-not-a-real-tool-name").run().unwrap_err();
        assert!(matches!(err, SpectralError::ExternalToolFailure { .. }));
    }
}
