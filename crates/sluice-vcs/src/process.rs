//! External tool invocation.
//!
//! Every backend shells out through [`ToolCommand`], which enforces one
//! discipline for all of them:
//!
//! - the working directory is always set explicitly
//! - stdin is the null device, never the daemon's own input
//! - stdout and stderr are captured together, in the order the tool wrote them
//! - a launch failure, an I/O failure around the child process, or a non-zero
//!   exit is a `VcsError::ToolExecution`, logged with whatever was captured
//!
//! There are no retries: one failed invocation is one reported failure.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sluice_core::{Result, VcsError};
use tracing::{debug, warn};

/// A single invocation of a backend command-line tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    dir: PathBuf,
}

impl ToolCommand {
    /// Creates a command for `program` running in `dir`.
    pub fn new(program: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: dir.into(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Returns the program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the directory the tool runs in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Short tool name for errors and logs (`/usr/bin/cvs` → `cvs`).
    fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }

    /// Runs the tool and returns its combined stdout/stderr.
    ///
    /// # Errors
    ///
    /// `VcsError::ToolExecution` if the tool cannot be started or exits
    /// with a non-zero status.
    pub fn output(&self) -> Result<Vec<u8>> {
        let tool = self.tool_name();

        debug!(
            tool = %tool,
            dir = %self.dir.display(),
            args = ?self.args,
            "running tool"
        );

        let (mut reader, writer) =
            io::pipe().map_err(|e| self.launch_failed(&tool, e))?;
        let stdout = writer
            .try_clone()
            .map_err(|e| self.launch_failed(&tool, e))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(writer);

        let mut child = cmd.spawn().map_err(|e| self.launch_failed(&tool, e))?;

        // The command still owns both write ends of the pipe. They must be
        // closed here or the read below never sees EOF.
        drop(cmd);

        let mut output = Vec::new();
        let read = reader.read_to_end(&mut output);
        let status = child.wait().map_err(|e| self.launch_failed(&tool, e))?;
        read.map_err(|e| self.launch_failed(&tool, e))?;

        if !status.success() {
            let text = String::from_utf8_lossy(&output).into_owned();
            warn!(
                tool = %tool,
                dir = %self.dir.display(),
                status = ?status.code(),
                "tool failed, see output below\n{}",
                text
            );
            return Err(VcsError::tool(tool, status.code(), text));
        }

        Ok(output)
    }

    /// Logs an I/O failure around the tool's process and reports it as a
    /// tool execution error with no exit status.
    fn launch_failed(&self, tool: &str, e: io::Error) -> VcsError {
        warn!(
            tool = %tool,
            dir = %self.dir.display(),
            error = %e,
            "failed to run tool"
        );
        VcsError::tool_launch(tool, e)
    }

    /// Runs the tool, discarding its output on success.
    pub fn run(&self) -> Result<()> {
        self.output().map(|_| ())
    }
}
