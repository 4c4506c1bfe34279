//! Discrete-argv commands
//!
//! Arguments are always kept as a discrete vector and handed to the kernel
//! as-is. Nothing in this crate ever joins them into a shell string.

use async_process::Command as AsyncCommand;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// An external program plus its arguments
///
/// Unlike `async_process::Command` this is `Clone` and comparable, so the
/// same value can be logged, asserted on in tests and then spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl Command {
    /// A command with no arguments
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Start building a command for `program`
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandBuilder {
        CommandBuilder(Self::new(program))
    }

    /// Replace the program, keeping arguments and environment.
    ///
    /// Used to resolve a bare tool name against a configured tool directory.
    pub fn set_program<S: AsRef<OsStr>>(&mut self, program: S) -> &mut Self {
        self.program = program.as_ref().to_owned();
        self
    }

    /// The program to run
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments, excluding the program
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Extra environment variables, in the order they were added
    pub fn envs(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.envs.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Working directory, if one was set
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Program followed by arguments, lossily converted for logging and assertions
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    /// Convert into a spawnable `async_process::Command`
    ///
    /// On Unix the child leads a new process group so that the whole tree
    /// can be signalled when the command times out or is cancelled.
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args).envs(self.envs());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        AsyncCommand::from(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display only; quoting here never reaches a shell.
        let mut first = true;
        for word in self.argv() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if word.is_empty() || word.contains(char::is_whitespace) {
                write!(f, "{word:?}")?;
            } else {
                f.write_str(&word)?;
            }
        }
        Ok(())
    }
}

/// Chained construction of a [`Command`]
#[derive(Debug)]
pub struct CommandBuilder(Command);

impl CommandBuilder {
    /// Append one argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0
            .args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Set an environment variable for the child
    pub fn env<K: AsRef<OsStr>, V: AsRef<OsStr>>(mut self, key: K, val: V) -> Self {
        self.0
            .envs
            .push((key.as_ref().to_owned(), val.as_ref().to_owned()));
        self
    }

    /// Run the child in `dir`
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.0.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Finish building
    pub fn build(self) -> Command {
        self.0
    }
}
