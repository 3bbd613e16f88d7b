use std::{
    fmt::{self, Display},
    process::Command,
};

use log::{debug, error, info};

/// External command run after a push to the managed repository.
///
/// The command line is split on whitespace only; no shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAction {
    program: String,
    args: Vec<String>,
}

impl PostAction {
    /// `None` for a blank command line.
    pub fn parse(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_owned);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Runs the command to completion, logging its outcome and output.
    /// Returns whether it succeeded; failures are never propagated.
    pub fn run(&self) -> bool {
        info!("Running post-sync command: {}", self);
        match Command::new(&self.program).args(&self.args).output() {
            Ok(output) if output.status.success() => {
                info!("Post-sync command succeeded");
                debug!("stdout: {}", String::from_utf8_lossy(&output.stdout));
                true
            }
            Ok(output) => {
                error!(
                    "Post-sync command failed with {}\nstdout: {}\nstderr: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                false
            }
            Err(err) => {
                error!("Post-sync command {} could not be started: {}", self.program, err);
                false
            }
        }
    }
}

impl Display for PostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
