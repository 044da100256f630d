// src/exit.rs
//! Process exit codes for `forgefix`.
//!
//! Provides a stable contract for scripts and automation.

use std::process::Termination;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ForgefixExit {
    /// Run completed and at least one attempted file succeeded (or none needed work).
    Success = 0,
    /// Generic error (IO, unexpected failure).
    Error = 1,
    /// Configuration missing or invalid.
    InvalidConfig = 2,
    /// A collaborator failure aborted the run (bad credentials, unreachable service).
    Fatal = 3,
    /// Files were attempted but none succeeded.
    NoSuccess = 4,
}

impl ForgefixExit {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn exit(self) -> ! {
        std::process::exit(self.code())
    }
}

impl Termination for ForgefixExit {
    fn report(self) -> std::process::ExitCode {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        std::process::ExitCode::from(self.code() as u8)
    }
}

impl From<anyhow::Result<()>> for ForgefixExit {
    fn from(res: anyhow::Result<()>) -> Self {
        match res {
            Ok(()) => Self::Success,
            Err(e) => {
                eprintln!("Error: {e:#}");
                Self::Error
            }
        }
    }
}
