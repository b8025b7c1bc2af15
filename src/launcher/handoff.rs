//! Transfer of control to the downstream service.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use crate::config::PORT_ENV_VAR;
use crate::launcher::{LaunchArgs, LaunchError};

/// Environment variable naming the downstream service executable.
pub const SERVER_ENV_VAR: &str = "FREECAD_MCP_SERVER";

/// Binary started when [`SERVER_ENV_VAR`] is unset, looked up next to the launcher.
pub const DEFAULT_SERVER_BIN: &str = "freecad-mcp";

/// Starts the downstream service with the launcher's pass-through arguments.
pub trait Handoff {
    /// Hands control to the service, which must bind `args.port()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the service could not be started.
    fn hand_off(&self, args: &LaunchArgs) -> Result<(), LaunchError>;
}

impl<T: Handoff + ?Sized> Handoff for &T {
    fn hand_off(&self, args: &LaunchArgs) -> Result<(), LaunchError> {
        (**self).hand_off(args)
    }
}

/// Replaces the launcher with the service process.
///
/// On Unix the launcher's process image is replaced (`exec`), so a successful
/// hand-off never returns. Elsewhere the service is run as a child and the
/// launcher waits for it.
#[derive(Debug, Clone)]
pub struct ExecHandoff {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ExecHandoff {
    /// Runs `program`, inserting `leading_args` before the forwarded ones.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Resolves the service from [`SERVER_ENV_VAR`], or the `freecad-mcp`
    /// binary installed next to the launcher, running it with the SSE transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the launcher's own path cannot be determined.
    pub fn from_env() -> Result<Self, LaunchError> {
        let program = match std::env::var_os(SERVER_ENV_VAR) {
            Some(program) if !program.is_empty() => PathBuf::from(program),
            _ => {
                let exe = std::env::current_exe().map_err(|source| LaunchError::Handoff {
                    program: PathBuf::from(DEFAULT_SERVER_BIN),
                    source,
                })?;
                exe.with_file_name(format!(
                    "{DEFAULT_SERVER_BIN}{}",
                    std::env::consts::EXE_SUFFIX
                ))
            }
        };

        Ok(Self::new(
            program,
            vec![OsString::from("--transport"), OsString::from("sse")],
        ))
    }

    /// The executable that will be started.
    #[must_use]
    pub const fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Builds the service command.
    ///
    /// The forwarded tokens follow the leading arguments unchanged. The
    /// resolved port is also exported as [`PORT_ENV_VAR`], which the service
    /// prefers over its config file, so a port that came from the launcher's
    /// default is the one the service binds.
    #[must_use]
    pub fn command(&self, args: &LaunchArgs) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(args.passthrough())
            .env(PORT_ENV_VAR, args.port());
        command
    }
}

impl Handoff for ExecHandoff {
    #[cfg(unix)]
    fn hand_off(&self, args: &LaunchArgs) -> Result<(), LaunchError> {
        use std::os::unix::process::CommandExt;

        tracing::debug!(
            program = %self.program.display(),
            args = ?args.passthrough(),
            port = ?args.port(),
            "Executing service"
        );
        let source = self.command(args).exec();
        Err(LaunchError::Handoff {
            program: self.program.clone(),
            source,
        })
    }

    #[cfg(not(unix))]
    fn hand_off(&self, args: &LaunchArgs) -> Result<(), LaunchError> {
        tracing::debug!(
            program = %self.program.display(),
            args = ?args.passthrough(),
            port = ?args.port(),
            "Running service"
        );
        let status = self
            .command(args)
            .status()
            .map_err(|source| LaunchError::Handoff {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(LaunchError::ServiceFailed {
                program: self.program.clone(),
                code: status.code(),
            })
        }
    }
}
