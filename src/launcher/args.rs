//! Launcher argument scanning.
//!
//! The launcher only understands `--port`. Every token, `--port` included,
//! is forwarded byte for byte; tokens need not be valid UTF-8.

use std::ffi::{OsStr, OsString};

use crate::launcher::LaunchError;

/// The one option the launcher recognises.
pub const PORT_FLAG: &str = "--port";

/// Arguments captured by the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    port: OsString,
    passthrough: Vec<OsString>,
}

impl LaunchArgs {
    /// Scans `tokens` left to right.
    ///
    /// Accepts `--port VALUE` and `--port=VALUE`; the last occurrence wins.
    /// Without either, `default_port` is used.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::MissingPortValue`] if `--port` is the final token.
    pub fn parse<I, S, D>(tokens: I, default_port: D) -> Result<Self, LaunchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
        D: AsRef<OsStr>,
    {
        let mut port = default_port.as_ref().to_os_string();
        let mut passthrough = Vec::new();
        let mut tokens = tokens.into_iter().map(Into::into);

        while let Some(token) = tokens.next() {
            if token == PORT_FLAG {
                let value = tokens.next().ok_or(LaunchError::MissingPortValue)?;
                port.clone_from(&value);
                passthrough.push(token);
                passthrough.push(value);
            } else {
                if let Some(value) = token
                    .to_str()
                    .and_then(|t| t.strip_prefix(PORT_FLAG))
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    port = OsString::from(value);
                }
                passthrough.push(token);
            }
        }

        Ok(Self { port, passthrough })
    }

    /// The port exactly as given.
    #[must_use]
    pub fn port(&self) -> &OsStr {
        &self.port
    }

    /// The port as a TCP port number, if it is one.
    #[must_use]
    pub fn port_number(&self) -> Option<u16> {
        self.port
            .to_str()?
            .trim()
            .parse()
            .ok()
            .filter(|port| *port != 0)
    }

    /// Tokens to forward to the service, in arrival order.
    #[must_use]
    pub fn passthrough(&self) -> &[OsString] {
        &self.passthrough
    }
}
