//! Error types for FreeCAD RPC operations.

use thiserror::Error;

/// Result type for FreeCAD RPC operations.
pub type FreeCadResult<T> = Result<T, FreeCadError>;

/// Errors from the XML-RPC codec.
#[derive(Debug, Error)]
pub enum XmlRpcError {
    /// The document is not a well-formed XML-RPC message.
    #[error("malformed XML-RPC document: {message}")]
    Malformed {
        /// Description of what's wrong.
        message: String,
    },

    /// The server answered with a `<fault>`.
    #[error("fault {code}: {message}")]
    Fault {
        /// `faultCode` member.
        code: i64,
        /// `faultString` member.
        message: String,
    },
}

impl XmlRpcError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Errors that can occur while talking to the FreeCAD addon.
#[derive(Debug, Error)]
pub enum FreeCadError {
    /// The HTTP request failed or returned an error status.
    #[error("request to FreeCAD at {url} failed: {source}")]
    Transport {
        /// Endpoint URL.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The call was answered with a fault or an unreadable document.
    #[error("RPC '{method}' failed: {source}")]
    Rpc {
        /// Remote method name.
        method: String,
        /// Codec or fault error.
        #[source]
        source: XmlRpcError,
    },

    /// The call succeeded but returned a value of the wrong shape.
    #[error("RPC '{method}' returned an unexpected result: {message}")]
    UnexpectedResult {
        /// Remote method name.
        method: String,
        /// Description of what's wrong.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_includes_string() {
        let error = FreeCadError::Rpc {
            method: "create_object".to_string(),
            source: XmlRpcError::Fault {
                code: 1,
                message: "<class 'NameError'>".to_string(),
            },
        };
        let msg = error.to_string();
        assert!(msg.contains("create_object"));
        assert!(msg.contains("NameError"));
    }
}
