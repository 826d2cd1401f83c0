use anyhow::{anyhow, Context};
use serde_json::json;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

impl Error {
    /// Referenced documents that are absent are considered already gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied)
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound(path) => json!({
                "message": "document not found",
                "type": "not-found",
                "path": path,
            }),
            Error::Transient(msg) => json!({
                "message": msg,
                "type": "unavailable",
            }),
            Error::InvalidArgument(msg) => json!({
                "message": msg,
                "type": "invalid-argument",
            }),
            Error::Malformed(msg) => json!({
                "message": msg,
                "type": "malformed",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let message = || {
            String::from(
                data.get("message")
                    .and_then(|msg| msg.as_str())
                    .unwrap_or(""),
            )
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(message()),
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound(String::from(
                    data.get("path")
                        .and_then(|p| p.as_str())
                        .ok_or_else(|| anyhow!("error is a not-found without a path"))?,
                )),
                "unavailable" => Error::Transient(message()),
                "invalid-argument" => Error::InvalidArgument(message()),
                "malformed" => Error::Malformed(message()),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_what_it_emits() {
        for err in [
            Error::Unknown(String::from("boom")),
            Error::PermissionDenied,
            Error::NotFound(String::from("forums/f1")),
            Error::Transient(String::from("deadline exceeded")),
            Error::InvalidArgument(String::from("no uid")),
            Error::Malformed(String::from("posts/p1")),
        ] {
            assert_eq!(Error::parse(&err.contents()).unwrap(), err);
        }
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(Error::parse(br#"{"type": "teapot"}"#).is_err());
        assert!(Error::parse(br#"{"type": "not-found"}"#).is_err());
        assert!(Error::parse(b"not json").is_err());
    }
}
