use http::StatusCode;

/// Error taxonomy surfaced by the SDK. Callers switch on these, never on
/// transport details (`kube::Error` is folded into one of these variants at
/// the store boundary).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} {1} not found")]
    NotFound(&'static str, String),

    #[error("{0} {1} already exists")]
    AlreadyExists(&'static str, String),

    #[error("conflicting write on {0} {1}: stale version token")]
    Conflict(&'static str, String),

    #[error("timed out waiting for {0} {1}")]
    Timeout(&'static str, String),

    #[error("cancelled while waiting for {0} {1}")]
    Cancelled(&'static str, String),

    #[error("{0} {1} denied: {2}")]
    Denied(&'static str, String, String),

    #[error("{1} is not the holder of {0} {2}")]
    NotHolder(&'static str, String, String),

    #[error("invariant violated on {0} {1}: {2}")]
    Invariant(&'static str, String, String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("integer overflow converting duration: {0}")]
    IntOverflow(#[from] std::num::TryFromIntError),
}

impl Error {
    /// Maps a `kube::Error` coming back from a store call into the taxonomy,
    /// given the entity kind and name the call was addressed to, matching
    /// `kube::Error::Api` by status code across every HTTP status the store
    /// can return.
    pub fn from_kube(kind: &'static str, name: impl Into<String>, err: kube::Error) -> Self {
        let name = name.into();
        match err {
            kube::Error::Api(api_err) => {
                if api_err.reason == "AlreadyExists" {
                    return Error::AlreadyExists(kind, name);
                }
                match StatusCode::from_u16(api_err.code) {
                    Ok(StatusCode::NOT_FOUND) => Error::NotFound(kind, name),
                    Ok(StatusCode::CONFLICT) => Error::Conflict(kind, name),
                    Ok(StatusCode::FORBIDDEN) => Error::Forbidden(api_err.message),
                    Ok(code) if code.is_server_error() => Error::Transient(format!(
                        "{kind} {name}: {} {}",
                        api_err.code, api_err.message
                    )),
                    _ => Error::Fatal(format!("{kind} {name}: {} {}", api_err.code, api_err.message)),
                }
            }
            other => Error::Transient(format!("{kind} {name}: {other}")),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(..))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(..))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(..))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
