//! Holder identity resolution (§4.4).
//!
//! Holder strings must be stable across a single logical caller's lifetime:
//! a transient holder breaks lease fairness and the mutex "only holder may
//! unlock" invariant.

use std::time::{SystemTime, UNIX_EPOCH};

/// Resolves the caller's holder identity: explicit override, then
/// `$HOSTNAME`, then a synthesized `sdk-<pid>-<nanos>` token.
///
/// The synthesized token carries the process id alongside a nanosecond
/// timestamp rather than just whole seconds: two hostname-less processes
/// started within the same second (common in local dev or minimal
/// containers) would otherwise resolve to the same holder string.
pub fn resolve_holder(explicit: Option<&str>) -> String {
    if let Some(h) = explicit {
        return h.to_string();
    }
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("sdk-{}-{nanos}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_wins() {
        assert_eq!(resolve_holder(Some("alice")), "alice");
    }

    #[test]
    fn falls_back_to_synthesized_token_without_hostname() {
        std::env::remove_var("HOSTNAME");
        let holder = resolve_holder(None);
        assert!(holder.starts_with("sdk-"));
    }

    #[test]
    fn falls_back_to_hostname() {
        std::env::set_var("HOSTNAME", "node-7");
        assert_eq!(resolve_holder(None), "node-7");
        std::env::remove_var("HOSTNAME");
    }
}
