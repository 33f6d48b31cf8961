use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Draftboard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on existence probes when searching for an available
/// export path. One storage round-trip per candidate.
pub const PATH_RETRY_BOUND: usize = 99;

/// How long a transient status message is shown before reverting.
pub const STATUS_REVERT: Duration = Duration::from_millis(1000);

/// Icon shown on a diagram view before its content is ready.
pub const DEFAULT_ICON: &str = "diagram";

/// File name of the remote template manifest, relative to the catalog base url.
pub const TEMPLATE_MANIFEST: &str = "index.xml";

/// Tag applied to every template discovered through the manifest.
pub const BUILTIN_TAG: &str = "builtin";

/// Prefix for widget-tracker namespaces, one namespace per format key.
pub const NAMESPACE_PREFIX: &str = "diagram";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn retry_bound_is_two_digit() {
        // The candidate suffix is zero-padded to two digits, so the
        // bound must stay within -00..-98.
        assert!(PATH_RETRY_BOUND <= 99);
    }
}
