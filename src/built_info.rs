pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("KVROCKS_EXPORTER_GIT_HASH");
pub const RUSTC_VERSION: &str = env!("KVROCKS_EXPORTER_RUSTC_VERSION");

/// Set by the release pipeline
pub const BUILD_DATE: &str = match option_env!("KVROCKS_EXPORTER_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};
