use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `format` is `"json"` for structured output,
/// anything else gets the human-readable formatter.
pub fn init(service_name: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    tracing::info!(service = service_name, "logging initialized");
}
