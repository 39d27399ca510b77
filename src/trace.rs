use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the global subscriber, `levels` accepts anything `EnvFilter`
/// understands, e.g. `info` or `kvrocks_exporter=debug,resp=trace`.
pub fn init(color: bool, format: LogFormat, levels: &str) {
    let filter = EnvFilter::try_new(levels).unwrap_or_else(|err| {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("invalid log level {levels:?}, {err}, fallback to info");
        }

        EnvFilter::new("info")
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout);

    let result = match format {
        LogFormat::Txt => builder.with_ansi(color).try_init(),
        LogFormat::Json => builder.with_ansi(false).json().flatten_event(true).try_init(),
    };

    if let Err(err) = result {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("install tracing subscriber failed, {err}");
        }
    }
}
