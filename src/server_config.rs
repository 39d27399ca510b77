use crate::exporter::Error;
use crate::metric::Metric;

/// Exported `CONFIG GET *` entries
const CONFIG_METRICS: [(&str, &str); 1] = [(
    "maxclients",
    "The value of the maxclients configuration directive",
)];

#[derive(Debug, Default)]
pub struct ServerConfig {
    /// number of databases, 1 if the server doesn't tell
    pub databases: u64,
    pub metrics: Vec<Metric>,
}

/// Decode the flat `[key, value, key, value, ...]` reply of `CONFIG GET *`.
pub fn extract_config_metrics(config: &[String]) -> Result<ServerConfig, Error> {
    if config.len() % 2 != 0 {
        return Err(Error::InvalidConfig(config.len()));
    }

    let mut databases = 1;
    let mut metrics = Vec::with_capacity(CONFIG_METRICS.len());
    for pair in config.chunks_exact(2) {
        let (key, value) = (pair[0].as_str(), pair[1].as_str());

        if key == "databases" {
            match value.parse::<u64>() {
                Ok(value) => databases = value,
                Err(err) => {
                    debug!(message = "invalid databases config", value, %err);
                }
            }
            continue;
        }

        let Some((_, desc)) = CONFIG_METRICS.iter().find(|(name, _)| *name == key) else {
            continue;
        };

        if let Ok(value) = value.parse::<f64>() {
            metrics.push(Metric::gauge(
                format!("config_{}", key.replace('-', "_")),
                *desc,
                value,
            ));
        }
    }

    Ok(ServerConfig { databases, metrics })
}
