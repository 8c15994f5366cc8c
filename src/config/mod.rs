use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sla: SlaSettings,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Knobs for the at-risk warning band. By default the band is the last 20%
/// of each deadline's window; `warning_window_minutes` switches to a fixed
/// lead time instead.
#[derive(Clone, Debug)]
pub struct SlaSettings {
    pub warning_fraction: f64,
    pub warning_window_minutes: Option<i64>,
}

impl Default for SlaSettings {
    fn default() -> Self {
        Self {
            warning_fraction: 0.2,
            warning_window_minutes: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let warning_fraction = env::var("SLA_WARNING_FRACTION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.2);
        let warning_window_minutes = env::var("SLA_WARNING_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            server: ServerConfig { host, port },
            sla: SlaSettings {
                warning_fraction,
                warning_window_minutes,
            },
        }
    }
}
