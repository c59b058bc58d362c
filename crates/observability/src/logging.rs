//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `KT_LOG_LEVEL`: Log-Level oder Filter-Direktiven, Standard: info
//! - `KT_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Umgebungsvariablen haben Vorrang vor den Werten aus der Konfiguration.

use tracing_subscriber::{fmt, EnvFilter};

const ENV_LEVEL: &str = "KT_LOG_LEVEL";
const ENV_FORMAT: &str = "KT_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Liest `KT_LOG_LEVEL` und `KT_LOG_FORMAT` aus der Umgebung, sonst
/// `level` / `format`. Ungueltige Filter fallen auf `info` zurueck.
/// Schlaegt fehl, wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(
    level: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter =
        EnvFilter::try_new(log_level_aus_env(level)).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format_aus_env(format).as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init(),
    }
}

/// Log-Level aus der Umgebung, sonst `standard`
pub fn log_level_aus_env(standard: &str) -> String {
    std::env::var(ENV_LEVEL).unwrap_or_else(|_| standard.to_string())
}

/// Log-Format aus der Umgebung, sonst `standard`
pub fn log_format_aus_env(standard: &str) -> String {
    std::env::var(ENV_FORMAT).unwrap_or_else(|_| standard.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    // Ein Test pro Variable, sonst laufen Setzen und Entfernen parallel
    #[test]
    fn log_level_aus_env_vorrang() {
        std::env::remove_var(ENV_LEVEL);
        assert_eq!(log_level_aus_env("warn"), "warn");
        std::env::set_var(ENV_LEVEL, "debug");
        assert_eq!(log_level_aus_env("warn"), "debug");
        std::env::remove_var(ENV_LEVEL);
    }

    #[test]
    fn log_format_aus_env_vorrang() {
        std::env::remove_var(ENV_FORMAT);
        assert_eq!(log_format_aus_env("text"), "text");
        std::env::set_var(ENV_FORMAT, "json");
        assert_eq!(log_format_aus_env("text"), "json");
        std::env::remove_var(ENV_FORMAT);
    }

    #[test]
    fn zweite_initialisierung_schlaegt_fehl() {
        // Der erste Aufruf kann scheitern, falls ein anderer Test schon
        // initialisiert hat; der zweite muss scheitern.
        let _ = logging_initialisieren("info", "text");
        assert!(logging_initialisieren("info", "text").is_err());
    }
}
