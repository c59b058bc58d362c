//! Anwendungs-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass Klarton ohne Konfigurationsdatei
//! lauffaehig ist. Abtastrate, Blockgroesse und Sample-Format sind fest
//! und hier bewusst nicht einstellbar.

use klarton_audio::{PipelineSettings, SuppressorSettings};
use klarton_observability::{log_format_gueltig, log_level_gueltig};
use serde::{Deserialize, Serialize};

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KlartonConfig {
    /// Geraeteauswahl
    pub geraete: GeraeteEinstellungen,
    /// Parameter der Rauschunterdrueckung
    pub unterdrueckung: SuppressorSettings,
    /// Stop-Timeout und Fallback der Pipeline
    pub pipeline: PipelineSettings,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Geraeteauswahl per Name. Leer = automatisch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeraeteEinstellungen {
    /// Eingabegeraet (leer = Standard-Eingabe des Hosts)
    pub eingabe: Option<String>,
    /// Ausgabegeraet (leer = erstes virtuelles Mikrofon)
    pub ausgabe: Option<String>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl KlartonConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.unterdrueckung.validate()?;
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klarton_audio::{FallbackPolicy, NoiseEstimate};

    #[test]
    fn standard_config_ist_valide() {
        let cfg = KlartonConfig::default();
        assert!(cfg.validieren().is_ok());
        assert!(cfg.geraete.eingabe.is_none());
        assert_eq!(cfg.unterdrueckung.fft_size, 1024);
        assert_eq!(cfg.pipeline.stop_timeout_ms, 2000);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [geraete]
            eingabe = "USB Mikrofon"
            ausgabe = "CABLE Input (VB-Audio Virtual Cable)"

            [unterdrueckung]
            prop_decrease = 0.9
            noise_estimate = "sitzung"

            [pipeline]
            stop_timeout_ms = 500
            fallback = "letzter_block"
        "#;
        let cfg: KlartonConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.geraete.eingabe.as_deref(), Some("USB Mikrofon"));
        assert_eq!(cfg.unterdrueckung.noise_estimate, NoiseEstimate::Sitzung);
        assert_eq!(cfg.pipeline.fallback, FallbackPolicy::LetzterBlock);
        assert_eq!(cfg.pipeline.stop_timeout_ms, 500);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.unterdrueckung.hop_size, 256);
        assert_eq!(cfg.logging.format, "text");
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn ungueltige_werte_abgelehnt() {
        let mut cfg = KlartonConfig::default();
        cfg.unterdrueckung.prop_decrease = 2.0;
        assert!(cfg.validieren().is_err());

        let mut cfg = KlartonConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn unendliche_glaettung_abgelehnt() {
        for toml in [
            "[unterdrueckung]\nfreq_mask_smooth_hz = inf",
            "[unterdrueckung]\ntime_mask_smooth_ms = inf",
            "[unterdrueckung]\nfreq_mask_smooth_hz = 2.0e6",
        ] {
            let cfg: KlartonConfig = toml::from_str(toml).unwrap();
            assert!(cfg.validieren().is_err(), "{toml}");
        }
    }

    #[test]
    fn fehlende_datei_gibt_standard() {
        let cfg = KlartonConfig::laden("/nicht/vorhanden/klarton.toml").unwrap();
        assert_eq!(cfg.pipeline.stop_timeout_ms, 2000);
    }
}
