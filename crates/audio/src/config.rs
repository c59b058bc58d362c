//! Sitzungs- und Pipeline-Konfiguration
//!
//! Abtastrate, Blockgroesse und Sample-Format sind fest und nicht
//! konfigurierbar. Einstellbar sind nur Stop-Timeout und Fallback.

use serde::{Deserialize, Serialize};

use crate::device::{AudioDevice, DeviceId};

/// Feste Abtastrate jeder Sitzung in Hz
pub const SAMPLE_RATE: u32 = 44_100;
/// Feste Blockgroesse jeder Sitzung in Frames
pub const BLOCK_SIZE: usize = 1024;

/// Sample-Format des Duplex-Streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 32-bit Float, interleaved
    #[default]
    F32,
}

/// Unveraenderliche Konfiguration einer Sitzung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    input_device: DeviceId,
    output_device: DeviceId,
    input_channels: u16,
    output_channels: u16,
}

impl StreamConfig {
    /// Erstellt eine Konfiguration. Kanalzahlen von 0 werden auf 1 angehoben.
    pub fn new(
        input_device: DeviceId,
        output_device: DeviceId,
        input_channels: u16,
        output_channels: u16,
    ) -> Self {
        Self {
            input_device,
            output_device,
            input_channels: input_channels.max(1),
            output_channels: output_channels.max(1),
        }
    }

    /// Loest die Kanalzahlen aus den Faehigkeiten der Geraete auf
    pub fn for_devices(input: &AudioDevice, output: &AudioDevice) -> Self {
        Self::new(
            input.id.clone(),
            output.id.clone(),
            input.max_input_channels,
            output.max_output_channels,
        )
    }

    pub fn input_device(&self) -> &DeviceId {
        &self.input_device
    }

    pub fn output_device(&self) -> &DeviceId {
        &self.output_device
    }

    pub fn input_channels(&self) -> u16 {
        self.input_channels
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::F32
    }

    /// Budget eines Blocks in Millisekunden (≈ 23.2 ms)
    pub fn block_budget_ms(&self) -> f64 {
        BLOCK_SIZE as f64 * 1000.0 / SAMPLE_RATE as f64
    }
}

/// Was der Callback bei einem Blockfehler ausgibt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Stille ausgeben
    #[default]
    Stille,
    /// Letzten fehlerfreien Block wiederholen
    LetzterBlock,
}

/// Einstellungen der Pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Wie lange `stop()` auf den Worker wartet, bevor er aufgegeben wird
    pub stop_timeout_ms: u64,
    /// Ersatzausgabe bei Blockfehlern
    pub fallback: FallbackPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 2000,
            fallback: FallbackPolicy::Stille,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geraet(name: &str, ein: u16, aus: u16) -> AudioDevice {
        AudioDevice {
            index: 0,
            id: DeviceId::from(name),
            name: name.to_string(),
            max_input_channels: ein,
            max_output_channels: aus,
        }
    }

    #[test]
    fn kanalzahl_null_wird_eins() {
        let cfg = StreamConfig::new("a".into(), "b".into(), 0, 0);
        assert_eq!(cfg.input_channels(), 1);
        assert_eq!(cfg.output_channels(), 1);
    }

    #[test]
    fn kanaele_aus_geraeten() {
        let mic = geraet("Mic", 2, 0);
        let cable = geraet("VB-Cable", 0, 8);
        let cfg = StreamConfig::for_devices(&mic, &cable);
        assert_eq!(cfg.input_channels(), 2);
        assert_eq!(cfg.output_channels(), 8);
        assert_eq!(cfg.input_device().as_str(), "Mic");
    }

    #[test]
    fn feste_sitzungsparameter() {
        let cfg = StreamConfig::new("a".into(), "b".into(), 1, 1);
        assert_eq!(cfg.sample_rate(), 44_100);
        assert_eq!(cfg.block_size(), 1024);
        assert_eq!(cfg.sample_format(), SampleFormat::F32);
        assert!((cfg.block_budget_ms() - 23.22).abs() < 0.01);
    }

    #[test]
    fn pipeline_settings_aus_toml() {
        let s: PipelineSettings = toml::from_str(
            r#"
            fallback = "letzter_block"
        "#,
        )
        .unwrap();
        assert_eq!(s.fallback, FallbackPolicy::LetzterBlock);
        assert_eq!(s.stop_timeout_ms, 2000);
    }
}
