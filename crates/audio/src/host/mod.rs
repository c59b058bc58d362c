//! Schnittstelle zum Audio-Subsystem des Hosts
//!
//! Die Pipeline kennt nur das `AudioHost`-Trait: Geraete aufzaehlen und
//! einen Duplex-Stream oeffnen, der pro Block einen Callback aufruft.
//! - `CpalHost`: echte Hardware via cpal
//! - `SimulatedHost`: In-Process-Host fuer Tests und Demos

mod assembler;
mod cpal_host;
pub mod simulated;

use std::sync::Arc;

use crate::config::StreamConfig;
use crate::device::{AudioDevice, DeviceId};
use crate::error::AudioResult;
use crate::stats::PipelineStats;

pub use cpal_host::CpalHost;
pub use simulated::SimulatedHost;

/// Per-Block-Callback: interleaved Eingabe -> interleaved Ausgabe.
///
/// Laeuft im Echtzeit-Kontext des Hosts. Darf nicht blockieren.
pub type BlockCallback = Box<dyn FnMut(&[f32], &mut [f32]) + Send + 'static>;

/// Offener Duplex-Stream. Lebt im Worker-Thread der Pipeline.
pub trait DuplexStream {
    /// Stoppt den Stream und gibt alle Ressourcen frei
    fn close(self: Box<Self>) -> AudioResult<()>;
}

/// Audio-Subsystem des Hosts
pub trait AudioHost: Send + Sync {
    /// Name des Hosts fuer Logs
    fn name(&self) -> &str;

    /// Zaehlt alle Geraete in Host-Reihenfolge auf
    fn enumerate_devices(&self) -> AudioResult<Vec<AudioDevice>>;

    /// Vom Host gemeldetes Standard-Eingabegeraet
    fn default_input_device(&self) -> Option<DeviceId>;

    /// Oeffnet einen Duplex-Stream mit fester Abtastrate, Blockgroesse
    /// und f32-Format. Der Callback wird einmal pro Block aufgerufen.
    fn open_duplex_stream(
        &self,
        config: &StreamConfig,
        callback: BlockCallback,
        stats: Arc<PipelineStats>,
    ) -> AudioResult<Box<dyn DuplexStream>>;
}
