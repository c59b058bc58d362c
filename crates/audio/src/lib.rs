//! klarton-audio – Echtzeit-Rauschunterdrueckung
//!
//! Von einem Eingabegeraet (Mikrofon) auf ein Ausgabegeraet, typischerweise
//! ein virtuelles Mikrofon:
//! - Geraete-Katalog ueber das `AudioHost`-Trait (cpal oder simuliert)
//! - Spektrale Rauschunterdrueckung (Spectral Gating) pro Block
//! - Pipeline mit eigenem Worker-Thread und begrenztem Stop
//! - ControlFacade mit Status fuer die Oberflaeche

pub mod block;
pub mod config;
pub mod control;
pub mod device;
pub mod dsp;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod stats;

// Bequeme Re-Exporte der wichtigsten Typen
pub use block::BlockProcessor;
pub use config::{
    FallbackPolicy, PipelineSettings, SampleFormat, StreamConfig, BLOCK_SIZE, SAMPLE_RATE,
};
pub use control::{ControlFacade, ControlStatus};
pub use device::{AudioDevice, DeviceCatalog, DeviceId};
pub use dsp::{
    AudioProcessor, NoiseEstimate, NoiseProfile, SpectralGate, SuppressorSettings, MAX_ZEIT_RAHMEN,
};
pub use error::{AudioError, AudioResult, CallbackFault, Richtung};
pub use host::{AudioHost, BlockCallback, CpalHost, DuplexStream, SimulatedHost};
pub use pipeline::{
    spectral_gate_factory, validate_devices, AudioPipeline, PipelineState, ProcessorFactory,
    SessionHandle,
};
pub use stats::{AudioStats, PipelineStats};
