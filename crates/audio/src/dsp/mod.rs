//! DSP-Module fuer die Block-Verarbeitung
//!
//! Alle Prozessoren implementieren das `AudioProcessor` Trait und
//! koennen so vom Block-Callback der Pipeline aufgerufen werden.

pub mod noise_profile;
pub mod spectral_gate;
mod stft;

pub use noise_profile::NoiseProfile;
pub use spectral_gate::{NoiseEstimate, SpectralGate, SuppressorSettings, MAX_ZEIT_RAHMEN};

use crate::error::CallbackFault;

/// Gemeinsames Trait fuer alle Audio-Prozessoren
///
/// Verarbeitet einen Mono-Block in-place. Laeuft im Echtzeit-Kontext:
/// keine blockierenden Aufrufe, keine unvorhersehbaren Allokationen.
pub trait AudioProcessor: Send + Sync {
    /// Verarbeitet einen Puffer von Samples in-place
    fn process(&mut self, samples: &mut [f32]) -> Result<(), CallbackFault>;

    /// Setzt den internen Zustand zurueck (z.B. Masken-Historie)
    fn reset(&mut self);

    /// Gibt zurueck ob der Prozessor aktiv ist
    fn is_enabled(&self) -> bool;

    /// Aktiviert oder deaktiviert den Prozessor
    fn set_enabled(&mut self, enabled: bool);
}
