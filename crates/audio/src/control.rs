//! ControlFacade – einzige Schnittstelle fuer die Oberflaeche
//!
//! Reicht Start/Stop an die Pipeline durch und uebersetzt deren Ergebnisse
//! in einen Status. Enthaelt keine Audio-Logik.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::config::{PipelineSettings, StreamConfig};
use crate::device::{find_in, DeviceCatalog, DeviceId};
use crate::dsp::SuppressorSettings;
use crate::error::{AudioError, AudioResult};
use crate::host::AudioHost;
use crate::pipeline::{AudioPipeline, SessionHandle};
use crate::stats::AudioStats;

/// Status wie ihn die Oberflaeche sieht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlStatus {
    Idle,
    Running,
    Error(String),
}

impl std::fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("bereit"),
            Self::Running => f.write_str("laeuft"),
            Self::Error(grund) => write!(f, "Fehler: {grund}"),
        }
    }
}

pub struct ControlFacade {
    catalog: DeviceCatalog,
    pipeline: Mutex<AudioPipeline>,
    status: RwLock<ControlStatus>,
    subscribers: Mutex<Vec<Sender<ControlStatus>>>,
}

impl ControlFacade {
    pub fn new(
        host: Arc<dyn AudioHost>,
        settings: PipelineSettings,
        suppressor: SuppressorSettings,
    ) -> Self {
        let catalog = DeviceCatalog::new(Arc::clone(&host));
        let pipeline = AudioPipeline::new(host, settings, suppressor);
        Self::with_pipeline(catalog, pipeline)
    }

    pub fn with_pipeline(catalog: DeviceCatalog, pipeline: AudioPipeline) -> Self {
        Self {
            catalog,
            pipeline: Mutex::new(pipeline),
            status: RwLock::new(ControlStatus::Idle),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Startet die Unterdrueckung von `input` nach `output`
    pub fn start(
        &self,
        input: impl Into<DeviceId>,
        output: impl Into<DeviceId>,
    ) -> AudioResult<SessionHandle> {
        let mut pipeline = self.pipeline.lock();
        if pipeline.session().is_some() {
            return Err(AudioError::LaeuftBereits);
        }

        let result = self.resolve(input.into(), output.into()).and_then(|cfg| pipeline.start(cfg));
        match &result {
            Ok(handle) => {
                info!(sitzung = %handle.id, "Rauschunterdrueckung aktiv");
                self.set_status(ControlStatus::Running);
            }
            Err(e) => self.set_status(ControlStatus::Error(e.to_string())),
        }
        result
    }

    /// Stoppt eine laufende Sitzung. Ohne Sitzung ein No-op.
    pub fn stop(&self) {
        self.pipeline.lock().stop();
        self.set_status(ControlStatus::Idle);
    }

    pub fn current_status(&self) -> ControlStatus {
        self.status.read().clone()
    }

    /// Empfaenger fuer Statusaenderungen. Liefert nur Aenderungen, nicht
    /// den aktuellen Status.
    pub fn subscribe(&self) -> Receiver<ControlStatus> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Konfiguration der laufenden Sitzung
    pub fn session_config(&self) -> Option<StreamConfig> {
        self.pipeline.lock().session().map(|s| s.config.clone())
    }

    pub fn stats(&self) -> AudioStats {
        self.pipeline.lock().stats()
    }

    fn resolve(&self, input: DeviceId, output: DeviceId) -> AudioResult<StreamConfig> {
        let devices = self.catalog.list_devices()?;
        let input = find_in(&devices, &input)?;
        let output = find_in(&devices, &output)?;
        Ok(StreamConfig::for_devices(&input, &output))
    }

    fn set_status(&self, status: ControlStatus) {
        {
            let mut current = self.status.write();
            if *current == status {
                return;
            }
            *current = status.clone();
        }
        // Abgemeldete Empfaenger fallen raus
        self.subscribers
            .lock()
            .retain(|tx| tx.send(status.clone()).is_ok());
    }
}

impl std::fmt::Debug for ControlFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlFacade")
            .field("catalog", &self.catalog)
            .field("status", &*self.status.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedHost;

    fn facade() -> ControlFacade {
        let host = Arc::new(
            SimulatedHost::new()
                .with_device("Mic", 2, 0)
                .with_device("VB-Cable", 0, 2),
        );
        ControlFacade::new(host, PipelineSettings::default(), SuppressorSettings::default())
    }

    #[test]
    fn status_folgt_start_und_stop() {
        let facade = facade();
        let rx = facade.subscribe();
        assert_eq!(facade.current_status(), ControlStatus::Idle);

        facade.start("Mic", "VB-Cable").unwrap();
        assert_eq!(facade.current_status(), ControlStatus::Running);
        let cfg = facade.session_config().unwrap();
        assert_eq!((cfg.input_channels(), cfg.output_channels()), (2, 2));

        facade.stop();
        assert_eq!(facade.current_status(), ControlStatus::Idle);
        assert_eq!(rx.try_recv().unwrap(), ControlStatus::Running);
        assert_eq!(rx.try_recv().unwrap(), ControlStatus::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn zweiter_start_aendert_nichts() {
        let facade = facade();
        let handle = facade.start("Mic", "VB-Cable").unwrap();
        assert!(matches!(
            facade.start("Mic", "VB-Cable"),
            Err(AudioError::LaeuftBereits)
        ));
        assert_eq!(facade.current_status(), ControlStatus::Running);
        assert_eq!(facade.session_config(), Some(handle.config));
    }

    #[test]
    fn fehler_wird_status() {
        let facade = facade();
        let err = facade.start("VB-Cable", "VB-Cable").unwrap_err();
        assert!(matches!(err, AudioError::UngueltigesGeraet { .. }));
        match facade.current_status() {
            ControlStatus::Error(grund) => assert!(grund.contains("VB-Cable")),
            other => panic!("Erwartet Fehlerstatus, war {other:?}"),
        }

        // Nach dem Fehler ist ein neuer Start moeglich
        facade.start("Mic", "VB-Cable").unwrap();
        assert_eq!(facade.current_status(), ControlStatus::Running);
    }

    #[test]
    fn stop_ohne_sitzung() {
        let facade = facade();
        facade.stop();
        facade.stop();
        assert_eq!(facade.current_status(), ControlStatus::Idle);
    }
}
