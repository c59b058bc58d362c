//! AudioPipeline – Lebenszyklus einer Verarbeitungs-Sitzung
//!
//! Der Duplex-Stream lebt in einem eigenen Worker-Thread (cpal::Stream ist
//! !Send). Der Worker meldet das Ergebnis des Oeffnens ueber einen Kanal
//! zurueck und haelt den Stream, bis `running` auf false geht.
//! `stop()` wartet hoechstens `stop_timeout_ms` auf den Worker und gibt
//! ihn danach auf.
//!
//! Zustaende: Idle -> Starting -> Running -> Stopping -> Idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::block::BlockProcessor;
use crate::config::{PipelineSettings, StreamConfig};
use crate::device::{find_in, AudioDevice};
use crate::dsp::{AudioProcessor, NoiseProfile, SpectralGate, SuppressorSettings};
use crate::error::{AudioError, AudioResult, Richtung};
use crate::host::AudioHost;
use crate::stats::{AudioStats, PipelineStats};

/// Wie oft der Worker ohne Weckruf nach `running` schaut
const WORKER_POLL: Duration = Duration::from_millis(100);

/// Zustand der Pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Erzeugt pro Sitzung einen frischen Prozessor
pub type ProcessorFactory =
    Arc<dyn Fn(&StreamConfig) -> AudioResult<Box<dyn AudioProcessor>> + Send + Sync>;

/// Fabrik fuer den spektralen Rauschunterdruecker
pub fn spectral_gate_factory(
    settings: SuppressorSettings,
    profile: Option<NoiseProfile>,
) -> ProcessorFactory {
    Arc::new(move |config: &StreamConfig| {
        let mut gate = SpectralGate::with_capacity(
            settings.clone(),
            config.sample_rate(),
            config.block_size(),
        )?;
        if let Some(profile) = &profile {
            gate.set_noise_profile(profile.clone())?;
        }
        Ok(Box::new(gate) as Box<dyn AudioProcessor>)
    })
}

/// Oeffentliche Sicht auf eine laufende Sitzung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    pub config: StreamConfig,
}

struct PipelineSession {
    handle: SessionHandle,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
}

/// Besitzt den Host-Stream einer Sitzung. Hoechstens eine Sitzung gleichzeitig.
pub struct AudioPipeline {
    host: Arc<dyn AudioHost>,
    settings: PipelineSettings,
    factory: ProcessorFactory,
    state: PipelineState,
    session: Option<PipelineSession>,
    stats: Arc<PipelineStats>,
    last_failure: Option<String>,
}

impl AudioPipeline {
    pub fn new(
        host: Arc<dyn AudioHost>,
        settings: PipelineSettings,
        suppressor: SuppressorSettings,
    ) -> Self {
        Self::with_processor_factory(host, settings, spectral_gate_factory(suppressor, None))
    }

    /// Pipeline mit eigenem Prozessor (z.B. fuer Tests oder ein festes Rauschprofil)
    pub fn with_processor_factory(
        host: Arc<dyn AudioHost>,
        settings: PipelineSettings,
        factory: ProcessorFactory,
    ) -> Self {
        Self {
            host,
            settings,
            factory,
            state: PipelineState::Idle,
            session: None,
            stats: Arc::new(PipelineStats::default()),
            last_failure: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref().map(|s| &s.handle)
    }

    /// Letzter Fehler beim Starten oder Stoppen
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Zaehler der laufenden oder zuletzt gelaufenen Sitzung
    pub fn stats(&self) -> AudioStats {
        self.stats.snapshot()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Startet eine Sitzung. Kehrt erst zurueck, wenn der Stream offen ist
    /// oder das Oeffnen fehlgeschlagen ist.
    pub fn start(&mut self, config: StreamConfig) -> AudioResult<SessionHandle> {
        if self.session.is_some() {
            return Err(AudioError::LaeuftBereits);
        }

        self.state = PipelineState::Starting;
        match self.open_session(config) {
            Ok(session) => {
                let handle = session.handle.clone();
                info!(
                    sitzung = %handle.id,
                    eingabe = %handle.config.input_device(),
                    ausgabe = %handle.config.output_device(),
                    "Pipeline gestartet: {}ch -> {}ch",
                    handle.config.input_channels(),
                    handle.config.output_channels()
                );
                self.session = Some(session);
                self.state = PipelineState::Running;
                self.last_failure = None;
                Ok(handle)
            }
            Err(e) => {
                warn!("Pipeline-Start fehlgeschlagen: {}", e);
                self.state = PipelineState::Idle;
                self.last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stoppt die laufende Sitzung. Ohne Sitzung ein No-op.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.state = PipelineState::Stopping;
        session.running.store(false, Ordering::Release);
        if let Some(worker) = &session.worker {
            worker.thread().unpark();
        }

        let timeout = Duration::from_millis(self.settings.stop_timeout_ms);
        match session.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(worker) = session.worker.take() {
                    if worker.join().is_err() {
                        error!("Audio-Worker ist abgestuerzt");
                    }
                }
                info!(sitzung = %session.handle.id, "Pipeline gestoppt");
            }
            Err(RecvTimeoutError::Timeout) => {
                // Worker wird losgelassen, der Stream schliesst irgendwann selbst
                warn!(
                    sitzung = %session.handle.id,
                    "Audio-Worker reagiert nicht nach {} ms, wird aufgegeben",
                    self.settings.stop_timeout_ms
                );
                self.last_failure = Some(format!(
                    "Stream schloss nicht innerhalb von {} ms",
                    self.settings.stop_timeout_ms
                ));
            }
        }
        self.state = PipelineState::Idle;
    }

    fn open_session(&mut self, config: StreamConfig) -> AudioResult<PipelineSession> {
        validate_devices(self.host.as_ref(), &config)?;
        let processor = (self.factory)(&config)?;

        let stats = Arc::new(PipelineStats::default());
        self.stats = Arc::clone(&stats);
        let callback = BlockProcessor::new(
            processor,
            config.input_channels(),
            config.output_channels(),
            self.settings.fallback,
            Arc::clone(&stats),
        )
        .into_callback();

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<AudioResult<()>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker_stats = Arc::clone(&stats);
        let worker_running = Arc::clone(&running);
        let worker_host = Arc::clone(&self.host);
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("klarton-audio".to_string())
            .spawn(move || {
                let stream = match worker_host.open_duplex_stream(&worker_config, callback, stats) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut gemeldet = 0;
                while worker_running.load(Ordering::Acquire) {
                    thread::park_timeout(WORKER_POLL);
                    report_faults(&worker_stats, &mut gemeldet);
                }
                report_faults(&worker_stats, &mut gemeldet);

                if let Err(e) = stream.close() {
                    warn!("Stream konnte nicht sauber geschlossen werden: {}", e);
                }
                debug!("Audio-Worker beendet");
                let _ = done_tx.send(());
            })
            .map_err(|e| AudioError::StreamOeffnen(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(PipelineSession {
                handle: SessionHandle {
                    id: Uuid::new_v4(),
                    config,
                },
                running,
                worker: Some(worker),
                done_rx,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                if matches!(e, AudioError::StreamOeffnen(_)) {
                    Err(e)
                } else {
                    Err(AudioError::StreamOeffnen(e.to_string()))
                }
            }
            Err(_) => {
                let _ = worker.join();
                Err(AudioError::StreamOeffnen(
                    "Audio-Worker beendet ohne Rueckmeldung".into(),
                ))
            }
        }
    }
}

/// Loggt Blockfehler aus dem Callback ausserhalb des Echtzeit-Threads
fn report_faults(stats: &PipelineStats, gemeldet: &mut u64) {
    if let Some((anzahl, fehler)) = stats.fault_report(gemeldet) {
        match fehler {
            Some(fehler) => warn!(anzahl, fehler = %fehler, "Blockfehler, Ersatzausgabe aktiv"),
            None => warn!(anzahl, "Blockfehler, Ersatzausgabe aktiv"),
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("host", &self.host.name())
            .field("state", &self.state)
            .field("session", &self.session())
            .finish()
    }
}

/// Prueft beide Geraete gegen die aktuelle Geraeteliste des Hosts.
///
/// Einzige Stelle fuer diese Pruefung; der Host wird erst danach gefragt.
pub fn validate_devices(
    host: &dyn AudioHost,
    config: &StreamConfig,
) -> AudioResult<(AudioDevice, AudioDevice)> {
    let devices = host.enumerate_devices()?;
    let input = find_in(&devices, config.input_device())?;
    if !input.is_input_capable() {
        return Err(AudioError::UngueltigesGeraet {
            geraet: input.name,
            richtung: Richtung::Eingabe,
        });
    }
    let output = find_in(&devices, config.output_device())?;
    if !output.is_output_capable() {
        return Err(AudioError::UngueltigesGeraet {
            geraet: output.name,
            richtung: Richtung::Ausgabe,
        });
    }
    Ok((input, output))
}
