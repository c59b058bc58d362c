//! Simulierter Audio-Host
//!
//! Haelt eine Geraetetabelle im Speicher und treibt den Block-Callback
//! aus einem eigenen Thread mit einem vorgegebenen Eingangssignal.
//! Die erzeugte Ausgabe wird mitgeschnitten.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::{StreamConfig, BLOCK_SIZE};
use crate::device::{AudioDevice, DeviceId};
use crate::error::{AudioError, AudioResult};
use crate::host::{AudioHost, BlockCallback, DuplexStream};
use crate::stats::PipelineStats;

/// Maximale Laenge des Ausgabe-Mitschnitts in Samples
const MAX_AUFNAHME: usize = BLOCK_SIZE * 1024;

#[derive(Debug, Clone)]
struct SimDevice {
    name: String,
    inputs: u16,
    outputs: u16,
}

#[derive(Debug, Clone)]
struct SimState {
    devices: Vec<SimDevice>,
    default_input: Option<String>,
    unavailable: bool,
    open_failure: Option<String>,
    close_delay: Duration,
    tick: Duration,
    signal: Arc<Vec<f32>>,
    aux_value: f32,
}

#[derive(Debug, Default)]
struct SimShared {
    opened: AtomicUsize,
    active: AtomicUsize,
    recorded: Mutex<Vec<f32>>,
}

/// In-Process-Host ohne Hardware
#[derive(Debug)]
pub struct SimulatedHost {
    state: RwLock<SimState>,
    shared: Arc<SimShared>,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    /// Leerer Host: keine Geraete, Stille als Eingang
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SimState {
                devices: Vec::new(),
                default_input: None,
                unavailable: false,
                open_failure: None,
                close_delay: Duration::ZERO,
                tick: Duration::from_millis(1),
                signal: Arc::new(Vec::new()),
                aux_value: 0.0,
            }),
            shared: Arc::new(SimShared::default()),
        }
    }

    pub fn with_device(self, name: &str, inputs: u16, outputs: u16) -> Self {
        self.plug_device(name, inputs, outputs);
        self
    }

    pub fn with_default_input(self, name: &str) -> Self {
        self.state.write().default_input = Some(name.to_string());
        self
    }

    /// Host meldet sich als nicht erreichbar
    pub fn with_unavailable(self) -> Self {
        self.state.write().unavailable = true;
        self
    }

    /// Jeder Versuch, einen Stream zu oeffnen, schlaegt fehl
    pub fn with_open_failure(self, reason: &str) -> Self {
        self.state.write().open_failure = Some(reason.to_string());
        self
    }

    /// `close()` blockiert so lange, wie ein haengender Treiber
    pub fn with_close_delay(self, delay: Duration) -> Self {
        self.state.write().close_delay = delay;
        self
    }

    /// Pause zwischen zwei Bloecken des Treiber-Threads
    pub fn with_tick(self, tick: Duration) -> Self {
        self.state.write().tick = tick;
        self
    }

    /// Signal auf Eingangskanal 0, wird zyklisch wiederholt
    pub fn with_input_signal(self, signal: Vec<f32>) -> Self {
        self.state.write().signal = Arc::new(signal);
        self
    }

    /// Konstanter Wert auf allen Eingangskanaelen ausser Kanal 0
    pub fn with_aux_channel_value(self, value: f32) -> Self {
        self.state.write().aux_value = value;
        self
    }

    /// Steckt zur Laufzeit ein Geraet an
    pub fn plug_device(&self, name: &str, inputs: u16, outputs: u16) {
        self.state.write().devices.push(SimDevice {
            name: name.to_string(),
            inputs,
            outputs,
        });
    }

    /// Anzahl erfolgreich geoeffneter Streams seit Erstellung
    pub fn opened_streams(&self) -> usize {
        self.shared.opened.load(Ordering::Acquire)
    }

    /// Anzahl aktuell offener Streams
    pub fn active_streams(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Kopie der bisher erzeugten Ausgabe (interleaved)
    pub fn recorded_output(&self) -> Vec<f32> {
        self.shared.recorded.lock().clone()
    }

    pub fn clear_recording(&self) {
        self.shared.recorded.lock().clear();
    }
}

impl AudioHost for SimulatedHost {
    fn name(&self) -> &str {
        "simuliert"
    }

    fn enumerate_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        let state = self.state.read();
        if state.unavailable {
            return Err(AudioError::GeraeteAbfrage("simulierter Host nicht erreichbar".into()));
        }
        Ok(state
            .devices
            .iter()
            .enumerate()
            .map(|(index, d)| AudioDevice {
                index,
                id: DeviceId::new(d.name.clone()),
                name: d.name.clone(),
                max_input_channels: d.inputs,
                max_output_channels: d.outputs,
            })
            .collect())
    }

    fn default_input_device(&self) -> Option<DeviceId> {
        self.state.read().default_input.clone().map(DeviceId::from)
    }

    fn open_duplex_stream(
        &self,
        config: &StreamConfig,
        mut callback: BlockCallback,
        _stats: Arc<PipelineStats>,
    ) -> AudioResult<Box<dyn DuplexStream>> {
        let state = self.state.read().clone();
        if state.unavailable {
            return Err(AudioError::GeraeteAbfrage("simulierter Host nicht erreichbar".into()));
        }
        if let Some(reason) = state.open_failure {
            return Err(AudioError::StreamOeffnen(reason));
        }
        for id in [config.input_device(), config.output_device()] {
            if !state.devices.iter().any(|d| d.name == id.as_str()) {
                return Err(AudioError::GeraetNichtGefunden(id.to_string()));
            }
        }

        let in_ch = config.input_channels() as usize;
        let out_ch = config.output_channels() as usize;
        let stop = Arc::new(AtomicBool::new(false));
        let driver_stop = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);
        let signal = state.signal;
        let aux = state.aux_value;
        let tick = state.tick;

        let driver = thread::Builder::new()
            .name("klarton-sim-duplex".to_string())
            .spawn(move || {
                let mut input = vec![0.0f32; BLOCK_SIZE * in_ch];
                let mut output = vec![0.0f32; BLOCK_SIZE * out_ch];
                let mut pos = 0usize;
                while !driver_stop.load(Ordering::Acquire) {
                    for frame in input.chunks_exact_mut(in_ch) {
                        frame[0] = if signal.is_empty() {
                            0.0
                        } else {
                            signal[pos % signal.len()]
                        };
                        frame[1..].fill(aux);
                        pos += 1;
                    }
                    callback(&input, &mut output);
                    {
                        let mut rec = shared.recorded.lock();
                        if rec.len() + output.len() <= MAX_AUFNAHME {
                            rec.extend_from_slice(&output);
                        }
                    }
                    thread::sleep(tick);
                }
            })
            .map_err(|e| AudioError::StreamOeffnen(e.to_string()))?;

        self.shared.opened.fetch_add(1, Ordering::AcqRel);
        self.shared.active.fetch_add(1, Ordering::AcqRel);
        debug!("Simulierter Duplex-Stream geoeffnet: {}ch -> {}ch", in_ch, out_ch);

        Ok(Box::new(SimulatedStream {
            stop,
            driver: Some(driver),
            shared: Arc::clone(&self.shared),
            close_delay: state.close_delay,
        }))
    }
}

struct SimulatedStream {
    stop: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
    shared: Arc<SimShared>,
    close_delay: Duration,
}

impl SimulatedStream {
    fn shutdown(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        let _ = driver.join();
        self.shared.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DuplexStream for SimulatedStream {
    fn close(mut self: Box<Self>) -> AudioResult<()> {
        thread::sleep(self.close_delay);
        self.shutdown();
        Ok(())
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geraete_aus_tabelle() {
        let host = SimulatedHost::new()
            .with_device("Mic", 2, 0)
            .with_device("VB-Cable", 0, 2);
        let devices = host.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].id, DeviceId::from("VB-Cable"));
        assert_eq!(devices[1].max_output_channels, 2);
    }

    #[test]
    fn stream_treibt_callback_und_schneidet_mit() {
        let host = SimulatedHost::new()
            .with_device("Mic", 1, 0)
            .with_device("Out", 0, 2)
            .with_input_signal(vec![0.25]);
        let config = StreamConfig::new("Mic".into(), "Out".into(), 1, 2);
        let callback: BlockCallback = Box::new(|input: &[f32], output: &mut [f32]| {
            for (s, frame) in input.iter().zip(output.chunks_exact_mut(2)) {
                frame.fill(*s);
            }
        });
        let stream = host
            .open_duplex_stream(&config, callback, Arc::new(PipelineStats::default()))
            .unwrap();
        assert_eq!(host.active_streams(), 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while host.recorded_output().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        stream.close().unwrap();
        assert_eq!(host.active_streams(), 0);
        assert_eq!(host.opened_streams(), 1);

        let rec = host.recorded_output();
        assert!(rec.len() >= BLOCK_SIZE * 2);
        assert!(rec.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn oeffnen_schlaegt_fehl() {
        let host = SimulatedHost::new()
            .with_device("Mic", 1, 0)
            .with_device("Out", 0, 1)
            .with_open_failure("Treiber lehnt ab");
        let config = StreamConfig::new("Mic".into(), "Out".into(), 1, 1);
        let result = host.open_duplex_stream(
            &config,
            Box::new(|_: &[f32], _: &mut [f32]| {}),
            Arc::new(PipelineStats::default()),
        );
        assert!(matches!(result, Err(AudioError::StreamOeffnen(_))));
        assert_eq!(host.opened_streams(), 0);
    }
}
