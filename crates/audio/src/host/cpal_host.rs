//! Host-Anbindung via cpal
//!
//! cpal kennt keinen echten Duplex-Stream: Eingabe und Ausgabe werden
//! als zwei Streams geoeffnet und ueber einen lock-free Ring-Buffer
//! verbunden. Der Block-Callback laeuft im Playback-Callback.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tracing::{debug, error, warn};

use crate::config::{StreamConfig, BLOCK_SIZE, SAMPLE_RATE};
use crate::device::{AudioDevice, DeviceId};
use crate::error::{AudioError, AudioResult, Richtung};
use crate::host::assembler::BlockAssembler;
use crate::host::{AudioHost, BlockCallback, DuplexStream};
use crate::stats::PipelineStats;

/// Ring-Buffer Kapazitaet in Bloecken
const RING_BLOECKE: usize = 8;

/// Audio-Host des Betriebssystems (cpal Standard-Host)
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }
}

impl AudioHost for CpalHost {
    fn name(&self) -> &str {
        cpal::default_host().id().name()
    }

    fn enumerate_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let devices = host
            .devices()
            .map_err(|e| AudioError::GeraeteAbfrage(e.to_string()))?;

        let mut result = Vec::new();
        for (index, device) in devices.enumerate() {
            match device_to_audio_device(index, &device) {
                Ok(ad) => result.push(ad),
                Err(e) => warn!("Geraet {} konnte nicht gelesen werden: {}", index, e),
            }
        }
        debug!("Gefundene Geraete: {}", result.len());
        Ok(result)
    }

    fn default_input_device(&self) -> Option<DeviceId> {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
            .map(DeviceId::from)
    }

    fn open_duplex_stream(
        &self,
        config: &StreamConfig,
        callback: BlockCallback,
        stats: Arc<PipelineStats>,
    ) -> AudioResult<Box<dyn DuplexStream>> {
        let host = cpal::default_host();
        let input_device = load_cpal_device(&host, config.input_device(), Richtung::Eingabe)?;
        let output_device = load_cpal_device(&host, config.output_device(), Richtung::Ausgabe)?;

        let input_channels = config.input_channels() as usize;
        let output_channels = config.output_channels() as usize;

        let input_stats = Arc::clone(&stats);
        let (input, consumer) = build_with_fallback(config.input_channels(), |stream_config| {
            let (mut producer, consumer) =
                HeapRb::<f32>::new(BLOCK_SIZE * input_channels * RING_BLOECKE).split();
            let stats = Arc::clone(&input_stats);
            input_device
                .build_input_stream(
                    stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let written = producer.push_slice(data);
                        if written < data.len() {
                            stats.record_overrun();
                        }
                    },
                    |err| error!("Capture-Fehler: {}", err),
                    None,
                )
                .map(|stream| (stream, consumer))
        })?;

        // Der Assembler bildet die Bloecke selbst, daher reicht hier die
        // Standard-Puffergroesse des Treibers.
        let mut assembler =
            BlockAssembler::new(consumer, callback, input_channels, output_channels, stats);
        let output = output_device
            .build_output_stream(
                &cpal_stream_config(config.output_channels(), BufferSize::Default),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    assembler.fill(data);
                },
                |err| error!("Playback-Fehler: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamOeffnen(e.to_string()))?;

        input
            .play()
            .map_err(|e| AudioError::StreamOeffnen(e.to_string()))?;
        output
            .play()
            .map_err(|e| AudioError::StreamOeffnen(e.to_string()))?;

        debug!(
            "Duplex-Stream geoeffnet: {}Hz {}ch -> {}ch, Block {}",
            SAMPLE_RATE, input_channels, output_channels, BLOCK_SIZE
        );

        Ok(Box::new(CpalDuplex { input, output }))
    }
}

/// Haelt beide cpal-Streams am Leben. cpal::Stream ist !Send und
/// bleibt deshalb im Worker-Thread.
struct CpalDuplex {
    input: Stream,
    output: Stream,
}

impl DuplexStream for CpalDuplex {
    fn close(self: Box<Self>) -> AudioResult<()> {
        let input = self.input.pause();
        let output = self.output.pause();
        drop(self);
        input.map_err(|e| anyhow::anyhow!("Capture-Stream: {e}"))?;
        output.map_err(|e| anyhow::anyhow!("Playback-Stream: {e}"))?;
        Ok(())
    }
}

fn cpal_stream_config(channels: u16, buffer_size: BufferSize) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size,
    }
}

/// Versucht zuerst eine feste Puffergroesse von einem Block, dann die
/// Standardgroesse des Treibers. Die Blockbildung uebernimmt der Assembler.
fn build_with_fallback<T, F>(channels: u16, mut build: F) -> AudioResult<T>
where
    F: FnMut(&cpal::StreamConfig) -> Result<T, cpal::BuildStreamError>,
{
    match build(&cpal_stream_config(channels, BufferSize::Fixed(BLOCK_SIZE as u32))) {
        Ok(built) => Ok(built),
        Err(e) => {
            warn!("Feste Puffergroesse abgelehnt ({}), versuche Standardgroesse", e);
            build(&cpal_stream_config(channels, BufferSize::Default))
                .map_err(|e| AudioError::StreamOeffnen(e.to_string()))
        }
    }
}

/// Laedt ein cpal-Device anhand des Namens fuer die gegebene Richtung
fn load_cpal_device(host: &cpal::Host, id: &DeviceId, richtung: Richtung) -> AudioResult<Device> {
    let devices = host
        .devices()
        .map_err(|e| AudioError::GeraeteAbfrage(e.to_string()))?;
    for (index, device) in devices.enumerate() {
        let Ok(ad) = device_to_audio_device(index, &device) else {
            continue;
        };
        let passt = match richtung {
            Richtung::Eingabe => ad.is_input_capable(),
            Richtung::Ausgabe => ad.is_output_capable(),
        };
        if &ad.id == id && passt {
            return Ok(device);
        }
    }
    Err(AudioError::GeraetNichtGefunden(id.to_string()))
}

// Hilfsfunktion: cpal Device -> AudioDevice
fn device_to_audio_device(index: usize, device: &Device) -> AudioResult<AudioDevice> {
    let name = device
        .name()
        .map_err(|e| AudioError::GeraeteAbfrage(e.to_string()))?;

    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    Ok(AudioDevice {
        index,
        id: DeviceId::from(name.clone()),
        name,
        max_input_channels,
        max_output_channels,
    })
}
