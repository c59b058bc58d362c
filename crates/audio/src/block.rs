//! Per-Block-Verarbeitung im Echtzeit-Callback
//!
//! Nimmt Kanal 0 der Eingabe, laesst den Prozessor darueber laufen und
//! verteilt das Mono-Ergebnis auf alle Ausgabekanaele. Fehler und Paniken
//! verlassen den Callback nie: der Block wird durch Stille oder den
//! letzten guten Block ersetzt und gezaehlt.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::{FallbackPolicy, BLOCK_SIZE};
use crate::dsp::AudioProcessor;
use crate::error::CallbackFault;
use crate::host::BlockCallback;
use crate::stats::PipelineStats;

pub struct BlockProcessor {
    processor: Box<dyn AudioProcessor>,
    input_channels: usize,
    output_channels: usize,
    mono: Vec<f32>,
    last_good: Vec<f32>,
    fallback: FallbackPolicy,
    stats: Arc<PipelineStats>,
}

impl BlockProcessor {
    pub fn new(
        processor: Box<dyn AudioProcessor>,
        input_channels: u16,
        output_channels: u16,
        fallback: FallbackPolicy,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let output_channels = output_channels.max(1) as usize;
        Self {
            processor,
            input_channels: input_channels.max(1) as usize,
            output_channels,
            mono: vec![0.0; BLOCK_SIZE],
            last_good: vec![0.0; BLOCK_SIZE * output_channels],
            fallback,
            stats,
        }
    }

    /// Verarbeitet einen interleaved Block. Schreibt immer die ganze Ausgabe.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        match self.try_process(input, output) {
            Ok(()) => {
                replicate(&self.mono[..output.len() / self.output_channels], output, self.output_channels);
                if self.last_good.len() == output.len() {
                    self.last_good.copy_from_slice(output);
                }
                self.stats.record_block();
            }
            Err(fault) => self.apply_fallback(fault, output),
        }
    }

    /// Verpackt den Prozessor als Host-Callback
    pub fn into_callback(mut self) -> BlockCallback {
        Box::new(move |input: &[f32], output: &mut [f32]| self.process_block(input, output))
    }

    fn try_process(&mut self, input: &[f32], output: &[f32]) -> Result<(), CallbackFault> {
        let frames = input.len() / self.input_channels;
        if input.len() % self.input_channels != 0 || output.len() != frames * self.output_channels {
            return Err(CallbackFault::BlockLaenge {
                eingabe: input.len(),
                ausgabe: output.len(),
            });
        }
        if self.mono.len() < frames {
            self.mono.resize(frames, 0.0);
        }

        // Nur Kanal 0
        for (m, frame) in self.mono.iter_mut().zip(input.chunks_exact(self.input_channels)) {
            *m = frame[0];
        }

        let processor = &mut self.processor;
        let mono = &mut self.mono[..frames];
        match panic::catch_unwind(AssertUnwindSafe(|| processor.process(mono))) {
            Ok(result) => result?,
            Err(payload) => {
                // Zustand nach einer Panik ist unbestimmt
                self.processor.reset();
                return Err(CallbackFault::Panik(panic_message(payload.as_ref())));
            }
        }

        if self.mono[..frames].iter().any(|s| !s.is_finite()) {
            return Err(CallbackFault::NichtEndlich);
        }
        Ok(())
    }

    fn apply_fallback(&mut self, fault: CallbackFault, output: &mut [f32]) {
        match self.fallback {
            FallbackPolicy::LetzterBlock if self.last_good.len() == output.len() => {
                output.copy_from_slice(&self.last_good);
            }
            _ => output.fill(0.0),
        }
        // Geloggt wird vom Worker-Thread
        self.stats.record_fault(fault);
    }
}

fn replicate(mono: &[f32], output: &mut [f32], channels: usize) {
    for (frame, &s) in output.chunks_exact_mut(channels).zip(mono) {
        frame.fill(s);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unbekannt".to_string()
    }
}
