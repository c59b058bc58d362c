//! Blockbildung zwischen Capture- und Playback-Callback
//!
//! cpal liefert Callbacks mit beliebiger Laenge. Der Assembler sammelt
//! die Eingabe im Ring-Buffer, ruft den Block-Callback mit genau
//! `BLOCK_SIZE` Frames auf und verteilt das Ergebnis auf die
//! Ausgabe-Callbacks. Alle Puffer werden vorab allokiert.
//!
//! Laufen Eingabe- und Ausgabegeraet mit leicht verschiedenen Takten,
//! staut sich Eingabe im Ring. Ab `MAX_RUECKSTAU` Bloecken werden ganze
//! alte Bloecke verworfen und als Overrun gezaehlt.

use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;

use crate::config::BLOCK_SIZE;
use crate::host::BlockCallback;
use crate::stats::PipelineStats;

/// Maximal gepufferte Eingabebloecke vor dem Verwerfen
pub(crate) const MAX_RUECKSTAU: usize = 2;

pub(crate) struct BlockAssembler {
    consumer: HeapCons<f32>,
    callback: BlockCallback,
    input_block: Vec<f32>,
    output_block: Vec<f32>,
    /// Leseposition in `output_block`; `== len` heisst leer
    position: usize,
    stats: Arc<PipelineStats>,
}

impl BlockAssembler {
    pub(crate) fn new(
        consumer: HeapCons<f32>,
        callback: BlockCallback,
        input_channels: usize,
        output_channels: usize,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let output_block = vec![0.0; BLOCK_SIZE * output_channels];
        let position = output_block.len();
        Self {
            consumer,
            callback,
            input_block: vec![0.0; BLOCK_SIZE * input_channels],
            output_block,
            position,
            stats,
        }
    }

    /// Fuellt einen Ausgabe-Callback. Fehlen Eingabedaten, wird der Rest
    /// mit Stille aufgefuellt.
    pub(crate) fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        while written < data.len() {
            if self.position == self.output_block.len() {
                if self.consumer.occupied_len() < self.input_block.len() {
                    data[written..].fill(0.0);
                    self.stats.record_underrun();
                    return;
                }
                let block = self.input_block.len();
                while self.consumer.occupied_len() > block * MAX_RUECKSTAU {
                    self.consumer.skip(block);
                    self.stats.record_overrun();
                }
                self.consumer.pop_slice(&mut self.input_block);
                (self.callback)(&self.input_block, &mut self.output_block);
                self.position = 0;
            }

            let n = (self.output_block.len() - self.position).min(data.len() - written);
            data[written..written + n]
                .copy_from_slice(&self.output_block[self.position..self.position + n]);
            self.position += n;
            written += n;
        }
    }
}
