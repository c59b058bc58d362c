//! Kurzzeit-Fourier-Transformation mit Hann-Fenster
//!
//! Zentrierte Rahmung: das Signal wird vorne und hinten mit `fft_size / 2`
//! Nullen aufgefuellt. Die Rueckrechnung normiert mit der Summe der
//! quadrierten Fenster, damit ungefilterte Spektren exakt rekonstruiert
//! werden.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

pub(crate) struct Stft {
    fft_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl Stft {
    pub(crate) fn new(fft_size: usize, hop_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        // Periodisches Hann-Fenster
        let window = (0..fft_size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / fft_size as f32).cos())
            .collect();

        Self {
            fft_size,
            hop_size,
            window,
            forward,
            inverse,
            buffer: vec![Complex32::default(); fft_size],
            scratch: vec![Complex32::default(); scratch_len],
        }
    }

    pub(crate) fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Versatz des Signals im aufgefuellten Puffer
    pub(crate) fn offset(&self) -> usize {
        self.fft_size / 2
    }

    /// Anzahl Rahmen fuer ein Signal der Laenge `len`
    pub(crate) fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            1 + len.div_ceil(self.hop_size)
        }
    }

    /// Laenge des aufgefuellten Puffers fuer ein Signal der Laenge `len`
    pub(crate) fn padded_len(&self, len: usize) -> usize {
        match self.frame_count(len) {
            0 => 0,
            frames => (frames - 1) * self.hop_size + self.fft_size,
        }
    }

    /// Spektrum von Rahmen `frame` (nur die `bins()` nicht-redundanten Bins)
    pub(crate) fn analyze_frame(&mut self, padded: &[f32], frame: usize, spectrum: &mut [Complex32]) {
        let start = frame * self.hop_size;
        let segment = &padded[start..start + self.fft_size];
        for ((b, &x), &w) in self.buffer.iter_mut().zip(segment).zip(&self.window) {
            *b = Complex32::new(x * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        spectrum.copy_from_slice(&self.buffer[..spectrum.len()]);
    }

    /// Addiert die Rueckrechnung von Rahmen `frame` in `acc` und die
    /// quadrierten Fensterwerte in `norm`
    pub(crate) fn synthesize_frame(
        &mut self,
        spectrum: &[Complex32],
        frame: usize,
        acc: &mut [f32],
        norm: &mut [f32],
    ) {
        let n = self.fft_size;
        let bins = self.bins();
        self.buffer[..bins].copy_from_slice(spectrum);
        // Hermitesche Symmetrie fuer ein reelles Ergebnis
        for k in 1..n - bins + 1 {
            self.buffer[n - k] = spectrum[k].conj();
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let start = frame * self.hop_size;
        let scale = 1.0 / n as f32;
        for (i, (&b, &w)) in self.buffer.iter().zip(&self.window).enumerate() {
            acc[start + i] += b.re * scale * w;
            norm[start + i] += w * w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rahmenzahl_und_laenge() {
        let stft = Stft::new(1024, 256);
        assert_eq!(stft.bins(), 513);
        assert_eq!(stft.frame_count(0), 0);
        assert_eq!(stft.frame_count(1), 2);
        assert_eq!(stft.frame_count(1024), 5);
        assert_eq!(stft.padded_len(1024), 4 * 256 + 1024);
        assert_eq!(stft.offset(), 512);
    }

    #[test]
    fn rekonstruktion_ohne_filter() {
        let mut stft = Stft::new(64, 16);
        let signal: Vec<f32> = (0..100).map(|i| ((i as f32) * 0.37).sin() * 0.8).collect();
        let frames = stft.frame_count(signal.len());
        let plen = stft.padded_len(signal.len());
        let mut padded = vec![0.0f32; plen];
        padded[stft.offset()..stft.offset() + signal.len()].copy_from_slice(&signal);

        let mut acc = vec![0.0f32; plen];
        let mut norm = vec![0.0f32; plen];
        let mut spectrum = vec![Complex32::default(); stft.bins()];
        for t in 0..frames {
            stft.analyze_frame(&padded, t, &mut spectrum);
            stft.synthesize_frame(&spectrum, t, &mut acc, &mut norm);
        }
        for (i, &x) in signal.iter().enumerate() {
            let p = stft.offset() + i;
            assert!(norm[p] > 0.0);
            assert!((acc[p] / norm[p] - x).abs() < 1e-4, "Abweichung bei {i}");
        }
    }
}
