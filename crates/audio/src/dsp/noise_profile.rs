//! Stationaeres Rauschprofil
//!
//! Mittelwert und Standardabweichung des Betragsspektrums in dB, pro Bin.
//! Die Gate-Schwelle eines Bins ist `mittel + n_std * std`.
//! Pro Bin werden Pegel mehr als `TOP_DB` unter dem Maximum des
//! Ausschnitts auf diese Grenze angehoben.

use rustfft::num_complex::Complex32;

use super::spectral_gate::SuppressorSettings;
use super::stft::Stft;
use crate::error::{AudioError, AudioResult};

/// Untergrenze fuer Betraege vor der dB-Umrechnung (-200 dB)
const BETRAG_MIN: f32 = 1e-10;

/// Dynamikbereich pro Bin in dB
pub(crate) const TOP_DB: f32 = 80.0;

pub(crate) fn amp_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(BETRAG_MIN).log10()
}

/// Klemmt jeden Bin auf `max - TOP_DB` ueber alle Rahmen in `db`.
/// `maxima` ist Arbeitsspeicher mit `bins` Eintraegen.
pub(crate) fn clamp_top_db(db: &mut [f32], bins: usize, maxima: &mut [f32]) {
    let maxima = &mut maxima[..bins];
    maxima.fill(f32::NEG_INFINITY);
    for row in db.chunks_exact(bins) {
        for (m, &d) in maxima.iter_mut().zip(row) {
            *m = m.max(d);
        }
    }
    for row in db.chunks_exact_mut(bins) {
        for (d, &m) in row.iter_mut().zip(maxima.iter()) {
            *d = d.max(m - TOP_DB);
        }
    }
}

/// Laufende Statistik pro Bin (Welford)
#[derive(Debug, Clone)]
pub(crate) struct BinStatistics {
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl BinStatistics {
    pub(crate) fn new(bins: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; bins],
            m2: vec![0.0; bins],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
        self.mean.fill(0.0);
        self.m2.fill(0.0);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    /// Nimmt einen Rahmen (dB pro Bin) auf
    pub(crate) fn push_frame(&mut self, db: &[f32]) {
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &x) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(db) {
            let x = x as f64;
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
    }

    /// Schwellen `mittel + n_std * std` (Populations-Standardabweichung)
    pub(crate) fn thresholds(&self, n_std: f32, out: &mut [f32]) {
        let n = self.count.max(1) as f64;
        for ((t, &mean), &m2) in out.iter_mut().zip(&self.mean).zip(&self.m2) {
            let std = (m2 / n).max(0.0).sqrt();
            *t = (mean + n_std as f64 * std) as f32;
        }
    }
}

/// Aus einer reinen Rauschaufnahme gelerntes Profil
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    fft_size: usize,
    frames: usize,
    mean_db: Vec<f32>,
    std_db: Vec<f32>,
}

impl NoiseProfile {
    /// Lernt das Profil aus einer Rauschreferenz.
    ///
    /// Allokiert; nicht fuer den Echtzeit-Kontext gedacht.
    pub fn from_reference(reference: &[f32], settings: &SuppressorSettings) -> AudioResult<Self> {
        settings.validate()?;
        if reference.is_empty() {
            return Err(AudioError::Konfiguration("Rauschreferenz ist leer".into()));
        }
        if reference.iter().any(|s| !s.is_finite()) {
            return Err(AudioError::Konfiguration(
                "Rauschreferenz enthaelt NaN/Inf".into(),
            ));
        }

        let mut stft = Stft::new(settings.fft_size, settings.hop_size);
        let bins = stft.bins();
        let frames = stft.frame_count(reference.len());
        let mut padded = vec![0.0f32; stft.padded_len(reference.len())];
        let offset = stft.offset();
        padded[offset..offset + reference.len()].copy_from_slice(reference);

        let mut spectrum = vec![Complex32::default(); bins];
        let mut db = vec![0.0f32; frames * bins];
        for (t, row) in db.chunks_exact_mut(bins).enumerate() {
            stft.analyze_frame(&padded, t, &mut spectrum);
            for (d, c) in row.iter_mut().zip(&spectrum) {
                *d = amp_to_db(c.norm());
            }
        }
        clamp_top_db(&mut db, bins, &mut vec![0.0; bins]);

        let mut stats = BinStatistics::new(bins);
        for row in db.chunks_exact(bins) {
            stats.push_frame(row);
        }

        let n = stats.count().max(1) as f64;
        let mean_db = stats.mean.iter().map(|&m| m as f32).collect();
        let std_db = stats
            .m2
            .iter()
            .map(|&m2| (m2 / n).max(0.0).sqrt() as f32)
            .collect();

        Ok(Self {
            fft_size: settings.fft_size,
            frames,
            mean_db,
            std_db,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bins(&self) -> usize {
        self.mean_db.len()
    }

    /// Anzahl der Rahmen, aus denen das Profil gelernt wurde
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn mean_db(&self) -> &[f32] {
        &self.mean_db
    }

    pub fn std_db(&self) -> &[f32] {
        &self.std_db
    }

    pub(crate) fn thresholds(&self, n_std: f32, out: &mut [f32]) {
        for ((t, &m), &s) in out.iter_mut().zip(&self.mean_db).zip(&self.std_db) {
            *t = m + n_std * s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_umrechnung() {
        assert!((amp_to_db(1.0)).abs() < 1e-6);
        assert!((amp_to_db(0.1) + 20.0).abs() < 1e-4);
        assert!((amp_to_db(0.0) + 200.0).abs() < 1e-3);
    }

    #[test]
    fn top_db_pro_bin() {
        // Zwei Bins, drei Rahmen
        let mut db = [0.0, -10.0, -120.0, -200.0, -50.0, -95.0];
        let mut maxima = [0.0f32; 2];
        clamp_top_db(&mut db, 2, &mut maxima);
        // Bin 0: Maximum 0 dB, Grenze -80; Bin 1: Maximum -10 dB, Grenze -90
        assert_eq!(db, [0.0, -10.0, -80.0, -90.0, -50.0, -90.0]);
    }

    #[test]
    fn welford_mittel_und_std() {
        let mut stats = BinStatistics::new(2);
        stats.push_frame(&[1.0, 10.0]);
        stats.push_frame(&[3.0, 10.0]);
        let mut t = [0.0f32; 2];
        stats.thresholds(1.0, &mut t);
        // Bin 0: Mittel 2, Std 1; Bin 1: konstant
        assert!((t[0] - 3.0).abs() < 1e-6);
        assert!((t[1] - 10.0).abs() < 1e-6);

        stats.reset();
        assert_eq!(stats.count(), 0);
    }

    #[test]
    fn profil_aus_rauschen() {
        let settings = SuppressorSettings::default();
        let rauschen: Vec<f32> = (0..8192u32)
            .map(|i| ((i.wrapping_mul(2_654_435_761) >> 8) as f32 / (1u32 << 24) as f32) * 0.1 - 0.05)
            .collect();
        let profil = NoiseProfile::from_reference(&rauschen, &settings).unwrap();
        assert_eq!(profil.bins(), 513);
        assert_eq!(profil.fft_size(), 1024);
        assert_eq!(profil.frames(), 1 + 8192 / 256);
        assert!(profil.mean_db().iter().all(|m| m.is_finite()));
        assert!(profil.std_db().iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn leere_referenz_abgelehnt() {
        let result = NoiseProfile::from_reference(&[], &SuppressorSettings::default());
        assert!(matches!(result, Err(AudioError::Konfiguration(_))));
    }
}
