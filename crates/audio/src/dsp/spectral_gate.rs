//! Stationaere spektrale Rauschunterdrueckung (Spectral Gating)
//!
//! Pro Block:
//! 1. STFT mit Hann-Fenster (zentriert, Nullen an beiden Enden)
//! 2. Betrag in dB (pro Bin auf 80 dB unter dem Blockmaximum begrenzt),
//!    Schwelle pro Bin = Mittel + `n_std_thresh` * Std
//! 3. Binaere Maske `dB > Schwelle`, geglaettet mit einem separierbaren
//!    Dreieckskern ueber Frequenz (±`freq_mask_smooth_hz`) und Zeit
//!    (±`time_mask_smooth_ms`)
//! 4. Gain = Maske * `prop_decrease` + (1 - `prop_decrease`)
//! 5. ISTFT, normiert mit der Summe der quadrierten Fenster
//!
//! Die Rauschstatistik stammt aus dem aktuellen Block, aus der ganzen
//! Sitzung oder aus einem vorab gelernten `NoiseProfile`.

use rustfft::num_complex::Complex32;
use serde::{Deserialize, Serialize};

use super::noise_profile::{amp_to_db, clamp_top_db, BinStatistics, NoiseProfile};
use super::stft::Stft;
use super::AudioProcessor;
use crate::config::{BLOCK_SIZE, SAMPLE_RATE};
use crate::error::{AudioError, AudioResult, CallbackFault};

/// Obergrenze der halben Zeit-Kernbreite in Rahmen
pub const MAX_ZEIT_RAHMEN: usize = 64;

/// Quelle der Rauschstatistik, falls kein Profil gesetzt ist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseEstimate {
    /// Statistik nur aus dem aktuellen Block
    #[default]
    Block,
    /// Laufende Statistik ueber alle Bloecke der Sitzung
    Sitzung,
}

/// Parameter der Rauschunterdrueckung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressorSettings {
    pub fft_size: usize,
    pub hop_size: usize,
    /// Abstand der Schwelle vom Rauschmittel in Standardabweichungen
    pub n_std_thresh: f32,
    /// Anteil der Unterdrueckung: 1.0 = voll, 0.0 = aus
    pub prop_decrease: f32,
    pub freq_mask_smooth_hz: f32,
    pub time_mask_smooth_ms: f32,
    pub noise_estimate: NoiseEstimate,
}

impl Default for SuppressorSettings {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            hop_size: 256,
            n_std_thresh: 1.5,
            prop_decrease: 1.0,
            freq_mask_smooth_hz: 500.0,
            time_mask_smooth_ms: 50.0,
            noise_estimate: NoiseEstimate::Block,
        }
    }
}

impl SuppressorSettings {
    pub fn validate(&self) -> AudioResult<()> {
        if self.fft_size < 16 || self.fft_size % 2 != 0 {
            return Err(AudioError::Konfiguration(format!(
                "fft_size muss gerade und >= 16 sein, ist {}",
                self.fft_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size / 2 {
            return Err(AudioError::Konfiguration(format!(
                "hop_size muss in 1..={} liegen, ist {}",
                self.fft_size / 2,
                self.hop_size
            )));
        }
        if !self.n_std_thresh.is_finite() || self.n_std_thresh < 0.0 {
            return Err(AudioError::Konfiguration(
                "n_std_thresh muss endlich und >= 0 sein".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.prop_decrease) {
            return Err(AudioError::Konfiguration(format!(
                "prop_decrease muss in [0, 1] liegen, ist {}",
                self.prop_decrease
            )));
        }
        let breiten = [self.freq_mask_smooth_hz, self.time_mask_smooth_ms];
        if breiten.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(AudioError::Konfiguration(
                "Glaettungsbreiten muessen endlich und >= 0 sein".into(),
            ));
        }
        self.validate_kernels(SAMPLE_RATE)
    }

    /// Prueft die Kernbreiten fuer eine konkrete Abtastrate.
    ///
    /// Der Frequenzkern darf nicht breiter als das Spektrum sein, der
    /// Zeitkern hoechstens `MAX_ZEIT_RAHMEN` Rahmen.
    pub fn validate_kernels(&self, sample_rate: u32) -> AudioResult<()> {
        let (n_freq, n_time) = self.kernel_widths(sample_rate);
        let max_freq = self.fft_size / 2;
        if n_freq > max_freq as f64 {
            return Err(AudioError::Konfiguration(format!(
                "freq_mask_smooth_hz {} ergibt {} Bins, erlaubt sind {} bei {} Hz",
                self.freq_mask_smooth_hz, n_freq, max_freq, sample_rate
            )));
        }
        if n_time > MAX_ZEIT_RAHMEN as f64 {
            return Err(AudioError::Konfiguration(format!(
                "time_mask_smooth_ms {} ergibt {} Rahmen, erlaubt sind {} bei {} Hz",
                self.time_mask_smooth_ms, n_time, MAX_ZEIT_RAHMEN, sample_rate
            )));
        }
        Ok(())
    }

    /// Halbe Kernbreiten (Frequenz-Bins, Zeit-Rahmen) fuer eine Abtastrate,
    /// begrenzt auf Spektrum und `MAX_ZEIT_RAHMEN`
    pub fn kernel_sizes(&self, sample_rate: u32) -> (usize, usize) {
        let (n_freq, n_time) = self.kernel_widths(sample_rate);
        let n_freq = n_freq.min((self.fft_size / 2) as f64) as usize;
        let n_time = n_time.min(MAX_ZEIT_RAHMEN as f64) as usize;
        (n_freq, n_time)
    }

    fn kernel_widths(&self, sample_rate: u32) -> (f64, f64) {
        let sr = sample_rate.max(1) as f64;
        let hz_pro_bin = sr / (self.fft_size / 2).max(1) as f64;
        let ms_pro_hop = self.hop_size.max(1) as f64 / sr * 1000.0;
        let n_freq = (self.freq_mask_smooth_hz as f64 / hz_pro_bin).floor();
        let n_time = (self.time_mask_smooth_ms as f64 / ms_pro_hop).floor();
        // NaN faellt auf 0
        (n_freq.max(0.0), n_time.max(0.0))
    }
}

/// Spektraler Rauschunterdruecker
///
/// Alle Puffer werden fuer eine Blocklaenge vorab allokiert. Laengere
/// Bloecke vergroessern die Puffer einmalig.
pub struct SpectralGate {
    settings: SuppressorSettings,
    sample_rate: u32,
    stft: Stft,
    bins: usize,
    n_freq: usize,
    n_time: usize,
    profile: Option<NoiseProfile>,
    block_stats: BinStatistics,
    session_stats: BinStatistics,
    enabled: bool,

    capacity: usize,
    padded: Vec<f32>,
    spectra: Vec<Complex32>,
    db: Vec<f32>,
    /// Masken-Historie gefolgt von den Rohmasken des Blocks
    mask: Vec<f32>,
    tmp: Vec<f32>,
    smoothed: Vec<f32>,
    threshold: Vec<f32>,
    acc: Vec<f32>,
    norm: Vec<f32>,
    /// Letzte `n_time` Rohmasken des vorigen Blocks
    history: Vec<f32>,
    history_len: usize,
}

impl SpectralGate {
    /// Unterdruecker fuer die feste Sitzungs-Blockgroesse
    pub fn new(settings: SuppressorSettings, sample_rate: u32) -> AudioResult<Self> {
        Self::with_capacity(settings, sample_rate, BLOCK_SIZE)
    }

    pub fn with_capacity(
        settings: SuppressorSettings,
        sample_rate: u32,
        capacity: usize,
    ) -> AudioResult<Self> {
        settings.validate()?;
        if sample_rate == 0 {
            return Err(AudioError::Konfiguration("Abtastrate 0".into()));
        }
        settings.validate_kernels(sample_rate)?;
        let stft = Stft::new(settings.fft_size, settings.hop_size);
        let bins = stft.bins();
        let (n_freq, n_time) = settings.kernel_sizes(sample_rate);

        let mut gate = Self {
            settings,
            sample_rate,
            stft,
            bins,
            n_freq,
            n_time,
            profile: None,
            block_stats: BinStatistics::new(bins),
            session_stats: BinStatistics::new(bins),
            enabled: true,
            capacity: 0,
            padded: Vec::new(),
            spectra: Vec::new(),
            db: Vec::new(),
            mask: Vec::new(),
            tmp: Vec::new(),
            smoothed: Vec::new(),
            threshold: vec![0.0; bins],
            acc: Vec::new(),
            norm: Vec::new(),
            history: vec![0.0; n_time * bins],
            history_len: 0,
        };
        gate.ensure_capacity(capacity.max(1));
        Ok(gate)
    }

    pub fn settings(&self) -> &SuppressorSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Halbe Kernbreiten der Maskenglaettung (Frequenz, Zeit)
    pub fn kernel_sizes(&self) -> (usize, usize) {
        (self.n_freq, self.n_time)
    }

    pub fn noise_profile(&self) -> Option<&NoiseProfile> {
        self.profile.as_ref()
    }

    /// Setzt ein festes Rauschprofil. Ersetzt die Block-/Sitzungsstatistik.
    pub fn set_noise_profile(&mut self, profile: NoiseProfile) -> AudioResult<()> {
        if profile.fft_size() != self.settings.fft_size || profile.bins() != self.bins {
            return Err(AudioError::Konfiguration(format!(
                "Rauschprofil mit fft_size {} passt nicht zu {}",
                profile.fft_size(),
                self.settings.fft_size
            )));
        }
        self.profile = Some(profile);
        Ok(())
    }

    /// Lernt ein Profil aus einer reinen Rauschaufnahme und setzt es
    pub fn learn_noise_profile(&mut self, reference: &[f32]) -> AudioResult<()> {
        let profile = NoiseProfile::from_reference(reference, &self.settings)?;
        self.set_noise_profile(profile)
    }

    pub fn clear_noise_profile(&mut self) {
        self.profile = None;
    }

    /// Filtert `input` nach `output`. Beide muessen gleich lang sein.
    pub fn reduce_noise(
        &mut self,
        input: &[f32],
        sample_rate: u32,
        output: &mut [f32],
    ) -> Result<(), CallbackFault> {
        if input.len() != output.len() {
            return Err(CallbackFault::BlockLaenge {
                eingabe: input.len(),
                ausgabe: output.len(),
            });
        }
        if !self.enabled {
            output.copy_from_slice(input);
            return Ok(());
        }
        self.load(input, sample_rate)?;
        self.run(output);
        Ok(())
    }

    /// Bequeme Variante mit eigener Ausgabe. Allokiert.
    pub fn denoise(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>, CallbackFault> {
        let mut output = vec![0.0; input.len()];
        self.reduce_noise(input, sample_rate, &mut output)?;
        Ok(output)
    }

    /// Prueft die Eingabe und legt sie in den aufgefuellten Puffer
    fn load(&mut self, input: &[f32], sample_rate: u32) -> Result<(), CallbackFault> {
        if input.iter().any(|s| !s.is_finite()) {
            return Err(CallbackFault::NichtEndlich);
        }
        if sample_rate != self.sample_rate && sample_rate > 0 {
            self.set_sample_rate(sample_rate);
        }
        self.ensure_capacity(input.len());

        let len = self.stft.padded_len(input.len());
        let offset = self.stft.offset();
        self.padded[..len].fill(0.0);
        if !input.is_empty() {
            self.padded[offset..offset + input.len()].copy_from_slice(input);
        }
        Ok(())
    }

    /// Verarbeitet den geladenen Block nach `output`
    fn run(&mut self, output: &mut [f32]) {
        let len = output.len();
        let frames = self.stft.frame_count(len);
        if frames == 0 {
            return;
        }
        let bins = self.bins;

        // Analyse
        for t in 0..frames {
            let row = t * bins..(t + 1) * bins;
            self.stft
                .analyze_frame(&self.padded, t, &mut self.spectra[row.clone()]);
            for (d, c) in self.db[row.clone()].iter_mut().zip(&self.spectra[row]) {
                *d = amp_to_db(c.norm());
            }
        }
        clamp_top_db(&mut self.db[..frames * bins], bins, &mut self.threshold);

        // Schwelle pro Bin
        let n_std = self.settings.n_std_thresh;
        if let Some(profile) = &self.profile {
            profile.thresholds(n_std, &mut self.threshold);
        } else {
            let stats = match self.settings.noise_estimate {
                NoiseEstimate::Block => {
                    self.block_stats.reset();
                    &mut self.block_stats
                }
                NoiseEstimate::Sitzung => &mut self.session_stats,
            };
            for row in self.db[..frames * bins].chunks_exact(bins) {
                stats.push_frame(row);
            }
            stats.thresholds(n_std, &mut self.threshold);
        }

        // Rohmaske hinter die Historie schreiben
        let hist = self.history_len;
        let rows = hist + frames;
        self.mask[..hist * bins].copy_from_slice(&self.history[..hist * bins]);
        for (m_row, d_row) in self.mask[hist * bins..rows * bins]
            .chunks_exact_mut(bins)
            .zip(self.db.chunks_exact(bins))
        {
            for ((m, &d), &th) in m_row.iter_mut().zip(d_row).zip(&self.threshold) {
                *m = if d > th { 1.0 } else { 0.0 };
            }
        }

        self.smooth_time(hist, frames);
        self.smooth_freq(frames);

        // Historie fuer den naechsten Block
        let keep = self.n_time.min(rows);
        let start = rows - keep;
        self.history[..keep * bins].copy_from_slice(&self.mask[start * bins..rows * bins]);
        self.history_len = keep;

        // Gain anwenden und zuruecktransformieren
        let prop = self.settings.prop_decrease;
        for (c, &m) in self.spectra[..frames * bins]
            .iter_mut()
            .zip(&self.smoothed[..frames * bins])
        {
            *c *= m * prop + (1.0 - prop);
        }

        let plen = self.stft.padded_len(len);
        self.acc[..plen].fill(0.0);
        self.norm[..plen].fill(0.0);
        for t in 0..frames {
            self.stft.synthesize_frame(
                &self.spectra[t * bins..(t + 1) * bins],
                t,
                &mut self.acc,
                &mut self.norm,
            );
        }

        let offset = self.stft.offset();
        for (i, out) in output.iter_mut().enumerate() {
            let n = self.norm[offset + i];
            *out = if n > 1e-8 { self.acc[offset + i] / n } else { 0.0 };
        }
    }

    /// Dreiecksglaettung ueber die Zeit. Zeilen ausserhalb werden auf die
    /// Randzeile geklemmt.
    fn smooth_time(&mut self, hist: usize, frames: usize) {
        let bins = self.bins;
        let n = self.n_time as isize;
        let rows = (hist + frames) as isize;
        let norm = ((n + 1) * (n + 1)) as f32;
        for t in 0..frames {
            let out = &mut self.tmp[t * bins..(t + 1) * bins];
            out.fill(0.0);
            let center = (hist + t) as isize;
            for i in -n..=n {
                let w = (n + 1 - i.abs()) as f32 / norm;
                let row = (center + i).clamp(0, rows - 1) as usize;
                for (o, &m) in out.iter_mut().zip(&self.mask[row * bins..(row + 1) * bins]) {
                    *o += w * m;
                }
            }
        }
    }

    /// Dreiecksglaettung ueber die Frequenz mit geklemmten Raendern
    fn smooth_freq(&mut self, frames: usize) {
        let bins = self.bins;
        let n = self.n_freq as isize;
        let last = bins as isize - 1;
        let norm = ((n + 1) * (n + 1)) as f32;
        for t in 0..frames {
            let src = &self.tmp[t * bins..(t + 1) * bins];
            let dst = &mut self.smoothed[t * bins..(t + 1) * bins];
            for (k, d) in dst.iter_mut().enumerate() {
                let mut sum = 0.0;
                for j in -n..=n {
                    let kk = (k as isize + j).clamp(0, last) as usize;
                    sum += (n + 1 - j.abs()) as f32 * src[kk];
                }
                *d = sum / norm;
            }
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        let (n_freq, n_time) = self.settings.kernel_sizes(sample_rate);
        self.n_freq = n_freq;
        if n_time != self.n_time {
            self.n_time = n_time;
            self.history = vec![0.0; n_time * self.bins];
            self.history_len = 0;
            self.mask = vec![0.0; (n_time + self.stft.frame_count(self.capacity)) * self.bins];
        }
    }

    fn ensure_capacity(&mut self, len: usize) {
        if len <= self.capacity && !self.padded.is_empty() {
            return;
        }
        let capacity = len.max(self.capacity).max(1);
        let frames = self.stft.frame_count(capacity);
        let plen = self.stft.padded_len(capacity);
        let cells = frames * self.bins;

        self.capacity = capacity;
        self.padded = vec![0.0; plen];
        self.spectra = vec![Complex32::default(); cells];
        self.db = vec![0.0; cells];
        self.mask = vec![0.0; (self.n_time + frames) * self.bins];
        self.tmp = vec![0.0; cells];
        self.smoothed = vec![0.0; cells];
        self.acc = vec![0.0; plen];
        self.norm = vec![0.0; plen];
    }
}

impl AudioProcessor for SpectralGate {
    fn process(&mut self, samples: &mut [f32]) -> Result<(), CallbackFault> {
        if !self.enabled {
            return Ok(());
        }
        let sample_rate = self.sample_rate;
        self.load(samples, sample_rate)?;
        self.run(samples);
        Ok(())
    }

    fn reset(&mut self) {
        self.history_len = 0;
        self.session_stats.reset();
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl std::fmt::Debug for SpectralGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralGate")
            .field("settings", &self.settings)
            .field("sample_rate", &self.sample_rate)
            .field("kernel", &(self.n_freq, self.n_time))
            .field("profile", &self.profile.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}
