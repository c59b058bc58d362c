//! Ende-zu-Ende: 1-kHz-Ton plus gleichverteiltes Rauschen durch die Pipeline

use std::f32::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use klarton_audio::{
    spectral_gate_factory, AudioPipeline, ControlFacade, DeviceCatalog, NoiseProfile,
    PipelineSettings, SimulatedHost, SpectralGate, SuppressorSettings, BLOCK_SIZE, SAMPLE_RATE,
};
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

const TON_HZ: f32 = 1000.0;
const RAUSCH_AMP: f32 = 0.1;

/// Deterministisches Rauschen in [-amp, amp]
fn rauschen(len: usize, amp: f32, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0) * amp
        })
        .collect()
}

fn ton_mit_rauschen(len: usize) -> Vec<f32> {
    rauschen(len, RAUSCH_AMP, 7)
        .into_iter()
        .enumerate()
        .map(|(i, n)| 0.5 * (2.0 * PI * TON_HZ * i as f32 / SAMPLE_RATE as f32).sin() + n)
        .collect()
}

/// RMS innerhalb und ausserhalb von ±500 Hz um den Ton, gemittelt ueber
/// blockweise Hann-gefensterte Spektren
fn band_rms(signal: &[f32]) -> (f32, f32) {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(BLOCK_SIZE);
    let hz_pro_bin = SAMPLE_RATE as f32 / BLOCK_SIZE as f32;

    let mut innen = 0.0f64;
    let mut aussen = 0.0f64;
    let mut buffer = vec![Complex32::default(); BLOCK_SIZE];
    for block in signal.chunks_exact(BLOCK_SIZE) {
        for (i, (b, &x)) in buffer.iter_mut().zip(block).enumerate() {
            let w = 0.5 - 0.5 * (2.0 * PI * i as f32 / BLOCK_SIZE as f32).cos();
            *b = Complex32::new(x * w, 0.0);
        }
        fft.process(&mut buffer);
        for (k, c) in buffer[..BLOCK_SIZE / 2].iter().enumerate() {
            let energie = c.norm_sqr() as f64;
            if (k as f32 * hz_pro_bin - TON_HZ).abs() <= 500.0 {
                innen += energie;
            } else {
                aussen += energie;
            }
        }
    }
    (innen.sqrt() as f32, aussen.sqrt() as f32)
}

#[test]
fn rauschen_ausserhalb_des_tons_sinkt() {
    let settings = SuppressorSettings::default();
    let profil = NoiseProfile::from_reference(&rauschen(SAMPLE_RATE as usize, RAUSCH_AMP, 99), &settings).unwrap();
    let eingang = ton_mit_rauschen(BLOCK_SIZE * 16);

    let host = Arc::new(
        SimulatedHost::new()
            .with_device("Mic", 1, 0)
            .with_device("VB-Cable", 0, 1)
            .with_input_signal(eingang.clone()),
    );
    let pipeline = AudioPipeline::with_processor_factory(
        host.clone(),
        PipelineSettings::default(),
        spectral_gate_factory(settings, Some(profil)),
    );
    let facade = ControlFacade::with_pipeline(DeviceCatalog::new(host.clone()), pipeline);
    facade.start("Mic", "VB-Cable").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while host.recorded_output().len() < BLOCK_SIZE * 12 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    facade.stop();

    let ausgabe = host.recorded_output();
    assert!(ausgabe.len() >= BLOCK_SIZE * 12, "zu wenig Bloecke: {}", ausgabe.len());
    assert!(ausgabe.iter().all(|s| s.is_finite()));

    // Block k der Ausgabe gehoert zu Block k (mod 16) des Eingangs
    let bloecke = 12;
    let vergleich: Vec<f32> = (0..bloecke)
        .flat_map(|k| {
            let start = (k % 16) * BLOCK_SIZE;
            eingang[start..start + BLOCK_SIZE].to_vec()
        })
        .collect();

    let (innen_ein, aussen_ein) = band_rms(&vergleich);
    let (innen_aus, aussen_aus) = band_rms(&ausgabe[..bloecke * BLOCK_SIZE]);

    assert!(
        aussen_aus < 0.5 * aussen_ein,
        "Rauschen ausserhalb: {aussen_aus} vs {aussen_ein}"
    );
    assert!(
        innen_aus > 0.4 * innen_ein,
        "Ton verloren: {innen_aus} vs {innen_ein}"
    );
}

#[test]
fn direkt_ohne_pipeline() {
    let settings = SuppressorSettings::default();
    let mut gate = SpectralGate::new(settings, SAMPLE_RATE).unwrap();
    gate.learn_noise_profile(&rauschen(SAMPLE_RATE as usize, RAUSCH_AMP, 3))
        .unwrap();

    let eingang = ton_mit_rauschen(BLOCK_SIZE * 8);
    let mut ausgabe = Vec::with_capacity(eingang.len());
    for block in eingang.chunks_exact(BLOCK_SIZE) {
        ausgabe.extend(gate.denoise(block, SAMPLE_RATE).unwrap());
    }

    let (innen_ein, aussen_ein) = band_rms(&eingang);
    let (innen_aus, aussen_aus) = band_rms(&ausgabe);
    assert!(aussen_aus < 0.5 * aussen_ein);
    assert!(innen_aus > 0.4 * innen_ein);
}
