//! Laufzeit-Statistiken einer Sitzung
//!
//! Zaehler, geschrieben aus den Audio-Callbacks und gelesen vom
//! Steuer-Thread. Der letzte Blockfehler wird nur per `try_lock`
//! abgelegt, der Callback blockiert nie.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::CallbackFault;

/// Momentaufnahme der Statistiken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioStats {
    /// Erfolgreich verarbeitete Bloecke seit Start
    pub blocks_processed: u64,
    /// Bloecke, die durch Ersatzausgabe ersetzt wurden
    pub callback_faults: u64,
    /// Verworfene Eingabe: Ring-Buffer voll oder Rueckstau abgebaut
    pub input_overruns: u64,
    /// Ausgabe-Callbacks, die mit Stille aufgefuellt wurden
    pub output_underruns: u64,
}

/// Zaehler einer laufenden Sitzung
#[derive(Debug, Default)]
pub struct PipelineStats {
    blocks_processed: AtomicU64,
    callback_faults: AtomicU64,
    input_overruns: AtomicU64,
    output_underruns: AtomicU64,
    last_fault: Mutex<Option<CallbackFault>>,
}

impl PipelineStats {
    pub fn record_block(&self) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Zaehlt einen Blockfehler und gibt die neue Gesamtzahl zurueck
    pub fn record_fault(&self, fault: CallbackFault) -> u64 {
        if let Some(mut letzter) = self.last_fault.try_lock() {
            *letzter = Some(fault);
        }
        self.callback_faults.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Meldet neue Blockfehler, wenn die Anzahl seit `gemeldet` die naechste
    /// Zweierpotenz erreicht hat (1, 2, 4, 8, ...). Setzt `gemeldet` weiter.
    pub fn fault_report(&self, gemeldet: &mut u64) -> Option<(u64, Option<CallbackFault>)> {
        let anzahl = self.callback_faults.load(Ordering::Relaxed);
        if anzahl < gemeldet.saturating_add(1).next_power_of_two() {
            return None;
        }
        *gemeldet = anzahl;
        Some((anzahl, self.last_fault.lock().take()))
    }

    pub fn record_overrun(&self) {
        self.input_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.output_underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AudioStats {
        AudioStats {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            callback_faults: self.callback_faults.load(Ordering::Relaxed),
            input_overruns: self.input_overruns.load(Ordering::Relaxed),
            output_underruns: self.output_underruns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_default() {
        let stats = AudioStats::default();
        assert_eq!(stats.blocks_processed, 0);
        assert_eq!(stats.callback_faults, 0);
    }

    #[test]
    fn zaehler_erhoehen() {
        let stats = PipelineStats::default();
        stats.record_block();
        stats.record_block();
        assert_eq!(stats.record_fault(CallbackFault::NichtEndlich), 1);
        assert_eq!(stats.record_fault(CallbackFault::NichtEndlich), 2);
        stats.record_underrun();
        let snap = stats.snapshot();
        assert_eq!(snap.blocks_processed, 2);
        assert_eq!(snap.callback_faults, 2);
        assert_eq!(snap.output_underruns, 1);
        assert_eq!(snap.input_overruns, 0);
    }

    #[test]
    fn fehlerbericht_bei_zweierpotenzen() {
        let stats = PipelineStats::default();
        let mut gemeldet = 0;
        assert!(stats.fault_report(&mut gemeldet).is_none());

        stats.record_fault(CallbackFault::Panik("kaputt".into()));
        let (anzahl, fehler) = stats.fault_report(&mut gemeldet).unwrap();
        assert_eq!(anzahl, 1);
        assert_eq!(fehler, Some(CallbackFault::Panik("kaputt".into())));
        assert!(stats.fault_report(&mut gemeldet).is_none());

        // 2 wird gemeldet, 3 nicht, erst wieder 4
        stats.record_fault(CallbackFault::NichtEndlich);
        assert_eq!(stats.fault_report(&mut gemeldet).map(|r| r.0), Some(2));
        stats.record_fault(CallbackFault::NichtEndlich);
        assert!(stats.fault_report(&mut gemeldet).is_none());
        stats.record_fault(CallbackFault::NichtEndlich);
        let (anzahl, fehler) = stats.fault_report(&mut gemeldet).unwrap();
        assert_eq!(anzahl, 4);
        assert_eq!(fehler, Some(CallbackFault::NichtEndlich));
        assert_eq!(gemeldet, 4);
    }
}
