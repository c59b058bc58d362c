//! Fehlertypen fuer die Audio-Engine

use thiserror::Error;

/// Richtung, die ein Geraet fuer eine Sitzung unterstuetzen muss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Richtung {
    Eingabe,
    Ausgabe,
}

impl std::fmt::Display for Richtung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eingabe => f.write_str("Eingabe"),
            Self::Ausgabe => f.write_str("Ausgabe"),
        }
    }
}

/// Alle moeglichen Fehler der Audio-Engine
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Subsystem nicht erreichbar: {0}")]
    GeraeteAbfrage(String),

    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Geraet '{geraet}' unterstuetzt keine {richtung}-Kanaele")]
    UngueltigesGeraet { geraet: String, richtung: Richtung },

    #[error("Stream konnte nicht geoeffnet werden: {0}")]
    StreamOeffnen(String),

    #[error("Pipeline laeuft bereits")]
    LaeuftBereits,

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Fehler innerhalb eines einzelnen Audio-Blocks.
///
/// Verlaesst nie den Echtzeit-Callback: wird geloggt und durch
/// Stille oder den letzten guten Block ersetzt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallbackFault {
    #[error("Blocklaenge passt nicht: Eingabe {eingabe} Samples, Ausgabe {ausgabe} Samples")]
    BlockLaenge { eingabe: usize, ausgabe: usize },

    #[error("Prozessor lieferte NaN/Inf")]
    NichtEndlich,

    #[error("Prozessor-Panik: {0}")]
    Panik(String),

    #[error("Prozessor-Fehler: {0}")]
    Prozessor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungueltiges_geraet_meldung() {
        let err = AudioError::UngueltigesGeraet {
            geraet: "Lautsprecher".into(),
            richtung: Richtung::Eingabe,
        };
        assert_eq!(
            err.to_string(),
            "Geraet 'Lautsprecher' unterstuetzt keine Eingabe-Kanaele"
        );
    }

    #[test]
    fn callback_fault_meldung() {
        let fault = CallbackFault::BlockLaenge {
            eingabe: 3,
            ausgabe: 4,
        };
        assert!(fault.to_string().contains("Eingabe 3"));
    }
}
