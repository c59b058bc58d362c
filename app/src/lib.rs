//! Klarton – Runner fuer die Rauschunterdrueckung
//!
//! Verbindet Konfiguration, Logging und die ControlFacade aus
//! `klarton-audio`. Die eigentliche Audio-Logik liegt dort.

pub mod config;
