//! Audio-Geraete-Enumeration und -Auswahl
//!
//! Der `DeviceCatalog` ist eine reine Abfrage gegen den Host: jede
//! Methode fragt neu ab, es wird nichts zwischengespeichert. Bei
//! Hot-Plug koennen sich die Ergebnisse zwischen zwei Aufrufen aendern.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::host::AudioHost;

/// Namensbestandteile typischer virtueller Mikrofone
const VIRTUELLE_SCHLUESSELWOERTER: [&str; 5] = ["VB", "Virtual", "Cable", "VoiceMeeter", "BlackHole"];

/// Bezeichner eines Geraets (Anzeigename im Host)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Momentaufnahme eines Audio-Geraets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Position in der Enumeration des Hosts
    pub index: usize,
    /// Bezeichner fuer `start()`
    pub id: DeviceId,
    /// Anzeigename des Geraets
    pub name: String,
    /// Maximale Eingabekanaele (0 = keine Aufnahme)
    pub max_input_channels: u16,
    /// Maximale Ausgabekanaele (0 = keine Wiedergabe)
    pub max_output_channels: u16,
}

impl AudioDevice {
    pub fn is_input_capable(&self) -> bool {
        self.max_input_channels > 0
    }

    pub fn is_output_capable(&self) -> bool {
        self.max_output_channels > 0
    }
}

/// Abfrage der verfuegbaren Geraete
#[derive(Clone)]
pub struct DeviceCatalog {
    host: Arc<dyn AudioHost>,
}

impl DeviceCatalog {
    pub fn new(host: Arc<dyn AudioHost>) -> Self {
        Self { host }
    }

    /// Listet alle Geraete in der Reihenfolge des Hosts auf
    pub fn list_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        let devices = self.host.enumerate_devices()?;
        debug!(anzahl = devices.len(), host = self.host.name(), "Geraete abgefragt");
        Ok(devices)
    }

    /// Alle Geraete mit mindestens einem Eingabekanal
    pub fn input_capable_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self
            .list_devices()?
            .into_iter()
            .filter(AudioDevice::is_input_capable)
            .collect())
    }

    /// Alle Geraete mit mindestens einem Ausgabekanal
    pub fn output_capable_devices(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self
            .list_devices()?
            .into_iter()
            .filter(AudioDevice::is_output_capable)
            .collect())
    }

    /// Standard-Eingabegeraet des Hosts, sonst das erste aufnahmefaehige.
    ///
    /// `None` wenn kein aufnahmefaehiges Geraet existiert.
    pub fn default_input_device(&self) -> AudioResult<Option<AudioDevice>> {
        let inputs = self.input_capable_devices()?;
        if let Some(default_id) = self.host.default_input_device() {
            if let Some(dev) = inputs.iter().find(|d| d.id == default_id) {
                return Ok(Some(dev.clone()));
            }
            debug!(id = %default_id, "Host-Standardeingabe nicht aufnahmefaehig, nehme erstes Geraet");
        }
        Ok(inputs.into_iter().next())
    }

    /// Wahrscheinliches virtuelles Mikrofon, sonst das erste Ausgabegeraet
    pub fn virtual_output_candidate(&self) -> AudioResult<Option<AudioDevice>> {
        let outputs = self.output_capable_devices()?;
        let virtuell = outputs.iter().position(|d| {
            VIRTUELLE_SCHLUESSELWOERTER
                .iter()
                .any(|k| d.name.contains(k))
        });
        Ok(match virtuell {
            Some(pos) => outputs.into_iter().nth(pos),
            None => outputs.into_iter().next(),
        })
    }

    /// Sucht ein Geraet anhand seines Bezeichners (exakt, erster Treffer)
    pub fn find(&self, id: &DeviceId) -> AudioResult<AudioDevice> {
        find_in(&self.list_devices()?, id)
    }
}

impl fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCatalog")
            .field("host", &self.host.name())
            .finish()
    }
}

pub(crate) fn find_in(devices: &[AudioDevice], id: &DeviceId) -> AudioResult<AudioDevice> {
    devices
        .iter()
        .find(|d| &d.id == id)
        .cloned()
        .ok_or_else(|| AudioError::GeraetNichtGefunden(id.to_string()))
}
