//! Klarton – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und leitet das
//! Mikrofon entrauscht auf das Ausgabegeraet, bis Strg+C gedrueckt wird.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use klarton::config::KlartonConfig;
use klarton_audio::{AudioHost, ControlFacade, CpalHost, DeviceCatalog, DeviceId};
use klarton_observability::logging_initialisieren;

#[derive(Parser, Debug)]
#[command(name = "klarton", version, about = "Echtzeit-Rauschunterdrueckung fuer ein virtuelles Mikrofon")]
struct Cli {
    /// Pfad zur Konfigurationsdatei
    #[arg(short, long, env = "KLARTON_CONFIG", default_value = "klarton.toml")]
    config: String,

    /// Eingabegeraet (ueberschreibt die Konfiguration)
    #[arg(short, long)]
    eingabe: Option<String>,

    /// Ausgabegeraet (ueberschreibt die Konfiguration)
    #[arg(short, long)]
    ausgabe: Option<String>,

    #[command(subcommand)]
    befehl: Option<Befehl>,
}

#[derive(Subcommand, Debug)]
enum Befehl {
    /// Listet alle Audio-Geraete mit ihren Kanalzahlen auf
    Geraete,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = KlartonConfig::laden(&cli.config)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)
        .map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))?;

    let host: Arc<dyn AudioHost> = Arc::new(CpalHost::new());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config,
        host = host.name(),
        "Klarton wird initialisiert"
    );

    if let Some(Befehl::Geraete) = cli.befehl {
        return geraete_auflisten(&DeviceCatalog::new(host));
    }

    let facade = Arc::new(ControlFacade::new(
        Arc::clone(&host),
        config.pipeline.clone(),
        config.unterdrueckung.clone(),
    ));

    let eingabe = match cli.eingabe.or(config.geraete.eingabe) {
        Some(name) => DeviceId::from(name),
        None => {
            facade
                .catalog()
                .default_input_device()?
                .context("Kein Eingabegeraet gefunden")?
                .id
        }
    };
    let ausgabe = match cli.ausgabe.or(config.geraete.ausgabe) {
        Some(name) => DeviceId::from(name),
        None => {
            facade
                .catalog()
                .virtual_output_candidate()?
                .context("Kein Ausgabegeraet gefunden")?
                .id
        }
    };

    // Statusaenderungen loggen, endet mit der Facade
    let status_rx = facade.subscribe();
    let status_log = tokio::task::spawn_blocking(move || {
        for status in status_rx.iter() {
            tracing::info!(%status, "Status geaendert");
        }
    });

    let start_facade = Arc::clone(&facade);
    let handle = tokio::task::spawn_blocking(move || start_facade.start(eingabe, ausgabe))
        .await
        .context("Start-Task abgebrochen")??;

    tracing::info!(
        sitzung = %handle.id,
        eingabe = %handle.config.input_device(),
        ausgabe = %handle.config.output_device(),
        "Rauschunterdrueckung laeuft, Strg+C zum Beenden"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Beende...");

    let stop_facade = Arc::clone(&facade);
    tokio::task::spawn_blocking(move || stop_facade.stop())
        .await
        .context("Stop-Task abgebrochen")?;

    let stats = facade.stats();
    tracing::info!(
        bloecke = stats.blocks_processed,
        fehler = stats.callback_faults,
        overruns = stats.input_overruns,
        underruns = stats.output_underruns,
        "Sitzung beendet"
    );

    drop(facade);
    let _ = status_log.await;
    Ok(())
}

fn geraete_auflisten(catalog: &DeviceCatalog) -> Result<()> {
    let standard = catalog.default_input_device()?.map(|d| d.id);
    let virtuell = catalog.virtual_output_candidate()?.map(|d| d.id);

    println!("{:>3}  {:>4}  {:>4}  Name", "Nr", "Ein", "Aus");
    for device in catalog.list_devices()? {
        let mut merkmale = Vec::new();
        if standard.as_ref() == Some(&device.id) {
            merkmale.push("Standard-Eingabe");
        }
        if virtuell.as_ref() == Some(&device.id) {
            merkmale.push("Ausgabe-Vorschlag");
        }
        let merkmale = if merkmale.is_empty() {
            String::new()
        } else {
            format!("  [{}]", merkmale.join(", "))
        };
        println!(
            "{:>3}  {:>4}  {:>4}  {}{}",
            device.index,
            device.max_input_channels,
            device.max_output_channels,
            device.name,
            merkmale
        );
    }
    Ok(())
}
