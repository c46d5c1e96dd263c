//! `nova`: runs the voice appliance audio core on desktop audio devices.
//!
//! The engine owns the microphone and speaker and runs on the main thread
//! (cpal streams may not leave the thread that opened them). Two helper
//! threads talk to it over channels: one turns console lines into commands,
//! the other prints engine events as JSON lines.

mod commands;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nova_core::audio::SAMPLE_RATE;
use nova_core::engine::event_channel;
use nova_core::{
    CpalMicrophone, CpalSpeaker, EngineParts, HttpBackend, MonotonicClock, NovaEngine,
    StubClassifier,
};
use settings::{default_settings_path, load_settings, save_settings};
use tracing::info;

/// Longest a single device read or write may block before it counts as a
/// hardware fault.
const DEVICE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "nova", version, about = "Wake-word voice appliance")]
struct Cli {
    /// Settings file (JSON). Defaults to the per-user config directory.
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Voice backend endpoint receiving the recording.
    #[arg(long, env = "NOVA_BACKEND_URL")]
    backend_url: Option<String>,

    #[arg(long, value_name = "NAME")]
    input_device: Option<String>,

    #[arg(long, value_name = "NAME")]
    output_device: Option<String>,

    /// Disable the feedback tones.
    #[arg(long)]
    no_earcons: bool,

    /// List audio devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Write the effective settings to the settings file and exit.
    #[arg(long)]
    write_settings: bool,

    /// More logging (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "nova=info,nova_core=info",
        1 => "nova=debug,nova_core=debug",
        _ => "nova=trace,nova_core=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list_devices {
        commands::print_devices();
        return Ok(());
    }

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if let Some(url) = cli.backend_url {
        settings.backend_url = url;
    }
    if cli.input_device.is_some() {
        settings.preferred_input_device = cli.input_device;
    }
    if cli.output_device.is_some() {
        settings.preferred_output_device = cli.output_device;
    }
    if cli.no_earcons {
        settings.earcons = false;
    }
    settings.normalize();

    if cli.write_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("writing {}", settings_path.display()))?;
        println!("wrote {}", settings_path.display());
        return Ok(());
    }

    info!(
        settings = %settings_path.display(),
        backend = settings.backend_url.as_str(),
        "Nova starting"
    );

    let config = settings.engine_config();
    config.validate().context("invalid settings")?;

    let capture = CpalMicrophone::open(
        settings.preferred_input_device.as_deref(),
        SAMPLE_RATE,
        DEVICE_TIMEOUT,
    )
    .context("opening microphone")?;
    let output = CpalSpeaker::open(
        settings.preferred_output_device.as_deref(),
        SAMPLE_RATE,
        DEVICE_TIMEOUT,
    )
    .context("opening speaker")?;
    let backend = HttpBackend::new(settings.backend_url.clone(), settings.request_timeout())
        .context("creating backend client")?;
    let classifier = StubClassifier::new(
        settings.wake_label.clone(),
        settings.stub_floor,
        settings.stub_loud,
    );

    let (events_tx, events_rx) = event_channel();
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let printer = commands::spawn_event_printer(events_rx).context("starting event printer")?;
    commands::spawn_command_reader(std::io::BufReader::new(std::io::stdin()), command_tx)
        .context("starting console reader")?;

    let mut engine = NovaEngine::new(
        config,
        EngineParts {
            capture: Box::new(capture),
            output: Box::new(output),
            classifier: Box::new(classifier),
            backend: Box::new(backend),
            clock: Arc::new(MonotonicClock),
            commands: command_rx,
            events: events_tx,
        },
    )?;
    let diagnostics = engine.diagnostics();
    let outcome = engine.run();

    // Closing the last sender ends the printer.
    drop(engine);
    let _ = printer.join();

    let snap = diagnostics.snapshot();
    info!(
        wakes = snap.wakes,
        sessions = snap.sessions_completed,
        failed = snap.sessions_failed,
        incomplete = snap.incomplete_replies,
        "Nova stopped"
    );
    outcome.context("engine stopped with an error")
}
