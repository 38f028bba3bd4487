// Audiorelay - single-producer live audio relay
// Module declarations
pub mod audio;
pub mod cli;
pub mod relay;
pub mod server;
pub mod session;
pub mod settings;
pub mod state;

use anyhow::{Context, Result};
use tracing::{info, warn};

use audio::{AudioOutput, NullSink, PlaybackSink};
use cli::Cli;
use relay::{Relay, RelayOptions, ResultFile};
use settings::ServerSettings;
use state::AppState;

/// Run the relay until the servers fail or Ctrl-C is received.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.resolve_settings()?;

    if cli.write_default_config {
        settings.save(&cli.config)?;
        return Ok(());
    }

    let sink = open_sink(&settings).await?;
    let relay = Relay::start(
        sink,
        ResultFile::new(settings.storage.result_file.clone()),
        RelayOptions {
            feed_chunk: settings.playback.feed_chunk_samples,
        },
    );
    let state = AppState::new(relay.handle(), settings);

    let result = tokio::select! {
        result = server::serve(state) => result,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Closing the application"),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
            Ok(())
        }
    };

    relay.shutdown().await;
    result
}

/// The device handshake blocks, so it runs off the async workers.
async fn open_sink(settings: &ServerSettings) -> Result<Box<dyn PlaybackSink>> {
    if !settings.playback.enabled {
        info!("Playback disabled, relaying to the recording only");
        return Ok(Box::new(NullSink));
    }

    let playback = settings.playback.clone();
    let output = tokio::task::spawn_blocking(move || AudioOutput::open(&playback))
        .await
        .context("Audio output task failed")?
        .context("Failed to initialize audio output")?;
    Ok(Box::new(output))
}
