use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::settings::ServerSettings;

#[derive(Debug, Clone, Parser)]
#[command(name = "audiorelay", version, about = "Relay one client's live audio to the local speakers")]
pub struct Cli {
    /// Settings file (JSON). Missing files fall back to defaults.
    #[arg(long, default_value = "audiorelay.json")]
    pub config: PathBuf,

    /// Write the effective settings to `--config` and exit.
    #[arg(long, default_value_t = false)]
    pub write_default_config: bool,

    #[arg(long)]
    pub hostname: Option<String>,

    #[arg(long)]
    pub http_port: Option<u16>,

    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Where released recordings are written.
    #[arg(long)]
    pub result_file: Option<PathBuf>,

    /// Run without opening an audio output device.
    #[arg(long, default_value_t = false)]
    pub no_playback: bool,
}

impl Cli {
    /// Load the settings file and apply command line overrides.
    pub fn resolve_settings(&self) -> Result<ServerSettings> {
        let mut settings = ServerSettings::load(&self.config)?;
        self.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut ServerSettings) {
        if let Some(hostname) = &self.hostname {
            settings.network.hostname = hostname.clone();
        }
        if let Some(port) = self.http_port {
            settings.network.http_port = port;
        }
        if let Some(port) = self.ws_port {
            settings.network.ws_port = port;
        }
        if let Some(path) = &self.result_file {
            settings.storage.result_file = path.clone();
        }
        if self.no_playback {
            settings.playback.enabled = false;
        }
    }
}
