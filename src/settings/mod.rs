// Server settings
#[allow(clippy::module_inception)]
mod settings;

pub use settings::{NetworkSettings, PlaybackSettings, ServerSettings, StaticSettings, StorageSettings};
