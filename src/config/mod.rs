pub mod settings;

use settings::Settings;
use std::path::Path;

/// Settings file name looked up by [`load_settings`].
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Load `settings.yaml` from `dir`.
///
/// A missing file yields the default settings; a present but malformed file is
/// an error.
pub fn load_settings(dir: &Path) -> crate::error::Result<Settings> {
    let settings_path = dir.join(SETTINGS_FILE);

    if settings_path.exists() {
        tracing::debug!(path = %settings_path.display(), "loading settings");
        Settings::from_file(&settings_path)
    } else {
        Ok(Settings::default())
    }
}
