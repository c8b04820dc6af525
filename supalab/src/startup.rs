use supalab_core::config::{load_files, ConfigMap, DEFAULT_CONFIG_FILE};
use supalab_core::utils::format::error_line;
use tracing::debug;

use crate::cli::Cli;
use crate::utils::ui::Ui;

/// `default.cfg` first, then the files named on the command line. Rejected
/// lines and unreadable files are reported and skipped. `--url` and
/// `--api-key` win over every file.
pub fn load_config(cli: &Cli, ui: &Ui) -> ConfigMap {
    let mut files = vec![DEFAULT_CONFIG_FILE.to_string()];
    files.extend(cli.config_files.iter().cloned());

    let mut config = ConfigMap::new();
    let report = load_files(&cli.config_dir, &files, &mut config);
    for line in &report.rejected {
        ui.println(format!("{line}?"));
    }
    for error in &report.errors {
        ui.println(error_line(error.to_string()));
    }
    debug!("Loaded {} config file(s)", report.loaded.len());

    if let Some(url) = &cli.url {
        config.insert("url", url.as_str());
    }
    if let Some(api_key) = &cli.api_key {
        config.insert("api_key", api_key.as_str());
    }
    config
}
