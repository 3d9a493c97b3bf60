pub mod automation;
pub mod task;

use anyhow::Result;
use tf_core::config::Config;
use tf_daemon::daemon::Daemon;

/// Open the configured store and wire the engine and automation runners
/// in-process. The HTTP server is not started.
pub async fn open(config: Config) -> Result<Daemon> {
    Daemon::new(config).await
}

/// Render `rows` as a two-column table under `title`.
pub fn table(title: &str, rows: &[(&str, String)]) -> String {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    out.push_str(title);
    out.push('\n');
    out.push_str(&"-".repeat(title.len().max(width + 8)));
    out.push('\n');
    for (label, value) in rows {
        out.push_str(&format!("{label:<width$}  {value}\n"));
    }
    out
}
