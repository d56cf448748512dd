use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::output::Output;

/// Print the effective configuration
pub fn show(config: &Config, output: &Output) -> Result<()> {
    output.report("config.show", config);
    Ok(())
}

/// Write the default configuration
pub fn init(data_dir: &Path, force: bool, output: &Output) -> Result<()> {
    let path = Config::path_in(data_dir);
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let config = Config {
        path: path.clone(),
        ..Default::default()
    };
    config.save()?;

    output.done(
        "config.init",
        &format!("Wrote default config to {}", path.display()),
    );
    Ok(())
}
