//! Interactive editing of the main settings.

use anyhow::{Context, Result};
use inquire::{CustomType, Select, Text};
use std::path::{Path, PathBuf};
use wdc_core::{CollectorKind, Config};

pub fn configure(path: &Path) -> Result<()> {
    let mut config = if path.exists() {
        Config::load_from(path)?
    } else {
        Config::default()
    };

    let current = config.collector_kind().unwrap_or(CollectorKind::Muensterwetter);
    let kinds = CollectorKind::all().to_vec();
    let start = kinds.iter().position(|k| *k == current).unwrap_or(0);
    config.collector = Select::new("Collector:", kinds)
        .with_starting_cursor(start)
        .prompt()?
        .as_str()
        .to_string();

    config.data_url = Text::new("Station base URL:")
        .with_default(&config.data_url)
        .prompt()?;

    config.interval_minutes = CustomType::<u64>::new("Collect every (minutes):")
        .with_default(config.interval_minutes)
        .with_error_message("Please type a whole number of minutes")
        .prompt()?;

    config.time_zone = Text::new("Station time zone:")
        .with_default(&config.time_zone)
        .with_help_message("IANA id, used until the station reports its own")
        .prompt()?;

    let output_folder = config.output_folder.to_string_lossy().into_owned();
    config.output_folder = PathBuf::from(
        Text::new("Output folder:")
            .with_default(&output_folder)
            .prompt()?,
    );

    config.output_prefix = Text::new("Output file prefix:")
        .with_default(&config.output_prefix)
        .prompt()?;

    let watermark_folder = config.watermark_folder.to_string_lossy().into_owned();
    config.watermark_folder = PathBuf::from(
        Text::new("Folder for the last timestamp file:")
            .with_default(&watermark_folder)
            .prompt()?,
    );

    config.validate().context("The entered settings are not valid")?;
    config.save_to(path)?;
    println!("Saved settings to {}", path.display());

    Ok(())
}
