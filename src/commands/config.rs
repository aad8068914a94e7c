use anyhow::Result;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::Settings;
use crate::paths;
use crate::ui;

pub fn run(_ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(),
        ConfigCommand::Path => path(),
    }
}

fn show() -> Result<()> {
    ui::header("Settings");

    let file = paths::config_file()?;
    println!();
    ui::kv("Config directory", &paths::config_dir()?.display().to_string());
    if file.exists() {
        ui::kv("Settings file", &file.display().to_string());
    } else {
        ui::kv("Settings file", &format!("{} (not found, using defaults)", file.display()));
    }

    let settings = Settings::load_from(&file)?;
    println!();
    ui::info("Effective settings");
    for line in settings.to_toml()?.lines() {
        ui::dim(line);
    }

    println!();
    ui::dim(&format!(
        "Set {} to use another directory.",
        paths::ENV_CONFIG_DIR
    ));

    Ok(())
}

fn path() -> Result<()> {
    println!("{}", paths::config_file()?.display());
    Ok(())
}
