use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RunesPaths {
    pub runes_home: PathBuf,
    pub settings_file: PathBuf,
    pub context_snapshot: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<RunesPaths> {
    let home = required_home_dir()?;
    let runes_home = env_or_default_path("ODIN_RUNES_HOME", home.join(".odin-runes"));

    let settings_file =
        env_or_default_path("ODIN_RUNES_CONFIG_PATH", runes_home.join("settings.toml"));
    let context_snapshot = env_or_default_path(
        "ODIN_RUNES_CONTEXT_PATH",
        runes_home.join("state").join("context.json"),
    );

    Ok(RunesPaths {
        runes_home,
        settings_file,
        context_snapshot,
    })
}
