use std::env;
use std::path::PathBuf;

fn fallback_dotenv_paths(runes_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(base) = runes_home {
        out.push(base.join(".env"));
    }
    if let Some(home) = home_dir {
        let candidate = home.join(".odin-runes").join(".env");
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Loads the first `.env` found: working directory, then `$ODIN_RUNES_HOME`,
/// then `~/.odin-runes`. Variables already set are never overwritten.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let candidates = fallback_dotenv_paths(
        env::var_os("ODIN_RUNES_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );
    for path in candidates {
        if path.is_file() && dotenvy::from_path(&path).is_ok() {
            return;
        }
    }
}
