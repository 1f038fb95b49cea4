use std::{error::Error, fs, path::Path};

use flee_core::Config;
use log::debug;

/// Endpoint settings from either a `flee://` URL or a JSON file.
pub fn load(url: Option<&str>, path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    match (url, path) {
        (Some(url), _) => Ok(Config::from_url(url)?),
        (None, Some(path)) => {
            debug!("Loading config from {:?}", path);
            let text = fs::read_to_string(path)?;
            from_json(&text)
        }
        (None, None) => Err("either --url or --config is required".into()),
    }
}

fn from_json(text: &str) -> Result<Config, Box<dyn Error>> {
    let cfg: Config = serde_json::from_str(text)?;
    Ok(cfg.validate()?)
}
