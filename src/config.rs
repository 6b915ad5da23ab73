use anyhow::{anyhow, Result};

use crate::common::{DEFAULT_DATA_DIR, DEFAULT_LISTEN_ADDR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: String,
    pub data_dir: String,
    pub space_count: u32,
    /// Wipe `data_dir` on startup instead of recovering from it.
    pub init: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            space_count: 1,
            init: false,
        }
    }
}

impl Config {
    /// Reads `--listen ADDR`, `--data-dir DIR`, `--spaces N` and `--init`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = || {
                iter.next()
                    .ok_or_else(|| anyhow!("missing value for {}", arg))
            };
            match arg.as_str() {
                "--listen" => config.listen_addr = value()?.clone(),
                "--data-dir" => config.data_dir = value()?.clone(),
                "--spaces" => {
                    config.space_count = value()?.parse()?;
                    if config.space_count == 0 {
                        return Err(anyhow!("at least one space is required"));
                    }
                }
                "--init" => config.init = true,
                _ => return Err(anyhow!("unknown argument: {}", arg)),
            }
        }
        Ok(config)
    }
}
