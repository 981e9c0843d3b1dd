use crate::config::FieldConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_FRAMES: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    data: Option<PathBuf>,
    frames: Option<u64>,
    grace_ms: Option<u64>,
    max_depth: Option<u32>,
    debug: Option<bool>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "data" => overrides.data = Some(PathBuf::from(value)),
                "frames" => {
                    overrides.frames =
                        Some(value.parse::<u64>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "grace-ms" => {
                    overrides.grace_ms =
                        Some(value.parse::<u64>().with_context(|| format!("Invalid grace delay '{value}'"))?);
                }
                "max-depth" => {
                    overrides.max_depth =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid max depth '{value}'"))?);
                }
                "debug" => overrides.debug = Some(parse_bool_flag("debug", &value)?),
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --data, --frames, --grace-ms, --max-depth, --debug."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames.unwrap_or(DEFAULT_FRAMES)
    }

    pub fn config_overrides(&self) -> FieldConfigOverrides {
        FieldConfigOverrides {
            data_root: self.data.clone(),
            grace_ms: self.grace_ms,
            max_depth: self.max_depth,
            debug: self.debug,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}
