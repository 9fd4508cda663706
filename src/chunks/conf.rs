//! `CONF`: UTF-8 JSON serialization of the instance configuration, in its
//! on-disk ("stored") schema. See [`crate::config`] for the schema split.

use crate::config::InstanceConfig;
use crate::error::Result;

pub fn build(config: &InstanceConfig) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&config.to_stored())?)
}

pub fn parse(payload: &[u8]) -> Result<InstanceConfig> {
    let stored = serde_json::from_slice(payload)?;
    InstanceConfig::from_stored(stored)
}
