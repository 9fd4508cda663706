//! Instance configuration: a flat JSON shape on input, a nested JSON shape
//! once stored in a `CONF` chunk. See `to_stored`/`from_stored` for the
//! conversion and `from_input_json`/`to_input_json` for the caller-facing
//! codec.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chunks::svol::VolumeType;
use crate::error::{PayloadError, Result};

/// Per-instance-type metadata, tagged by `_type`. On the wire this struct's
/// own derive gives the flat input shape directly (`{"_type": "lxc",
/// "distro": "..."}`); [`InstanceMetadata::to_stored_value`] produces the
/// nested on-disk shape instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "snake_case")]
pub enum InstanceMetadata {
    Qemu { machine_type: String, cpu_cores: u32, memory_mib: u64 },
    Lxc { distro: String, release: String },
    DockerPodman { image: String },
}

impl InstanceMetadata {
    fn tag(&self) -> &'static str {
        match self {
            InstanceMetadata::Qemu { .. } => "qemu",
            InstanceMetadata::Lxc { .. } => "lxc",
            InstanceMetadata::DockerPodman { .. } => "docker_podman",
        }
    }

    /// The nested object key inside the stored shape. Distinct from `tag()`
    /// for `DockerPodman`, whose `_type` is `"docker_podman"` but whose
    /// nested key is `"docker"`.
    fn stored_key(&self) -> &'static str {
        match self {
            InstanceMetadata::DockerPodman { .. } => "docker",
            _ => self.tag(),
        }
    }

    /// Maps a `_type` value to its stored nested key, for the decode side
    /// where only the tag string (not a constructed variant) is in hand yet.
    fn stored_key_for_tag(tag: &str) -> &str {
        match tag {
            "docker_podman" => "docker",
            other => other,
        }
    }

    /// `{"_type": tag, stored_key: {fields...}}`, the shape stored inside `CONF`.
    pub fn to_stored_value(&self) -> Value {
        let flat = serde_json::to_value(self).expect("InstanceMetadata always serializes");
        let mut fields = match flat {
            Value::Object(map) => map,
            _ => unreachable!("InstanceMetadata serializes to an object"),
        };
        fields.remove("_type");
        let mut outer = Map::new();
        outer.insert("_type".to_string(), Value::String(self.tag().to_string()));
        outer.insert(self.stored_key().to_string(), Value::Object(fields));
        Value::Object(outer)
    }

    pub fn from_stored_value(value: Value) -> Result<Self> {
        let tag = value
            .get("_type")
            .and_then(Value::as_str)
            .ok_or_else(|| PayloadError::Malformed {
                chunk: "CONF",
                reason: "metadata missing _type".into(),
            })?
            .to_string();
        let stored_key = Self::stored_key_for_tag(&tag);
        let inner = value.get(stored_key).cloned().ok_or_else(|| PayloadError::Malformed {
            chunk: "CONF",
            reason: format!("metadata missing nested `{stored_key}` object"),
        })?;
        let mut fields = match inner {
            Value::Object(map) => map,
            _ => {
                return Err(PayloadError::Malformed {
                    chunk: "CONF",
                    reason: format!("metadata.{stored_key} is not an object"),
                }
                .into())
            }
        };
        fields.insert("_type".to_string(), Value::String(tag));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceVolume {
    pub id: String,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The caller-facing configuration: flat metadata, the shape accepted as
/// input and produced by [`InstanceConfig::to_input_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    pub metadata: InstanceMetadata,
    #[serde(default)]
    pub volumes: Vec<InstanceVolume>,
}

/// The on-disk shape of the `CONF` payload: identical except metadata is
/// nested under its own tag name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConfig {
    pub name: String,
    pub metadata: Value,
    #[serde(default)]
    pub volumes: Vec<InstanceVolume>,
}

impl InstanceConfig {
    pub fn to_stored(&self) -> StoredConfig {
        StoredConfig {
            name: self.name.clone(),
            metadata: self.metadata.to_stored_value(),
            volumes: self.volumes.clone(),
        }
    }

    pub fn from_stored(stored: StoredConfig) -> Result<Self> {
        Ok(InstanceConfig {
            name: stored.name,
            metadata: InstanceMetadata::from_stored_value(stored.metadata)?,
            volumes: stored.volumes,
        })
    }

    pub fn from_input_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_input_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InstanceConfig {
        InstanceConfig {
            name: "demo".into(),
            metadata: InstanceMetadata::Lxc { distro: "debian".into(), release: "bookworm".into() },
            volumes: vec![InstanceVolume {
                id: "rootfs".into(),
                volume_type: VolumeType::LxcRootfs,
                path: "/var/lib/lxc/demo/rootfs".into(),
                size: None,
            }],
        }
    }

    #[test]
    fn input_schema_is_flat() {
        let config = sample();
        let bytes = config.to_input_json().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["metadata"]["_type"], "lxc");
        assert_eq!(value["metadata"]["distro"], "debian");
        assert!(value["metadata"].get("lxc").is_none());
    }

    #[test]
    fn stored_schema_is_nested() {
        let config = sample();
        let stored = config.to_stored();
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["metadata"]["_type"], "lxc");
        assert_eq!(value["metadata"]["lxc"]["distro"], "debian");
        assert!(value["metadata"].get("distro").is_none());
    }

    #[test]
    fn stored_round_trips_back_to_input_shape() {
        let config = sample();
        let stored = config.to_stored();
        let recovered = InstanceConfig::from_stored(stored).unwrap();
        assert_eq!(recovered, config);
    }

    #[test]
    fn docker_podman_stored_key_differs_from_type_tag() {
        let config = InstanceConfig {
            name: "demo".into(),
            metadata: InstanceMetadata::DockerPodman { image: "nginx:latest".into() },
            volumes: vec![],
        };
        let stored = config.to_stored();
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["metadata"]["_type"], "docker_podman");
        assert_eq!(value["metadata"]["docker"]["image"], "nginx:latest");
        assert!(value["metadata"].get("docker_podman").is_none());

        let recovered = InstanceConfig::from_stored(stored).unwrap();
        assert_eq!(recovered, config);
    }

    #[test]
    fn from_input_json_parses_flat_shape() {
        let config = sample();
        let bytes = config.to_input_json().unwrap();
        let parsed = InstanceConfig::from_input_json(&bytes).unwrap();
        assert_eq!(parsed, config);
    }
}
