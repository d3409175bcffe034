//! JSON bodies of the HTTP protocol. Binary payloads travel as base64 strings.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use spice_core::RunnerStats;
use spice_model::RunNumber;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesRequest {
    #[serde(serialize_with = "serialize_base64", deserialize_with = "deserialize_base64")]
    pub archive: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Name of the circuit file inside the archive.
    pub circuit: String,
    #[serde(serialize_with = "serialize_base64", deserialize_with = "deserialize_base64")]
    pub archive: Vec<u8>,
}

/// `run` is `-1` when the session is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub runs: Vec<RunNumber>,
}

/// Empty `name` and `archive` mean there was nothing to fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesResponse {
    pub name: String,
    #[serde(serialize_with = "serialize_base64", deserialize_with = "deserialize_base64")]
    pub archive: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub methods: Vec<String>,
    pub running: bool,
    pub hostname: String,
    pub simulator: String,
    pub sessions: usize,
    pub stats: RunnerStats,
}

fn serialize_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::Engine;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    use base64::Engine;
    let s = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(&s)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archives_are_base64() {
        let req = RunRequest {
            circuit: "rc.net".into(),
            archive: b"PK\x03\x04".to_vec(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["archive"], "UEsDBA==");

        let back: RunRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.archive, req.archive);

        let bad = serde_json::json!({ "circuit": "x", "archive": "not base64!" });
        assert!(serde_json::from_value::<RunRequest>(bad).is_err());
    }
}
