// src/models/server.rs
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// The two independent crawl pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Minecraft,
    Discord,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minecraft => "minecraft",
            Self::Discord => "discord",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog entry tracked by one pipeline.
///
/// Records are split into catalog-authoritative fields (identity, votes) and
/// probe-owned fields (liveness counters and `updated`). `absorb_probe` copies
/// only the latter, so a probe result never clobbers fresher catalog data.
pub trait ServerRecord: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: Kind;

    fn id(&self) -> u64;

    fn updated(&self) -> DateTime<Utc>;

    fn absorb_probe(&mut self, probed: &Self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinecraftServer {
    pub id: u64,
    pub ip: String,
    pub port: u16,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub online: bool,
    #[serde(default, deserialize_with = "lenient_count")]
    pub players: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub players_max: u64,
    #[serde(default)]
    pub votes: Value,
    #[serde(default)]
    pub votes_total: Value,
    #[serde(default, with = "iso8601")]
    pub updated: DateTime<Utc>,
}

impl ServerRecord for MinecraftServer {
    const KIND: Kind = Kind::Minecraft;

    fn id(&self) -> u64 {
        self.id
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    fn absorb_probe(&mut self, probed: &Self) {
        self.online = probed.online;
        self.players = probed.players;
        self.players_max = probed.players_max;
        self.updated = probed.updated;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordServer {
    pub id: u64,
    pub invite_code: String,
    // Snowflake; carried through untouched whatever JSON type the catalog uses.
    #[serde(default)]
    pub guild_id: Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub splash: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub members: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub members_total: u64,
    #[serde(default)]
    pub votes: Value,
    #[serde(default)]
    pub votes_total: Value,
    #[serde(default, with = "iso8601")]
    pub updated: DateTime<Utc>,
}

impl ServerRecord for DiscordServer {
    const KIND: Kind = Kind::Discord;

    fn id(&self) -> u64 {
        self.id
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    fn absorb_probe(&mut self, probed: &Self) {
        self.name = probed.name.clone();
        self.icon = probed.icon.clone();
        self.banner = probed.banner.clone();
        self.splash = probed.splash.clone();
        self.members = probed.members;
        self.members_total = probed.members_total;
        self.updated = probed.updated;
    }
}

// The catalog stores flags as 0/1 in some rows and as booleans in others.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// ISO-8601 timestamps in the `2024-05-01T12:00:00.000Z` shape the catalog emits.
///
/// Missing or unparseable values decode as the Unix epoch, which makes the
/// record the stalest one in its registry and therefore the next to be probed.
pub mod iso8601 {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse).unwrap_or_default())
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minecraft_record_from_catalog_row() {
        let server: MinecraftServer = serde_json::from_value(json!({
            "id": 42,
            "ip": "play.example.net",
            "port": 25565,
            "online": 1,
            "players": 12,
            "players_max": 100,
            "votes": 5,
            "votes_total": 500,
            "updated": "2024-05-01T12:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(server.id, 42);
        assert!(server.online);
        assert_eq!(server.players_max, 100);
        assert_eq!(server.votes, json!(5));
        assert_eq!(server.updated, iso8601::parse("2024-05-01T12:00:00Z").unwrap());
    }

    #[test]
    fn test_missing_timestamp_is_stalest() {
        let server: MinecraftServer = serde_json::from_value(json!({
            "id": 1,
            "ip": "127.0.0.1",
            "port": 25565,
            "players": null,
            "updated": null
        }))
        .unwrap();

        assert_eq!(server.updated, DateTime::<Utc>::default());
        assert_eq!(server.players, 0);
        assert!(!server.online);
    }

    #[test]
    fn test_sql_style_timestamp_is_accepted() {
        let parsed = iso8601::parse("2024-05-01 12:00:00").unwrap();
        assert_eq!(parsed, iso8601::parse("2024-05-01T12:00:00.000Z").unwrap());
    }

    #[test]
    fn test_timestamp_serializes_with_millis() {
        let server = fixtures::minecraft(1, 0);
        let value = serde_json::to_value(&server).unwrap();
        assert_eq!(value["updated"], json!("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn test_absorb_probe_keeps_catalog_fields() {
        let mut current = fixtures::discord(9, 0);
        current.votes = json!(99);

        let mut probed = fixtures::discord(9, 60);
        probed.name = Some("Renamed".to_string());
        probed.members_total = 151;
        probed.votes = json!(0);

        current.absorb_probe(&probed);
        assert_eq!(current.name.as_deref(), Some("Renamed"));
        assert_eq!(current.members_total, 151);
        assert_eq!(current.updated, fixtures::at(60));
        assert_eq!(current.votes, json!(99));
    }
}
