use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Configuration for the bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Pause between video dispatches during delivery, in seconds.
    pub video_pause_secs: u64,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("video_pause_secs", &self.video_pause_secs)
            .finish()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            video_pause_secs: 3,
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.video_pause_secs, 3);
        assert!(cfg.token.expose_secret().is_empty());
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{ "token": "123:ABC", "video_pause_secs": 0 }"#;
        let cfg: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.video_pause_secs, 0);
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = BotConfig {
            token: Secret::new("123:ABC".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("123:ABC"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn serialize_roundtrip() {
        let cfg = BotConfig {
            token: Secret::new("tok".into()),
            video_pause_secs: 5,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: BotConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg2.token.expose_secret(), "tok");
        assert_eq!(cfg2.video_pause_secs, 5);
    }
}
