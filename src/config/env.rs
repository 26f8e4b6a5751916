use super::ArenaConfig;

/// Path of the TOML file, overridable with `ARENA_CONFIG`.
pub fn config_path() -> String {
    std::env::var("ARENA_CONFIG").unwrap_or_else(|_| "arena.toml".to_string())
}

impl ArenaConfig {
    /// Apply environment overrides on top of file settings.
    ///
    /// Unparseable values are ignored and the file value stays.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ARENA_BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("ARENA_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = lookup("ARENA_BATTLE_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.battle.interval_seconds = n;
            }
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.narrator.api_key = v;
        }
        if let Some(v) = lookup("OPENAI_COMPLETIONS_ENDPOINT") {
            self.narrator.endpoint = v;
        }
        if let Some(v) = lookup("JUPITER_PRICE_URL") {
            self.price.base_url = v;
        }
    }
}
