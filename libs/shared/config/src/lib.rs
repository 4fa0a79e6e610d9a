use std::env;
use std::str::FromStr;
use tracing::warn;

/// What the booking flow does with a slot freed by a cancellation or decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreedSlotPolicy {
    /// Promote the oldest matching waitlist entry into an appointment.
    AutoBook,
    /// Tell every matching waitlist entry the slot opened; book nothing.
    Broadcast,
}

impl FromStr for FreedSlotPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto_book" | "auto-book" | "autobook" => Ok(Self::AutoBook),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(format!("unknown freed-slot policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout_secs: u64,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub freed_slot_policy: FreedSlotPolicy,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, using empty value");
                    String::new()
                }),
            database_max_connections: parse_or_default("DATABASE_MAX_CONNECTIONS", 10),
            database_acquire_timeout_secs: parse_or_default("DATABASE_ACQUIRE_TIMEOUT_SECS", 5),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            freed_slot_policy: parse_or_default("WAITLIST_ON_FREED_SLOT", FreedSlotPolicy::AutoBook),
            server_port: parse_or_default("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if !config.is_notifier_configured() {
            warn!("Supabase messaging not configured - notifications will only be logged");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.database_url.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_notifier_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
