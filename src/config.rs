use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub public_url: String,

    // Upstream playlist
    pub m3u_url: String,
    pub fetch_timeout_ms: u64,
    pub max_attempts: u32,
    pub cache_ttl_secs: u64,
    pub user_agent: String,

    // Persistence
    pub data_dir: String,

    // Bootstrap admin account
    pub admin_user: String,
    pub admin_password: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),

            // Upstream playlist
            m3u_url: env::var("M3U_URL").unwrap_or_default(),
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000), // 30 seconds
            max_attempts: env::var("MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            cache_ttl_secs: env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600), // 1 hour

            // Browser user agent, some upstream panels refuse unknown clients
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
            }),

            // Persistence
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),

            // Bootstrap admin account
            admin_user: env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string()),
            admin_password: env::var("ADMIN_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
