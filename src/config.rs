use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub oauth: OAuthConfig,
    pub openai: OpenAiConfig,
    pub frontend: FrontendConfig,
    pub upload: UploadConfig,
    pub pdf: PdfConfig,
    pub cron: CronConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub duration_hours: i64,
    pub state_ttl_seconds: i64,
    pub secure_cookies: bool,
    /// Interval of the in-process expired-session sweep; 0 disables it.
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct OAuthConfig {
    pub google: GoogleOAuthConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub transcription_model: String,
    pub summary_model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FrontendConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub max_body_size: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct PdfConfig {
    /// TrueType font used for the notes; builtin Helvetica when unset or missing.
    pub font_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct CronConfig {
    pub auth_token: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub enable_swagger: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/conspect".to_string(),
            max_connections: 25,
            min_connections: 5,
            acquire_timeout: 5,
            idle_timeout: 30,
            max_lifetime: 300,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            window_seconds: 60,
            cleanup_interval_seconds: 300,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_hours: 24,
            state_ttl_seconds: 300,
            secure_cookies: false,
            cleanup_interval_seconds: 3600,
        }
    }
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://localhost:8080/auth/google/callback".to_string(),
            scopes: vec!["profile".to_string(), "email".to_string()],
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            timeout_seconds: 600,
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
            max_body_size: 110 * 1024 * 1024,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enable_swagger: true }
    }
}

/// Environment names used by earlier deployments, mapped onto config keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("GOOGLE_CLIENT_ID", "oauth.google.client_id"),
    ("GOOGLE_CLIENT_SECRET", "oauth.google.client_secret"),
    ("GOOGLE_REDIRECT_URL", "oauth.google.redirect_url"),
    ("OPENAI_API_KEY", "openai.api_key"),
    ("FRONTEND_URL", "frontend.url"),
];

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Built-in defaults
    /// 2. Conspect.toml (base configuration file)
    /// 3. Environment variables prefixed with CONSPECT_, nested with `__`
    ///    (e.g. CONSPECT_OAUTH__GOOGLE__CLIENT_ID)
    /// 4. Legacy unprefixed variables such as DATABASE_URL and OPENAI_API_KEY
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        let legacy_names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(name, _)| *name).collect();

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("Conspect.toml"))
            .merge(Env::prefixed("CONSPECT_").split("__"))
            .merge(Env::raw().only(&legacy_names).map(|name| {
                LEGACY_ENV_KEYS
                    .iter()
                    .find(|(legacy, _)| name.as_str().eq_ignore_ascii_case(legacy))
                    .map(|(_, key)| (*key).into())
                    .unwrap_or_else(|| name.as_str().to_string().into())
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.session.duration_hours, 24);
        assert_eq!(config.session.state_ttl_seconds, 300);
        assert_eq!(config.rate_limit.requests, 10);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.upload.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.oauth.google.scopes, vec!["profile", "email"]);
        assert_eq!(config.openai.transcription_model, "whisper-1");
        assert_eq!(config.openai.summary_model, "gpt-4o-mini");
    }

    #[test]
    fn file_and_env_layers_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Conspect.toml",
                r#"
                [session]
                duration_hours = 12

                [frontend]
                url = "https://notes.example.com"
                "#,
            )?;
            jail.set_env("CONSPECT_RATE_LIMIT__REQUESTS", "3");
            jail.set_env("CONSPECT_OAUTH__GOOGLE__CLIENT_ID", "from-prefixed");

            let config = Config::load()?;
            assert_eq!(config.session.duration_hours, 12);
            assert_eq!(config.frontend.url, "https://notes.example.com");
            assert_eq!(config.rate_limit.requests, 3);
            assert_eq!(config.oauth.google.client_id, "from-prefixed");
            assert_eq!(config.database.max_connections, 25);
            Ok(())
        });
    }

    #[test]
    fn toml_sections_are_read_as_config_keys() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Conspect.toml",
                r#"
                [upload]
                max_file_size = 1048576

                [oauth.google]
                client_id = "from-file"
                "#,
            )?;

            let config = Config::load()?;
            assert_eq!(config.upload.max_file_size, 1_048_576);
            assert_eq!(config.oauth.google.client_id, "from-file");
            assert_eq!(config.session.duration_hours, Config::default().session.duration_hours);
            Ok(())
        });
    }

    #[test]
    fn legacy_env_names_are_honored() {
        Jail::expect_with(|jail| {
            jail.set_env("DATABASE_URL", "postgres://db/legacy");
            jail.set_env("GOOGLE_CLIENT_SECRET", "shh");
            jail.set_env("OPENAI_API_KEY", "sk-test");
            jail.set_env("FRONTEND_URL", "https://front.example.com");

            let config = Config::load()?;
            assert_eq!(config.database.url, "postgres://db/legacy");
            assert_eq!(config.oauth.google.client_secret, "shh");
            assert_eq!(config.openai.api_key, "sk-test");
            assert_eq!(config.frontend.url, "https://front.example.com");
            Ok(())
        });
    }
}
