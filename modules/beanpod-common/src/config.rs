use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Document store (bolt protocol via neo4rs driver)
    pub db_connection_string: String,
    pub db_user: String,
    pub db_password: String,

    // Inference services
    pub parrotbox_url: String,
    pub llmservice_api_key: String,
    /// Optional override of the compiled-in embeddings service url.
    pub embeddings_url: Option<String>,

    // HTTP surface
    pub internal_auth_token: String,
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            db_connection_string: required_env("DB_CONNECTION_STRING"),
            db_user: env::var("DB_USER").unwrap_or_else(|_| "neo4j".to_string()),
            db_password: env::var("DB_PASSWORD").unwrap_or_default(),
            parrotbox_url: required_env("PARROTBOX_URL"),
            llmservice_api_key: required_env("LLMSERVICE_API_KEY"),
            embeddings_url: env::var("EMBEDDINGS_SERVICE_URL").ok(),
            internal_auth_token: required_env("INTERNAL_AUTH_TOKEN"),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }

    /// Log the presence of each sensitive env var without leaking values.
    pub fn log_redacted(&self) {
        let vars = [
            ("DB_CONNECTION_STRING", &self.db_connection_string),
            ("PARROTBOX_URL", &self.parrotbox_url),
            ("LLMSERVICE_API_KEY", &self.llmservice_api_key),
            ("INTERNAL_AUTH_TOKEN", &self.internal_auth_token),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
