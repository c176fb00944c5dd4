use clap::Parser;
use std::time::Duration;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "podcast-proxy")]
#[command(about = "Rate-limited proxy for podcast script and TTS generation")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    // Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    // Allowed CORS origins (comma-separated, "*" allows any)
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,

    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    // Model used to write scripts
    #[arg(long, env = "SCRIPT_MODEL", default_value = "gemini-2.5-flash")]
    pub script_model: String,

    // Model used for speech synthesis
    #[arg(long, env = "TTS_MODEL", default_value = "gemini-2.5-flash-preview-tts")]
    pub tts_model: String,

    // Upstream request timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 120)]
    pub upstream_timeout: u64,

    // Global rate limit: max requests per window
    #[arg(long, default_value_t = 100)]
    pub global_rate_limit: u32,

    // Global rate limit window in seconds
    #[arg(long, default_value_t = 15 * 60)]
    pub global_rate_window: u64,

    // Script generation rate limit: max requests per window
    #[arg(long, default_value_t = 10)]
    pub generate_rate_limit: u32,

    // Script generation window in seconds
    #[arg(long, default_value_t = 60 * 60)]
    pub generate_rate_window: u64,

    // Key clients by the first X-Forwarded-For hop (only behind a trusted proxy)
    #[arg(long, env = "TRUST_PROXY", default_value_t = false)]
    pub trust_proxy: bool,
}

impl Args {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn global_window(&self) -> Duration {
        Duration::from_secs(self.global_rate_window)
    }

    pub fn generate_window(&self) -> Duration {
        Duration::from_secs(self.generate_rate_window)
    }

    /// Origins with surrounding whitespace and empty entries removed.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|s| s.trim()) // remove spaces
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_policies() {
        let args = Args::try_parse_from(["podcast-proxy", "--api-key", "k"]).unwrap();

        assert_eq!(args.global_rate_limit, 100);
        assert_eq!(args.global_window(), Duration::from_secs(900));
        assert_eq!(args.generate_rate_limit, 10);
        assert_eq!(args.generate_window(), Duration::from_secs(3600));
        assert!(!args.trust_proxy);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let args = Args::try_parse_from([
            "podcast-proxy",
            "--api-key",
            "k",
            "--allowed-origins",
            "https://a.example, https://b.example,,",
        ])
        .unwrap();

        assert_eq!(args.origins(), vec!["https://a.example", "https://b.example"]);
    }
}
