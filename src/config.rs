use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "snippetbox", version, about = "Share and view short text snippets")]
pub struct Config {
    /// HTTP host address
    #[arg(long, env = "SNIPPETBOX_HOST", default_value = "localhost")]
    pub host: String,

    /// HTTP port number
    #[arg(long, env = "SNIPPETBOX_PORT", default_value_t = 4000)]
    pub port: u16,

    /// PostgreSQL data source name
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub dsn: String,

    /// Directory holding the `html/` templates and `static/` assets
    #[arg(long, env = "SNIPPETBOX_UI_DIR", default_value = "./ui")]
    pub ui_dir: PathBuf,

    /// Mark the session cookie `Secure` (TLS terminated upstream)
    #[arg(long, env = "SNIPPETBOX_SECURE_COOKIES")]
    pub secure_cookies: bool,
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn html_dir(&self) -> PathBuf {
        self.ui_dir.join("html")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.ui_dir.join("static")
    }

    pub fn addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}
