pub mod push;
pub mod server;

use clap::Parser;

pub use server::{AppState, router};

/// Service settings, read from flags or the environment (a `.env` file is
/// loaded first when present).
#[derive(Debug, Clone, Parser)]
#[command(name = "unitrack-web")]
#[command(about = "Streams unitrack reports over SSE and relays push notifications", long_about = None)]
pub struct WebConfig {
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1:5000")]
    pub bind_address: String,

    #[arg(long, env = "CLIENT_URL", help = "Origin allowed by CORS; any origin when unset")]
    pub client_url: Option<String>,

    #[arg(long, env = "VAPID_PUBLIC_KEY", default_value = "")]
    pub vapid_public_key: String,

    #[arg(
        long,
        env = "PUSH_AUTH",
        hide_env_values = true,
        help = "Shared secret required by /push"
    )]
    pub push_auth: String,

    #[arg(long, env = "PORTAL_URL", default_value = unitrack::BASE_URL)]
    pub portal_url: String,
}
