//! Runtime settings, read from `Config.toml`.
//!
//! Only non-secret knobs live in the file; the upstream credential is
//! named here but read from the environment at request time.

use anyhow::{bail, Result};

use crate::proxy::UpstreamConfig;
use crate::render::RenderConfig;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub assets_dir: String,
    /// Optional on-disk override for the embedded intent catalog.
    pub intents_file: Option<String>,
    pub remote_enabled: bool,
    pub proxy_url: String,
    pub upstream: UpstreamConfig,
    pub render: RenderConfig,
    pub max_history_turns: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("Config"))
            .build()?;
        Self::from_config(&settings)
    }

    pub fn from_config(settings: &config::Config) -> Result<Self> {
        let server_conf = settings.get_table("server")?;
        let host = server_conf["host"].clone().into_string()?;
        let port = server_conf["port"].clone().into_int()? as u16;

        let data_conf = settings.get_table("data")?;
        let assets_dir = data_conf["assets_dir"].clone().into_string()?;
        let intents_file = data_conf
            .get("intents_file")
            .cloned()
            .map(|v| v.into_string())
            .transpose()?;

        let remote_conf = settings.get_table("remote")?;
        let remote_enabled = remote_conf["enabled"].clone().into_bool()?;
        let proxy_url = remote_conf["proxy_url"].clone().into_string()?;

        let upstream_conf = settings.get_table("upstream")?;
        let upstream = UpstreamConfig {
            endpoint: upstream_conf["endpoint"].clone().into_string()?,
            api_key_env: upstream_conf["api_key_env"].clone().into_string()?,
        };

        let render_conf = settings.get_table("render")?;
        let render = RenderConfig {
            min_delay_ms: render_conf["min_delay_ms"].clone().into_int()? as u64,
            max_delay_ms: render_conf["max_delay_ms"].clone().into_int()? as u64,
            think_min_ms: render_conf["think_min_ms"].clone().into_int()? as u64,
            think_max_ms: render_conf["think_max_ms"].clone().into_int()? as u64,
        };
        if render.max_delay_ms < render.min_delay_ms {
            bail!("render.max_delay_ms must be >= render.min_delay_ms");
        }
        if render.think_max_ms < render.think_min_ms {
            bail!("render.think_max_ms must be >= render.think_min_ms");
        }

        let history_conf = settings.get_table("history")?;
        let max_history_turns = history_conf["max_turns"].clone().into_int()? as usize;
        if max_history_turns < 2 {
            bail!("history.max_turns must be at least 2");
        }

        Ok(Self {
            host,
            port,
            assets_dir,
            intents_file,
            remote_enabled,
            proxy_url,
            upstream,
            render,
            max_history_turns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    const SAMPLE: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8080

        [data]
        assets_dir = "assets"

        [remote]
        enabled = true
        proxy_url = "http://127.0.0.1:8080/api/model"

        [upstream]
        endpoint = "https://example.invalid/v1beta/models/test:generateContent"
        api_key_env = "GEMINI_API_KEY"

        [render]
        min_delay_ms = 15
        max_delay_ms = 40
        think_min_ms = 500
        think_max_ms = 1500

        [history]
        max_turns = 64
    "#;

    fn parse(toml: &str) -> Result<Settings> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Settings::from_config(&settings)
    }

    #[test]
    fn sample_settings_parse() {
        let settings = parse(SAMPLE).unwrap();
        assert_eq!(settings.port, 8080);
        assert!(settings.remote_enabled);
        assert!(settings.intents_file.is_none());
        assert_eq!(settings.upstream.api_key_env, "GEMINI_API_KEY");
        assert_eq!(settings.render.min_delay_ms, 15);
        assert_eq!(settings.max_history_turns, 64);
    }

    #[test]
    fn inverted_delay_bounds_are_rejected() {
        let toml = SAMPLE.replace("max_delay_ms = 40", "max_delay_ms = 5");
        assert!(parse(&toml).is_err());
    }

    #[test]
    fn tiny_history_cap_is_rejected() {
        let toml = SAMPLE.replace("max_turns = 64", "max_turns = 1");
        assert!(parse(&toml).is_err());
    }
}
