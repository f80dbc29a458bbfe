use std::path::Path;

use anyhow::{Context, bail};

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;
        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.clients.is_empty() {
            bail!("at least one client must be configured");
        }

        for (name, client) in &self.clients {
            if client.model.trim().is_empty() {
                bail!("client '{name}' has an empty model");
            }

            if client.provider.trim().is_empty() {
                bail!("client '{name}' has an empty provider");
            }

            if let Some(proxy) = client.proxy_url.as_deref().filter(|p| !p.is_empty()) {
                url::Url::parse(proxy).with_context(|| format!("client '{name}' has an invalid proxy_url"))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use crate::{Config, LogFormat};

    const SAMPLE: &str = r#"
[telemetry]
format = "json"
filter = "debug"

[clients.spark]
provider = "Xfyun"
model = "spark-4.0"
api_key = "app|secret|key"
base_url = "https://spark-api.xf-yun.com/v3.5"

[clients.deepseek]
provider = "DeepSeek"
model = "deepseek-chat"
supports_system_role = false
proxy_url = "http://127.0.0.1:7890"

[clients.deepseek.storage]
endpoint = "https://oss.example.com"
access_key = "ak"
secret_key = "sk"
bucket = "images"
"#;

    #[test]
    fn parses_clients_in_order() {
        let config = Config::from_toml(SAMPLE).unwrap();

        let names: Vec<_> = config.clients.keys().map(String::as_str).collect();
        assert_eq!(names, ["spark", "deepseek"]);

        let spark = &config.clients["spark"];
        assert_eq!(spark.provider, "Xfyun");
        assert_eq!(spark.api_key.as_ref().unwrap().expose_secret(), "app|secret|key");
        assert!(spark.system_role_supported());

        let deepseek = &config.clients["deepseek"];
        assert!(!deepseek.system_role_supported());
        assert_eq!(deepseek.storage.as_ref().unwrap().bucket, "images");

        let telemetry = config.telemetry.unwrap();
        assert_eq!(telemetry.format, LogFormat::Json);
        assert_eq!(telemetry.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = Config::from_toml("").unwrap_err();
        assert!(err.to_string().contains("at least one client"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = "[clients.a]\nprovider = \"OpenAI\"\nmodel = \"m\"\ntemperature = 1\n";
        assert!(Config::from_toml(raw).is_err());
    }

    #[test]
    fn malformed_proxy_is_rejected() {
        let raw = "[clients.a]\nprovider = \"OpenAI\"\nmodel = \"m\"\nproxy_url = \"::not a url\"\n";
        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("proxy_url"));
    }

    #[test]
    fn load_expands_environment() {
        temp_env::with_var("AXON_TEST_KEY", Some("sk-env"), || {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                "[clients.a]\nprovider = \"OpenAI\"\nmodel = \"gpt-4o\"\napi_key = \"{{{{ env.AXON_TEST_KEY }}}}\""
            )
            .unwrap();

            let config = Config::load(file.path()).unwrap();
            let key = config.clients["a"].api_key.as_ref().unwrap();
            assert_eq!(key.expose_secret(), "sk-env");
        });
    }
}
