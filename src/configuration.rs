use std::time::Duration;

use secrecy::SecretString;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::SenderEmail;
use crate::mailer_client::MailerClient;

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Settings {
    pub app: ApplicationSettings,
    pub mailer: MailerSettings,
    pub campaign: CampaignSettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct MailerSettings {
    pub base_url: String,
    pub secret_name: String,
    pub secret_key: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
}

impl MailerSettings {
    /// The api key lives in the secret store, not in configuration, so the
    /// client is assembled once the key has been resolved.
    pub fn client(&self, api_key: SecretString) -> MailerClient {
        MailerClient::new(self.base_url.clone(), api_key, self.timeout())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct CampaignSettings {
    pub name: String,
    pub subject: String,
    pub from_email: String,
    pub from_name: String,
    pub content_file: String,
}

impl CampaignSettings {
    pub fn sender(&self) -> Result<SenderEmail, String> {
        SenderEmail::parse(self.from_email.clone())
    }

    pub fn blueprint(&self) -> Result<CampaignBlueprint, std::io::Error> {
        let from_email = self.sender().expect("Invalid sender email address.");
        let content = std::fs::read_to_string(&self.content_file)?;

        Ok(CampaignBlueprint {
            name: self.name.clone(),
            subject: self.subject.clone(),
            from_email,
            from_name: self.from_name.clone(),
            content,
        })
    }
}

/// Campaign identity resolved at startup: sender address validated, content
/// read from disk. Every field stays independently overridable through the
/// configuration layers.
#[derive(Debug, Clone)]
pub struct CampaignBlueprint {
    pub name: String,
    pub subject: String,
    pub from_email: SenderEmail,
    pub from_name: String,
    pub content: String,
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "{other} is not supported environment. Try to use `local` or `production`",
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine current directory");
    let conf_dir = base_path.join("configuration");
    let env: Environment = std::env::var("APP_ENV")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENV");

    let settings = config::Config::builder()
        .add_source(
            config::File::with_name(
                conf_dir
                    .join("base")
                    .to_str()
                    .expect("Failed to read base configuration"),
            )
            .required(true),
        )
        .add_source(
            config::File::with_name(
                conf_dir
                    .join(env.as_str())
                    .to_str()
                    .expect("Failed to read environment configuration"),
            )
            .required(true),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .prefix_separator("_"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
