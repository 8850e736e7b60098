use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use reqwest::Url;
use tracing_actix_web::TracingLogger;

use crate::configuration::{CampaignBlueprint, MailerSettings, Settings};
use crate::routes::{dispatch_campaign, health_check};
use crate::secrets::{AwsSecretStore, SecretStore};

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        Url::parse(&config.mailer.base_url).context("Invalid mailer api base url")?;
        let blueprint = config
            .campaign
            .blueprint()
            .context("Failed to read the campaign content file")?;

        let secret_store: Arc<dyn SecretStore> = Arc::new(AwsSecretStore::from_env().await);

        let address = format!("{}:{}", config.app.host, config.app.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();
        let server = run(listener, secret_store, config.mailer, blueprint)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    secret_store: Arc<dyn SecretStore>,
    mailer: MailerSettings,
    blueprint: CampaignBlueprint,
) -> Result<Server, std::io::Error> {
    let secret_store = web::Data::from(secret_store);
    let mailer = web::Data::new(mailer);
    let blueprint = web::Data::new(blueprint);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/campaigns", web::post().to(dispatch_campaign))
            .app_data(secret_store.clone())
            .app_data(mailer.clone())
            .app_data(blueprint.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
