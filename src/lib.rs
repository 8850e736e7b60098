pub mod configuration;
pub mod domain;
pub mod mailer_client;
pub mod routes;
pub mod secrets;
pub mod startup;
pub mod telemetry;
