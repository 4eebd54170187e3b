mod content;
mod gateway;
mod http_client;
mod service_provider;
mod telemetry;

#[rustfmt::skip]
pub use {
    content::LocalFileContent,
    gateway::InvenioBackendGateway,
    http_client::build_http_client,
    service_provider::ServiceProvider,
    telemetry::*,
};
