use anyhow::Context;
use shelf_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load shelf settings")?;
    shelf_telemetry::init(&settings.telemetry);

    tracing::info!(
        env = ?settings.environment,
        port = settings.server.port,
        data_file = ?settings.catalog.data_file,
        "shelf-app starting"
    );

    shelf_app::run(settings, shelf_app::shutdown_signal()).await
}
