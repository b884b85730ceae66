use anyhow::Context;
use bloghub::{Cli, Runner};
use bloghub_core::{telemetry, ClientSettings, SessionContext};
use clap::Parser;
use tokio::runtime::Runtime;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing(telemetry::env_filter_or("warn"))?;

    let cli = Cli::parse();
    let mut settings =
        ClientSettings::load().map_err(|err| anyhow::anyhow!(err.user_message()))?;
    if let Some(api_url) = cli.api_url.clone() {
        settings.api_url = api_url;
    }
    tracing::debug!(api_url = %settings.api_url, "resolved client settings");

    let runtime = Runtime::new()?;
    let (context, navigation) = SessionContext::open(&settings).with_context(|| {
        format!(
            "failed to open session storage at {}",
            settings.storage_path.display()
        )
    })?;
    let mut runner = Runner::new(context, navigation, cli.json);
    runtime.block_on(runner.run(cli.command))
}
