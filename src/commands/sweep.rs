use chrono::Utc;
use tracing::info;

use crate::controllers::paste;
use crate::App;

pub async fn run(app: App) -> anyhow::Result<()> {
    let count = paste::deactivate_expired(&app, Utc::now()).await?;
    if count == 0 {
        info!("no expired pastes");
    }
    Ok(())
}
