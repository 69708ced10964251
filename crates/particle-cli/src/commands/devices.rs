//! Devices command - list devices on the account

use anyhow::Result;
use particle_client::Client;

use crate::output::{DeviceRow, OutputContext};

/// List all devices claimed by the account
pub async fn devices(client: &Client, ctx: &OutputContext) -> Result<()> {
    let devices = client.list_devices().await?;

    let rows: Vec<DeviceRow> = devices
        .into_iter()
        .map(|d| DeviceRow {
            name: d.display_name().to_string(),
            connected: d.connected,
            last_heard: d.last_heard.unwrap_or_else(|| "-".to_string()),
            id: d.id,
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
