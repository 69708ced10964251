//! Device command - show device details

use anyhow::Result;
use particle_client::Client;

use crate::output::OutputContext;

/// Show detailed information about one device
pub async fn device(client: &Client, device_id: &str, ctx: &OutputContext) -> Result<()> {
    let device = client.get_device(device_id).await?;

    let variables = device
        .variables
        .as_ref()
        .map(|vars| {
            let mut names: Vec<String> = vars
                .iter()
                .map(|(name, kind)| format!("{} ({})", name, kind))
                .collect();
            names.sort();
            names.join(", ")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string());

    let functions = device
        .functions
        .as_ref()
        .map(|f| f.join(", "))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string());

    let pairs = vec![
        ("ID", device.id.clone()),
        ("Name", device.display_name().to_string()),
        ("Online", device.connected.to_string()),
        (
            "Last Heard",
            device.last_heard.unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Last IP",
            device.last_ip_address.unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Firmware",
            device
                .current_build_target
                .unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Status",
            device.status.unwrap_or_else(|| "-".to_string()),
        ),
        ("Variables", variables),
        ("Functions", functions),
    ];

    ctx.print_kv(&pairs);
    Ok(())
}
