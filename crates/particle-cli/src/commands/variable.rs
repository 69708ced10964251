//! Get command - read a cloud variable

use anyhow::Result;
use particle_client::Client;

use crate::output::{format_json_value, OutputContext, VariableRow};

/// Read a variable exposed by a device
pub async fn get(client: &Client, device_id: &str, name: &str, ctx: &OutputContext) -> Result<()> {
    let value = client.get_variable(device_id, name).await?;

    let row = VariableRow {
        device: device_id.to_string(),
        name: value.name,
        value: format_json_value(&value.result),
    };

    ctx.print_one(&row);
    Ok(())
}
