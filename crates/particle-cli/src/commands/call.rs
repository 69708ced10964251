//! Call command - invoke a cloud function

use anyhow::Result;
use particle_client::Client;

use crate::output::{FunctionRow, OutputContext};

/// Call a function exposed by a device
pub async fn call(
    client: &Client,
    device_id: &str,
    function: &str,
    arg: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!("Calling {} on {}...", function, device_id));

    let result = client
        .call_function(device_id, function, arg.unwrap_or(""))
        .await?;

    let row = FunctionRow {
        device: result.id,
        name: function.to_string(),
        return_value: result.return_value,
    };

    ctx.print_one(&row);
    Ok(())
}
