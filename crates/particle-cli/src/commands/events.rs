//! Events command - follow an event stream in real time

use anyhow::{Context, Result};
use particle_client::{Client, Event, EventScope, StreamError};

use crate::output::{escape_csv, OutputContext, OutputFormat};

/// Stream events until the feed closes or Ctrl+C is pressed
pub async fn events(
    client: &Client,
    scope: EventScope,
    name: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let session = client.open_events(scope, name).await?;
    ctx.info(&format!("Listening on {}", session.endpoint()));
    ctx.info("Press Ctrl+C to stop");

    let mut events = session
        .take_events()
        .context("Event receiver already taken")?;
    let mut errors = session
        .take_errors()
        .context("Error receiver already taken")?;

    // Set up Ctrl+C handler
    let stopper = session.clone();
    ctrlc::set_handler(move || stopper.stop())?;

    let listener = session.clone();
    let handle = tokio::spawn(async move { listener.listen().await });

    if ctx.format == OutputFormat::Csv {
        println!("published_at,device_id,name,ttl,data");
    }

    let mut count = 0usize;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        print_event(&event, ctx);
                        count += 1;
                    }
                    None => break,
                }
            }
            Some(err) = errors.recv() => {
                ctx.warn(&format!("Skipping event: {}", err));
            }
        }
    }

    // Drain decode errors reported just before the stream ended
    while let Ok(err) = errors.try_recv() {
        ctx.warn(&format!("Skipping event: {}", err));
    }

    match handle.await.context("Event listener panicked")? {
        Ok(()) => {
            ctx.success(&format!("Stopped after {} event(s)", count));
            Ok(())
        }
        Err(e @ StreamError::Closed) => {
            Err(anyhow::Error::new(e).context(format!("Stream ended after {} event(s)", count)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Print a stream event in the appropriate format
fn print_event(event: &Event, ctx: &OutputContext) {
    match ctx.format {
        OutputFormat::Table => {
            println!(
                "[{}] {} {} = {}",
                event.published_at.to_rfc3339(),
                event.device_id.as_deref().unwrap_or("-"),
                event.name,
                event.data
            );
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}", json);
            }
        }
        OutputFormat::Csv => {
            let values = [
                event.published_at.to_rfc3339(),
                event.device_id.clone().unwrap_or_default(),
                event.name.clone(),
                event.ttl.to_string(),
                event.data.clone(),
            ];
            let escaped: Vec<String> = values.iter().map(|v| escape_csv(v)).collect();
            println!("{}", escaped.join(","));
        }
    }
}
