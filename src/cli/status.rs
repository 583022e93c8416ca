//! Service status reporting.

use crate::supervisor::Supervisor;

/// Print the freshly probed service status.
pub async fn run_status_command(supervisor: &Supervisor, json: bool) -> anyhow::Result<()> {
    let status = supervisor.status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.running {
        println!("service:  running");
        println!("url:      {}", status.base_url);
        println!("port:     {}", status.port);
        println!("uptime:   {}s", status.uptime_seconds);
        if let Some(health) = &status.health {
            println!("health:   {health}");
        }
    } else {
        println!("service:  not running");
        println!("url:      {}", status.base_url);
        if let Some(error) = &status.error {
            println!("reason:   {error}");
        }
    }

    Ok(())
}
