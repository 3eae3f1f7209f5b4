use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use backend_client::{AdminClient, CleanupConfirmation, HttpBackend};
use dashboard_core::{AnalysisCoordinator, LogEvent, LogId, StatsAggregator};

use crate::config::Config;
use crate::render;

/// Headline cards, severity distribution and the backend's daily series.
pub async fn stats(backend: &HttpBackend, window: usize) -> Result<()> {
    let (logs, daily, systems) = tokio::try_join!(backend.logs(window, None), backend.daily_stats(), backend.systems())?;
    let events: Vec<LogEvent> = logs.into_iter().map(LogEvent::from).collect();
    let snapshot = StatsAggregator::compute(&events);

    println!("Last {} logs", events.len());
    for card in render::headline_cards(&snapshot, systems.len()) {
        println!("  {card}");
    }
    println!("\nDistribution");
    for (severity, line) in render::distribution_lines(&snapshot) {
        println!("  {}", render::paint(&line, render::severity_color(severity)));
    }
    println!("\nDaily logs per system (last {} logs)", events.len());
    for line in render::window_daily_table(&snapshot) {
        println!("  {line}");
    }
    println!("\nDaily logs per system (all time)");
    for line in render::daily_table(&daily) {
        println!("  {line}");
    }
    Ok(())
}

pub async fn analyze(backend: Arc<HttpBackend>, log_id: LogId) -> Result<()> {
    let coordinator = AnalysisCoordinator::from_arc(backend);
    let outcome = coordinator.request_analysis(log_id).outcome().await;
    let (color, lines) = render::analysis_lines(log_id, &outcome);
    if let Err(err) = outcome {
        return Err(err).with_context(|| format!("analysis of log #{log_id} failed"));
    }
    for line in lines {
        println!("{}", render::paint(&line, color));
    }
    Ok(())
}

pub async fn systems(backend: &HttpBackend) -> Result<()> {
    let systems = backend.systems().await?;
    if systems.is_empty() {
        println!("No systems registered");
    }
    for system in &systems {
        println!("{}", render::system_line(system));
    }
    Ok(())
}

pub async fn reports(backend: &HttpBackend, limit: usize) -> Result<()> {
    let reports = backend.reports(limit).await?;
    if reports.is_empty() {
        println!("No reports yet");
    }
    for report in &reports {
        println!("{}", render::report_line(report));
    }
    Ok(())
}

pub fn admin_client(config: &Config) -> Result<AdminClient> {
    AdminClient::with_timeout(&config.api_url, config.require_master_key()?, config.http_timeout)
}

pub async fn list_filters(admin: &AdminClient, system_id: &str) -> Result<()> {
    let filters = admin.filters(system_id).await?;
    if filters.is_empty() {
        println!("No filters for {system_id}");
    }
    for filter in &filters {
        println!("{:>5}  {}  {}", filter.id, render::format_timestamp(&filter.created_at), filter.pattern);
    }
    Ok(())
}

pub async fn add_filter(admin: &AdminClient, system_id: &str, pattern: &str) -> Result<()> {
    let filter = admin.add_filter(system_id, pattern).await?;
    println!("Added filter #{} for {}: {}", filter.id, filter.system_id, filter.pattern);
    Ok(())
}

pub async fn remove_filter(admin: &AdminClient, system_id: &str, filter_id: i64) -> Result<()> {
    admin.remove_filter(system_id, filter_id).await?;
    println!("Removed filter #{filter_id} from {system_id}");
    Ok(())
}

pub async fn notes(admin: &AdminClient, system_id: &str, text: &str) -> Result<()> {
    let system = admin.update_notes(system_id, text).await?;
    println!("Updated technical notes for {} ({})", system.name, system.id);
    Ok(())
}

pub async fn cleanup(admin: &AdminClient, system_id: &str, pattern: &str, confirmed: bool) -> Result<()> {
    if !confirmed {
        return Err(anyhow!(
            "cleanup permanently deletes every log of {system_id} matching {pattern:?}; rerun with --yes to confirm"
        ));
    }
    info!(system_id, pattern, "running retroactive cleanup");
    let reply = admin.cleanup(system_id, pattern, CleanupConfirmation::for_pattern(pattern)).await?;
    println!("{}: {} logs removed", reply.status, reply.cleaned_count);
    Ok(())
}
