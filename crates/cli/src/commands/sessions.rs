//! `pbar sessions` — List sessions recorded for a milestone.

use std::path::Path;

use pbar_core::store::SessionStore;

use super::context;

pub async fn run(config_path: &Path, milestone_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = context::load_config(config_path)?;
    let stores = context::open_stores(&config).await?;
    let sessions = stores.sessions.sessions_for_milestone(milestone_id).await?;

    if sessions.is_empty() {
        println!("No sessions recorded for milestone {milestone_id}");
        return Ok(());
    }

    println!("{} — {} session(s)", sessions[0].title, sessions.len());
    for session in &sessions {
        println!(
            "  {:<24} {:>5} min  {}",
            session.start_date, session.duration_minutes, session.event_name
        );
    }

    let total: i64 = sessions.iter().map(|s| s.duration_minutes).sum();
    println!("  total: {total} min");

    Ok(())
}
