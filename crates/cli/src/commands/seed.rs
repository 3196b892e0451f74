//! `pbar seed` — Load events and milestones from a JSON fixture.

use std::path::Path;

use pbar_stores::Fixtures;

use super::context;

pub async fn run(config_path: &Path, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = context::load_config(config_path)?;
    let fixtures = Fixtures::load(file).await?;
    let stores = context::open_stores(&config).await?;

    if stores.backend == "memory" {
        println!("⚠️  store.backend is \"memory\"; seeded data disappears when this command exits");
    }

    let (events, milestones) = fixtures.apply(stores.seed.as_ref()).await?;
    println!(
        "✅ Seeded {events} event(s) and {milestones} milestone(s) into the {} store",
        stores.backend
    );

    Ok(())
}
