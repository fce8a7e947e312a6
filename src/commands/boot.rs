//! Run the start pass for a runlevel

use rlinit::{Outcome, Settings};

use super::load_manager;

pub fn boot(settings: &Settings, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = load_manager(settings)?;
    println!("Runlevel: {}", manager.runlevel());

    if dry_run {
        println!("\nWould start:");
        for obj in manager.plan(true)? {
            println!("  {:>5}  {}", obj.start_priority, obj.id);
        }
        return Ok(());
    }

    if let Some(banner) = settings.banner() {
        println!("\n{}", banner);
    }
    println!("\nStarting objects...");
    let summary = manager.run_all(true)?;
    println!(
        "\n{} started, {} with warnings, {} failed",
        summary.succeeded, summary.warned, summary.failed
    );

    if summary.outcome == Outcome::Failure {
        return Err("boot failed".into());
    }
    Ok(())
}
