//! List objects

use rlinit::objects::load_registry;
use rlinit::Settings;

pub fn list(settings: &Settings, runlevel: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(&settings.objects_dir)?;

    println!(
        "{:<20} {:<8} {:>5} {:>5}  {:<20} DESCRIPTION",
        "OBJECT", "ENABLED", "START", "STOP", "RUNLEVELS"
    );

    let mut count = 0;
    for obj in registry.iter() {
        if let Some(rl) = runlevel {
            if !obj.in_runlevel(rl) {
                continue;
            }
        }

        let desc: String = obj.description.chars().take(40).collect();
        println!(
            "{:<20} {:<8} {:>5} {:>5}  {:<20} {}",
            obj.id,
            if obj.is_enabled() { "yes" } else { "no" },
            obj.start_priority,
            obj.stop_priority,
            obj.runlevels.join(","),
            desc
        );
        count += 1;
    }

    println!();
    println!("{} objects listed", count);
    Ok(())
}
