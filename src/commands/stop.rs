//! Stop an object

use rlinit::Settings;

use super::{load_manager, outcome_result};

pub fn stop(settings: &Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = load_manager(settings)?;
    let outcome = manager.stop_object(id)?;
    println!("○ {} - {}", id, outcome);
    outcome_result("stop", outcome)
}
