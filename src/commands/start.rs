//! Start or reload an object

use rlinit::Settings;

use super::{load_manager, outcome_result};

pub fn start(settings: &Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = load_manager(settings)?;
    let outcome = manager.start_object(id)?;

    if let Some(obj) = manager.get_object(id) {
        println!("● {} - {} (PID {})", obj.id, outcome, obj.current_pid());
    }
    outcome_result("start", outcome)
}

pub fn reload(settings: &Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = load_manager(settings)?;
    let outcome = manager.reload_object(id)?;
    outcome_result("reload", outcome)
}
