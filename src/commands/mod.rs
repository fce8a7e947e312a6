mod boot;
mod check;
mod enable;
mod list;
mod show;
mod start;
mod stop;

pub use boot::boot;
pub use check::check;
pub use enable::{disable, enable, set};
pub use list::list;
pub use show::show;
pub use start::{reload, start};
pub use stop::stop;

use rlinit::objects::load_registry;
use rlinit::{ConsoleReporter, Manager, Outcome, Settings};

/// Local manager over the configured object table
fn load_manager(settings: &Settings) -> Result<Manager, Box<dyn std::error::Error>> {
    let registry = load_registry(&settings.objects_dir)?;
    Ok(Manager::new(
        registry,
        settings.exec_context(),
        Box::new(ConsoleReporter),
    ))
}

/// Map an outcome to the tool's result
fn outcome_result(what: &str, outcome: Outcome) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        Outcome::Failure => Err(format!("{} failed", what).into()),
        _ => Ok(()),
    }
}
