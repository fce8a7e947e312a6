//! Validate the configuration

use rlinit::objects::load_objects;
use rlinit::{Registry, Settings};

pub fn check(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("Config directory: {}", settings.config_dir.display());
    println!("Objects directory: {}", settings.objects_dir.display());
    println!(
        "Runlevels: default={} rescue={}",
        settings.default_runlevel, settings.rescue_runlevel
    );

    let objects = load_objects(&settings.objects_dir)?;
    let registry = Registry::from_objects(objects)?;

    if !registry.has_runlevel_members(&settings.default_runlevel) {
        log::warn!(
            "Default runlevel {} has no enabled objects to start",
            settings.default_runlevel
        );
    }

    println!("{} objects OK", registry.len());
    Ok(())
}
