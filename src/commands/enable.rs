//! Edit object files on disk

use rlinit::objects::edit_object_value;
use rlinit::Settings;

pub fn enable(settings: &Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    set(settings, id, "Enabled", "true")?;
    println!("Enabled {}", id);
    Ok(())
}

pub fn disable(settings: &Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    set(settings, id, "Enabled", "false")?;
    println!("Disabled {}", id);
    Ok(())
}

/// Replace one attribute's value. The key must already be present.
pub fn set(
    settings: &Settings,
    id: &str,
    key: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    edit_object_value(&settings.objects_dir, id, key, value)?;
    Ok(())
}
