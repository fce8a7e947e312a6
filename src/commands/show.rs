//! Show one object's definition

use rlinit::objects::load_registry;
use rlinit::Settings;

pub fn show(settings: &Settings, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = load_registry(&settings.objects_dir)?;
    let obj = registry
        .lookup(id)
        .ok_or_else(|| format!("Object not found: {}", id))?;

    let status_symbol = if obj.is_enabled() { "●" } else { "○" };
    println!("{} {} - {}", status_symbol, obj.id, obj.description);

    if let Some(cmd) = &obj.start_command {
        println!("      Start: {}", cmd);
    }
    if let Some(cmd) = &obj.prestart_command {
        println!("   Prestart: {}", cmd);
    }
    match &obj.stop_command {
        Some(cmd) => println!("       Stop: {}", cmd),
        None => println!("       Stop: ({})", obj.stop_mode.as_str()),
    }
    if let Some(sig) = obj.reload_signal {
        println!("     Reload: signal {}", sig);
    } else if let Some(cmd) = &obj.reload_command {
        println!("     Reload: {}", cmd);
    }
    if let Some(path) = &obj.pid_file {
        println!("    PIDFile: {}", path.display());
    }
    println!(
        " Priorities: start={} stop={}",
        obj.start_priority, obj.stop_priority
    );
    println!("  Runlevels: {}", obj.runlevels.join(" "));
    println!(
        "    Timeout: {}s, then {}",
        obj.stop_timeout.as_secs(),
        obj.term_signal
    );
    println!("    Options: {:?}", obj.options);
    if obj.exec.user_id != 0 || obj.exec.group_id != 0 {
        println!("   Identity: uid={} gid={}", obj.exec.user_id, obj.exec.group_id);
    }
    if let Some(dir) = &obj.exec.working_directory {
        println!("    WorkDir: {}", dir.display());
    }

    Ok(())
}
