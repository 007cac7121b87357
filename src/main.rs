use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

use reloj_control::{
    enroll, record_manual, Action, AppConfig, Database, EmployeeStore, FingerprintDevice,
    Identity, Ledger, NotificationSink, RecordFilter, Role, ScanLoop, SimulatedDevice, Template,
};

fn data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn db_path() -> PathBuf {
    data_dir().join("reloj-control.db")
}

fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("scan");

    std::fs::create_dir_all(data_dir()).context("Failed to create data directory")?;

    let db = Database::open(&db_path())?;
    let store = EmployeeStore::new(db.clone());
    let ledger = Ledger::new(db);
    let config = AppConfig::load_or_default(&config_path())?;

    match command {
        "scan" => run_scan(&store, &ledger, &config, args.get(2)),
        "add" => run_add(&store, &args[2..]),
        "delete" => run_delete(&store, &args[2..]),
        "enroll" => run_enroll(&store, &config, &args[2..]),
        "manual" => run_manual(&store, &ledger, &args[2..]),
        "list" => run_list(&store),
        "records" => run_records(&ledger, args.get(2)),
        "export" => run_export(&ledger, &args[2..]),
        "report" => run_report(&ledger),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Sistema de Reloj Control v{}", reloj_control::VERSION);
    println!();
    println!("Usage: reloj-control <command>");
    println!();
    println!("  scan [ticks]          Run the verification loop (simulated sensor)");
    println!("  add <id> <name> <role>  Add an employee (Docente|Asistente|Administrador)");
    println!("  delete <id>           Remove an employee");
    println!("  enroll <id>           Capture and bind a fingerprint template");
    println!("  manual <id>           Record the next action without the sensor");
    println!("  list                  Show the roster");
    println!("  records [filter]      Show attendance records");
    println!("  export <path>         Export records to CSV");
    println!("  report                Print the attendance summary");
}

// ============================================================================
// CONSOLE SINK
// ============================================================================

struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn on_verified(&self, identity: &Identity, action: Action, timestamp: DateTime<Local>) {
        println!(
            "✓ {} | {} ({}) | {} a las {}",
            timestamp.format("%d.%m.%Y %H:%M:%S"),
            identity.display_name,
            identity.id,
            action.as_str(),
            timestamp.format("%H:%M:%S"),
        );
    }

    fn on_failed(&self, reason: &str, score: f64) {
        println!("✗ Verificación fallida: {} (similitud {:.1})", reason, score);
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_scan(
    store: &EmployeeStore,
    ledger: &Ledger,
    config: &AppConfig,
    ticks: Option<&String>,
) -> Result<()> {
    let ticks: u32 = match ticks {
        Some(raw) => raw.parse().context("ticks must be a number")?,
        None => 20,
    };

    // No hardware in this build: replay enrolled templates through the
    // simulated sensor so the full verify/append path runs end to end.
    let enrolled: Vec<Identity> = store
        .lookup_all()?
        .into_iter()
        .filter(|i| i.is_enrolled())
        .collect();

    let mut device = SimulatedDevice::new();
    for identity in &enrolled {
        if let Some(template) = &identity.template {
            device.push_finger(template.clone());
            device.push_empty();
        }
    }

    if enrolled.is_empty() {
        println!("Sin huellas registradas; el sensor simulado leerá vacío.");
    }
    if !device.device_ready() {
        bail!("Lector de huellas no disponible");
    }

    println!(
        "Escaneando... ({} ticks de {} ms, umbral {:.0})",
        ticks, config.tick_millis, config.match_threshold
    );

    let scan_config = config.scan_config();
    let tick_period = scan_config.tick;
    let mut scan = ScanLoop::new(store.clone(), ledger.clone(), scan_config);
    let sink = ConsoleSink;

    scan.start();
    for _ in 0..ticks {
        scan.tick(&mut device, &sink, Instant::now());
        std::thread::sleep(tick_period);
    }
    scan.stop();

    println!("Escaneo detenido. Registros totales: {}", ledger.count()?);
    Ok(())
}

fn run_add(store: &EmployeeStore, args: &[String]) -> Result<()> {
    let [id, name, role] = args else {
        bail!("Usage: reloj-control add <id> <name> <role>");
    };

    let role = Role::parse(role)
        .with_context(|| format!("Invalid role '{}' (Docente|Asistente|Administrador)", role))?;

    store.add(&Identity::new(id, name, role))?;
    println!("✓ Usuario agregado: {} ({})", name, id);
    Ok(())
}

fn run_delete(store: &EmployeeStore, args: &[String]) -> Result<()> {
    let [id] = args else {
        bail!("Usage: reloj-control delete <id>");
    };

    store.delete(id)?;
    println!("✓ Usuario eliminado: {}", id);
    Ok(())
}

fn run_enroll(store: &EmployeeStore, config: &AppConfig, args: &[String]) -> Result<()> {
    let [id] = args else {
        bail!("Usage: reloj-control enroll <id>");
    };

    // Simulated capture: a deterministic template derived from the id stands
    // in for the sensor read. A real reader plugs in behind
    // `FingerprintDevice` without touching this flow.
    let mut device = SimulatedDevice::new();
    device.push_finger(simulated_template_for(id));

    let timeout = config.scan_config().capture_timeout;
    let template = enroll(store, &mut device, id, timeout)?;

    println!("✓ Huella registrada para {} (ref {})", id, template.digest());
    Ok(())
}

fn run_manual(store: &EmployeeStore, ledger: &Ledger, args: &[String]) -> Result<()> {
    let [id] = args else {
        bail!("Usage: reloj-control manual <id>");
    };

    let event = record_manual(store, ledger, id)?;
    println!(
        "✓ {} registrado para {} a las {}",
        event.action.as_str(),
        event.display_name,
        event.time.format("%H:%M:%S"),
    );
    Ok(())
}

fn run_list(store: &EmployeeStore) -> Result<()> {
    let identities = store.lookup_all()?;
    println!("{:<16} {:<30} {:<14} Huella", "ID", "Nombre", "Rol");

    for identity in &identities {
        println!(
            "{:<16} {:<30} {:<14} {}",
            identity.id,
            identity.display_name,
            identity.role.as_str(),
            if identity.is_enrolled() { "sí" } else { "no" },
        );
    }

    println!("\nTotal: {}", identities.len());
    Ok(())
}

fn run_records(ledger: &Ledger, needle: Option<&String>) -> Result<()> {
    let filter = RecordFilter {
        needle: needle.cloned(),
        ..Default::default()
    };
    let events = ledger.filter(&filter)?;

    println!(
        "{:<16} {:<30} {:<12} {:<10} {:<10} Metodo",
        "RUT", "Nombre", "Fecha", "Hora", "Accion"
    );
    for event in &events {
        println!(
            "{:<16} {:<30} {:<12} {:<10} {:<10} {}",
            event.identity_id,
            event.display_name,
            event.date.format("%Y-%m-%d"),
            event.time.format("%H:%M:%S"),
            event.action.as_str(),
            event.method.as_str(),
        );
    }

    println!("\nTotal: {}", events.len());
    Ok(())
}

fn run_export(ledger: &Ledger, args: &[String]) -> Result<()> {
    let [path] = args else {
        bail!("Usage: reloj-control export <path>");
    };

    let written = ledger.export_csv(Path::new(path))?;
    println!("✓ {} registros exportados a {}", written, path);
    Ok(())
}

fn run_report(ledger: &Ledger) -> Result<()> {
    print!("{}", ledger.summary_report()?);
    Ok(())
}

/// Deterministic stand-in template for the simulated sensor.
fn simulated_template_for(id: &str) -> Template {
    let mut bytes = id.as_bytes().to_vec();
    if bytes.is_empty() {
        bytes.push(7);
    }
    while bytes.len() < 64 {
        let next = (bytes.len() as u8).wrapping_mul(31) ^ bytes[bytes.len() % id.len().max(1)];
        bytes.push(next);
    }
    Template::from_bytes(bytes)
}
