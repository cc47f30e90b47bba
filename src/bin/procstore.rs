use procstore::{ProcessStore, SchemaUpdateMode, StoreConfig};
use std::path::PathBuf;
use std::time::Duration;

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "schema" => match args.get(2).map(String::as_str) {
            Some("check") => cmd_schema_check(&args[3..]),
            Some("create") => cmd_schema_create(&args[3..]),
            Some("drop") => cmd_schema_drop(&args[3..]),
            Some("update") => cmd_schema_update(&args[3..]),
            Some("prune") => cmd_schema_prune(&args[3..]),
            Some("version") => cmd_schema_version(&args[3..]),
            Some(other) => Err(format!("unknown schema command: {other}")),
            None => Err("missing schema subcommand".into()),
        },
        "jobs" => match args.get(2).map(String::as_str) {
            Some("acquire") => cmd_jobs_acquire(&args[3..]),
            Some("release") => cmd_jobs_release(&args[3..]),
            Some(other) => Err(format!("unknown jobs command: {other}")),
            None => Err("missing jobs subcommand".into()),
        },
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

/// Opens the store without any startup schema work; each command drives the
/// schema manager itself.
fn open_store(args: &[String]) -> Result<ProcessStore, String> {
    let config = parse_config(args)?.with_schema_update(SchemaUpdateMode::None);
    ProcessStore::open(config).map_err(|e| format!("open store: {e}"))
}

fn cmd_schema_check(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    store.schema().check().map_err(|e| format!("check: {e}"))?;
    println!("ok\t{}", procstore::migration::current_version());
    Ok(())
}

fn cmd_schema_create(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    store.schema().create().map_err(|e| format!("create: {e}"))?;
    println!("ok\tcreated\t{}", procstore::migration::current_version());
    Ok(())
}

fn cmd_schema_drop(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    store.schema().drop_schema().map_err(|e| format!("drop: {e}"))?;
    println!("ok\tdropped");
    Ok(())
}

fn cmd_schema_update(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    match store.schema().update().map_err(|e| format!("update: {e}"))? {
        Some(feedback) => println!("ok\t{feedback}"),
        None => println!("ok\tup to date"),
    }
    Ok(())
}

fn cmd_schema_prune(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    store.schema().prune().map_err(|e| format!("prune: {e}"))?;
    println!("ok\tpruned");
    Ok(())
}

fn cmd_schema_version(args: &[String]) -> Result<(), String> {
    let store = open_store(args)?;
    let version = store
        .schema()
        .db_version()
        .map_err(|e| format!("version: {e}"))?;
    println!(
        "{}\t{}",
        version.as_deref().unwrap_or("absent"),
        procstore::migration::current_version()
    );
    Ok(())
}

fn cmd_jobs_acquire(args: &[String]) -> Result<(), String> {
    let owner = parse_flag_value(args, "--owner").ok_or("--owner is required")?;
    let max = match parse_flag_value(args, "--max") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|e| format!("invalid --max: {e}"))?,
        None => 1,
    };
    let lock_ms = match parse_flag_value(args, "--lock-ms") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| format!("invalid --lock-ms: {e}"))?,
        None => 300_000,
    };
    let store = open_store(args)?;
    let acquired = store
        .acquire_jobs(&owner, max, Duration::from_millis(lock_ms))
        .map_err(|e| format!("acquire: {e}"))?;
    for (batch, ids) in acquired.batches().iter().enumerate() {
        for id in ids {
            println!("{batch}\t{id}");
        }
    }
    println!("ok\t{}", acquired.len());
    Ok(())
}

fn cmd_jobs_release(args: &[String]) -> Result<(), String> {
    let owner = parse_flag_value(args, "--owner").ok_or("--owner is required")?;
    let store = open_store(args)?;
    let released = store
        .release_owned_jobs(&owner)
        .map_err(|e| format!("release: {e}"))?;
    println!("ok\t{released}");
    Ok(())
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_config(args: &[String]) -> Result<StoreConfig, String> {
    let db = parse_flag_value(args, "--db").ok_or("--db is required")?;
    let mut cfg = StoreConfig::new(PathBuf::from(db))
        .with_history(!has_flag(args, "--no-history"))
        .with_identity(!has_flag(args, "--no-identity"));
    if let Some(dir) = parse_flag_value(args, "--resources") {
        cfg = cfg.with_resource_dir(dir);
    }
    Ok(cfg)
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!(
        "  procstore schema check|create|drop|update|prune|version --db <file> [--no-history] [--no-identity] [--resources <dir>]"
    );
    eprintln!(
        "  procstore jobs acquire --db <file> --owner <lock-owner> [--max <n>] [--lock-ms <millis>]"
    );
    eprintln!("  procstore jobs release --db <file> --owner <lock-owner>");
}
