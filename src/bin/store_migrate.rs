use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storemigrator::{
    LoadedManifest, LockPolicy, MigrationEvent, Migrator, MigratorConfig, SchemaCatalog, SchemaVersion,
    load_manifest, storage::read_header,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "store-migrate")]
#[command(about = "Upgrade persisted stores to a newer schema version")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalog versions, oldest first
    Versions {
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Show the steps between two versions
    Plan {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Print a store's header
    Inspect {
        #[arg(long)]
        store: PathBuf,
    },
    /// Migrate a store in place
    Migrate {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long)]
        store: PathBuf,
        /// Target version; defaults to the newest catalog version
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        retain_backup: bool,
        /// Wait up to this many seconds for a concurrent run on the same store
        #[arg(long)]
        wait: Option<u64>,
        #[arg(long)]
        no_fsync: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Versions { catalog } => list_versions(&catalog),
        Command::Plan { catalog, from, to } => show_plan(&catalog, &from, &to),
        Command::Inspect { store } => inspect(&store),
        Command::Migrate {
            catalog,
            store,
            to,
            retain_backup,
            wait,
            no_fsync,
        } => {
            let lock_policy = match wait {
                Some(secs) => LockPolicy::Wait {
                    timeout: Some(Duration::from_secs(secs)),
                },
                None => LockPolicy::Reject,
            };
            let config = MigratorConfig::new()
                .lock_policy(lock_policy)
                .retain_backup(retain_backup)
                .sync_writes(!no_fsync);
            migrate(&catalog, &store, to.as_deref(), config)
        }
    }
}

fn load(catalog: &Path) -> Result<LoadedManifest> {
    load_manifest(catalog).with_context(|| format!("Failed to load catalog '{}'", catalog.display()))
}

fn list_versions(catalog: &Path) -> Result<()> {
    let loaded = load(catalog)?;
    for (position, version) in loaded.catalog.ordered_versions().iter().enumerate() {
        let schema = loaded.catalog.schema(version)?;
        println!("{:>4}  {}  ({} entities)", position, version, schema.entity_count());
    }
    Ok(())
}

fn show_plan(catalog: &Path, from: &str, to: &str) -> Result<()> {
    let loaded = load(catalog)?;
    let plan = storemigrator::plan(&loaded.catalog, &from.into(), &to.into())?;
    if plan.is_empty() {
        println!("'{}' is already at the target version", from);
        return Ok(());
    }

    println!("{} step(s) from '{}' to '{}':", plan.len(), plan.source(), plan.target());
    for (index, step) in plan.iter().enumerate() {
        println!("  {:>3}. {} -> {}", index, step.source_version, step.target_version);
    }
    Ok(())
}

fn inspect(store: &Path) -> Result<()> {
    let header = read_header(store).with_context(|| format!("Failed to read store '{}'", store.display()))?;
    println!("Store: {}", store.display());
    println!("Schema version: {}", header.schema_version);
    println!("Records: {}", header.record_count);
    for (entity, count) in &header.entity_counts {
        println!("  {}: {}", entity, count);
    }
    if let Some(written_at) = chrono::DateTime::from_timestamp_millis(header.written_at_unix_ms) {
        println!("Written at: {}", written_at.to_rfc3339());
    }
    Ok(())
}

fn migrate(catalog: &Path, store: &Path, to: Option<&str>, config: MigratorConfig) -> Result<()> {
    let loaded = load(catalog)?;
    let target = match to {
        Some(name) => SchemaVersion::new(name),
        None => loaded
            .catalog
            .latest()
            .cloned()
            .ok_or_else(|| anyhow!("Catalog '{}' has no versions", catalog.display()))?,
    };

    let migrator = Migrator::new(Arc::new(loaded.catalog))
        .with_mappings(Arc::new(loaded.mappings))
        .with_config(config)
        .with_observer(|event| {
            if let MigrationEvent::StepCompleted {
                index,
                source_version,
                target_version,
                record_count,
                ..
            } = event
            {
                println!("  step {}: {} -> {} ({} records)", index, source_version, target_version, record_count);
            }
        });

    let report = migrator
        .migrate(store, &target)
        .with_context(|| format!("Migration of '{}' to '{}' failed", store.display(), target))?;

    if report.is_noop() {
        println!("Store already at '{}'; nothing to do", report.target_version);
    } else {
        println!(
            "Migrated '{}' from '{}' to '{}' in {} step(s) ({:?})",
            report.store_path.display(),
            report.source_version,
            report.target_version,
            report.steps_executed,
            report.elapsed
        );
    }
    Ok(())
}
