use std::path::PathBuf;
use std::process;

use clap::Parser;
use indexcat_core::types::Oid;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod executor;
mod loader;

use commands::Command;
use display::OutputMode;

/// indexcat console: build an index catalog from table definitions and
/// report on its descriptors.
#[derive(Parser, Debug)]
#[command(name = "indexcat-console", version)]
struct Cli {
    /// JSON file holding an array of table definitions.
    #[arg(short, long)]
    tables: PathBuf,

    /// JSON file with catalog tunables (max_tuple_size, max_align).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drop the table with this reloid after loading (can be repeated).
    #[arg(short, long = "drop")]
    drop: Vec<Oid>,

    /// Reclaim the records of dropped tables before running the command.
    #[arg(long)]
    vacuum: bool,

    /// Output results as machine-parseable JSON.
    #[arg(short, long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    process::exit(run(&cli));
}

/// Load the catalog and run the command.
///
/// Returns exit code: 0 = success, 1 = load or command error.
fn run(cli: &Cli) -> i32 {
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Pretty
    };

    let catalog = match loader::load_catalog(
        &cli.tables,
        cli.config.as_deref(),
        &cli.drop,
        cli.vacuum,
    ) {
        Ok(catalog) => catalog,
        Err(e) => {
            display::render_error(&e, &mode);
            return 1;
        }
    };

    match executor::execute(&catalog, &cli.command) {
        Ok(result) => {
            display::render(&result, &mode);
            0
        }
        Err(e) => {
            display::render_error(&e, &mode);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexcat_core::builtin::{INT4_BTREE_OPS, INT4_OID, TEXT_BTREE_OPS, TEXT_OID};
    use indexcat_core::schema::{Table, TableField, TableIndex, TableIndexField};
    use indexcat_core::types::{AttNum, IndexKind, RelOids};

    fn write_tables(dir: &tempfile::TempDir) -> PathBuf {
        let table = Table::new(
            RelOids::new(1, 100, 100),
            RelOids::new(1, 101, 101),
            vec![
                TableField::new("id", INT4_OID).not_null(),
                TableField::new("val", TEXT_OID),
            ],
        )
        .with_index(TableIndex::new(
            RelOids::new(1, 102, 102),
            IndexKind::Primary,
            "t_pkey",
            vec![TableIndexField::new(AttNum::User(0), INT4_BTREE_OPS)],
        ))
        .with_index(TableIndex::new(
            RelOids::new(1, 103, 103),
            IndexKind::Unique,
            "t_val_key",
            vec![TableIndexField::new(AttNum::User(1), TEXT_BTREE_OPS)],
        ));
        let path = dir.path().join("tables.json");
        std::fs::write(&path, serde_json::to_string(&[table]).unwrap()).unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bin").chain(args.iter().copied())).unwrap()
    }

    // ---- Cli parsing tests ----

    #[test]
    fn test_cli_oids() {
        let cli = cli(&["--tables", "t.json", "oids"]);
        assert_eq!(cli.tables, PathBuf::from("t.json"));
        assert!(cli.config.is_none());
        assert!(cli.drop.is_empty());
        assert!(!cli.vacuum);
        assert!(!cli.json);
        assert_eq!(cli.command, Command::Oids);
    }

    #[test]
    fn test_cli_describe() {
        let cli = cli(&["-t", "t.json", "-j", "describe", "1", "100", "100", "primary"]);
        assert!(cli.json);
        assert_eq!(
            cli.command,
            Command::Describe {
                datoid: 1,
                reloid: 100,
                relnode: 100,
                kind: "primary".to_string(),
            }
        );
    }

    #[test]
    fn test_cli_drop_multiple() {
        let cli = cli(&["-t", "t.json", "--drop", "100", "-d", "200", "rows"]);
        assert_eq!(cli.drop, vec![100, 200]);
        assert_eq!(cli.command, Command::Rows);
    }

    #[test]
    fn test_cli_config() {
        let cli = cli(&["-t", "t.json", "--config", "c.json", "rows"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
    }

    #[test]
    fn test_cli_missing_tables() {
        assert!(Cli::try_parse_from(["bin", "oids"]).is_err());
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["bin", "--tables", "t.json"]).is_err());
    }

    #[test]
    fn test_cli_describe_bad_oid() {
        let result = Cli::try_parse_from(["bin", "-t", "t.json", "describe", "1", "x", "2", "toast"]);
        assert!(result.is_err());
    }

    // ---- run integration tests ----

    #[test]
    fn test_run_oids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tables(&dir);
        let path = path.to_str().unwrap();
        assert_eq!(run(&cli(&["-t", path, "oids"])), 0);
        assert_eq!(run(&cli(&["-t", path, "--json", "oids"])), 0);
    }

    #[test]
    fn test_run_describe() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tables(&dir);
        let path = path.to_str().unwrap();
        assert_eq!(run(&cli(&["-t", path, "describe", "1", "103", "103", "unique"])), 0);
        assert_eq!(run(&cli(&["-t", path, "describe", "1", "103", "103", "regular"])), 1);
        assert_eq!(run(&cli(&["-t", path, "describe", "1", "103", "103", "bogus"])), 1);
    }

    #[test]
    fn test_run_rows_with_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tables(&dir);
        let path = path.to_str().unwrap();
        assert_eq!(run(&cli(&["-t", path, "--drop", "100", "-j", "rows"])), 0);
        assert_eq!(run(&cli(&["-t", path, "--drop", "100", "--vacuum", "rows"])), 0);
        assert_eq!(run(&cli(&["-t", path, "--drop", "999", "rows"])), 1);
    }

    #[test]
    fn test_run_missing_tables_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(run(&cli(&["-t", path.to_str().unwrap(), "oids"])), 1);
    }

    #[test]
    fn test_run_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tables(&dir);
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"max_tuple_size": 128, "max_align": 8}"#).unwrap();
        let args = [
            "-t",
            path.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
            "oids",
        ];
        assert_eq!(run(&cli(&args)), 0);

        std::fs::write(&config, r#"{"max_align": 3}"#).unwrap();
        assert_eq!(run(&cli(&args)), 1);
    }
}
