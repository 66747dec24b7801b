use anyhow::{bail, Context, Result};
use labels_engine::bulk::BulkEditor;
use labels_engine::config::Config;
use labels_engine::store::LabelStore;
use std::sync::Arc;
use tracing::info;

fn print_usage() {
    println!(
        r#"
Export or import the label table as CSV

USAGE:
    labels-csv <COMMAND> <FILE>

COMMANDS:
    export <out.csv>   Write every label with one column per configured language
    import <in.csv>    Replace the whole table with the contents of the file

The CSV header is `label,<lang>,...`, e.g. `label,en,nl`. Storage is chosen
with the same environment variables as the server (LABELS_STORAGE,
LABELS_FILE, DATABASE_URL, LABELS_LANGUAGES).

EXAMPLES:
    labels-csv export labels.csv
    LABELS_LANGUAGES=en,nl labels-csv import labels.csv
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("labels_engine=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let command = &args[1];
    if matches!(command.as_str(), "--help" | "-h" | "help") {
        print_usage();
        return Ok(());
    }

    let Some(file) = args.get(2) else {
        eprintln!("Missing <FILE> argument");
        print_usage();
        std::process::exit(1);
    };

    let config = Config::from_env()?;
    let store = Arc::new(
        LabelStore::open(&config)
            .await
            .context("Failed to open label storage")?,
    );

    let loaded = store.load().await;
    if let Some(warning) = &loaded.warning {
        bail!("Label storage is unusable: {}", warning);
    }

    let editor = BulkEditor::new(store);

    match command.as_str() {
        "export" => {
            let csv = editor.export_csv().await?;
            std::fs::write(file, &csv).with_context(|| format!("Failed to write {}", file))?;
            info!("✓ Exported {} labels to {}", loaded.table.len(), file);
            Ok(())
        }
        "import" => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file))?;
            let count = editor.import_csv(&text).await?;
            info!("✓ Imported {} labels from {}", count, file);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}
