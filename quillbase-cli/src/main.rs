use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quillbase_core::{Collection, CollectionOptions, RemoveOptions};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "quillbase")]
#[command(about = "Quillbase CLI - query and maintain datafiles from the command line")]
#[command(version)]
struct Cli {
    /// Datafile path
    #[arg(long, global = true, default_value = "quillbase.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a JSON document
    Insert {
        /// Document as a JSON object
        doc: String,
    },
    /// Find documents matching a query
    Find {
        /// Query as a JSON object (defaults to everything)
        #[arg(default_value = "{}")]
        query: String,
        /// Maximum number of documents to print
        #[arg(long)]
        limit: Option<usize>,
        /// Number of matching documents to skip
        #[arg(long)]
        skip: Option<usize>,
        /// Sort spec, e.g. "age:-1" or "name"
        #[arg(long)]
        sort: Option<String>,
    },
    /// Count documents matching a query
    Count {
        #[arg(default_value = "{}")]
        query: String,
    },
    /// Remove documents matching a query
    Remove {
        query: String,
        /// Remove every match instead of the first
        #[arg(long)]
        multi: bool,
    },
    /// Import documents from a JSON file (an array of objects)
    Import {
        /// JSON file to import
        file: PathBuf,
    },
    /// Export every document to a JSON file
    Export {
        /// Output JSON file
        file: PathBuf,
    },
    /// Rewrite the datafile to its compacted form
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let collection = open_collection(&cli.db)?;

    match cli.command {
        Commands::Insert { doc } => insert(&collection, &doc),
        Commands::Find {
            query,
            limit,
            skip,
            sort,
        } => find(&collection, &query, limit, skip, sort.as_deref()),
        Commands::Count { query } => count(&collection, &query),
        Commands::Remove { query, multi } => remove(&collection, &query, multi),
        Commands::Import { file } => import(&collection, &file),
        Commands::Export { file } => export(&collection, &file),
        Commands::Compact => compact(&collection),
    }
}

fn open_collection(db: &Path) -> Result<Collection> {
    Collection::new(CollectionOptions::new(db.to_string_lossy().into_owned()))
        .with_context(|| format!("Failed to open datafile: {}", db.display()))
}

fn parse_json(label: &str, raw: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid JSON {}: {}", label, raw))?;
    if !value.is_object() {
        bail!("{} must be a JSON object", label);
    }
    Ok(value)
}

fn parse_sort(spec: &str) -> Result<Vec<(String, i32)>> {
    let mut sort = Vec::new();
    for part in spec.split(',') {
        let (field, direction) = match part.split_once(':') {
            Some((field, dir)) => {
                let direction: i32 = dir
                    .parse()
                    .with_context(|| format!("Invalid sort direction: {}", dir))?;
                (field, direction)
            }
            None => (part, 1),
        };
        if field.is_empty() {
            bail!("Empty field in sort spec: {}", spec);
        }
        sort.push((field.to_string(), direction));
    }
    Ok(sort)
}

fn insert(collection: &Collection, raw: &str) -> Result<()> {
    let doc = parse_json("document", raw)?;
    let inserted = collection.insert(doc).context("Insert failed")?;
    println!("{}", serde_json::to_string(&inserted)?);
    Ok(())
}

fn find(
    collection: &Collection,
    raw_query: &str,
    limit: Option<usize>,
    skip: Option<usize>,
    sort: Option<&str>,
) -> Result<()> {
    let query = parse_json("query", raw_query)?;
    let mut cursor = collection.find(query);
    if let Some(limit) = limit {
        cursor = cursor.limit(limit);
    }
    if let Some(skip) = skip {
        cursor = cursor.skip(skip);
    }
    if let Some(sort) = sort {
        cursor = cursor.sort(parse_sort(sort)?);
    }
    let docs = cursor.exec().context("Query failed")?;
    for doc in docs {
        println!("{}", serde_json::to_string(&doc)?);
    }
    Ok(())
}

fn count(collection: &Collection, raw_query: &str) -> Result<()> {
    let query = parse_json("query", raw_query)?;
    let n = collection.count(query).context("Count failed")?;
    println!("{}", n);
    Ok(())
}

fn remove(collection: &Collection, raw_query: &str, multi: bool) -> Result<()> {
    let query = parse_json("query", raw_query)?;
    let removed = collection
        .remove(query, RemoveOptions::new().with_multi(multi))
        .context("Remove failed")?;
    println!("Removed {} document(s)", removed);
    Ok(())
}

fn import(collection: &Collection, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let docs: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| format!("File must hold a JSON array of objects: {}", file.display()))?;

    let total = docs.len();
    let inserted = collection.insert_many(docs).context("Import failed")?;
    println!("Imported {} of {} document(s)", inserted.len(), total);
    Ok(())
}

fn export(collection: &Collection, file: &Path) -> Result<()> {
    let docs = collection.get_all_data().context("Export failed")?;
    let json = serde_json::to_string_pretty(&docs)?;
    fs::write(file, json).with_context(|| format!("Failed to write: {}", file.display()))?;
    println!("Exported {} document(s) to {}", docs.len(), file.display());
    Ok(())
}

fn compact(collection: &Collection) -> Result<()> {
    collection.compact_datafile().context("Compaction failed")?;
    println!("Datafile compacted");
    Ok(())
}
