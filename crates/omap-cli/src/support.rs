use omap_document::{CompiledDocument, TYPE_KEY};
use omap_kernel::{ObjectRef, TypeRef};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `--verbose` raises the omap crates to debug.
pub fn init_logging(verbose: bool) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("omap_kernel=debug,omap_document=debug,omap=debug")
    } else {
        EnvFilter::new("error")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

pub fn read_json_file_or_exit<T>(path: &str, label: &str) -> T
where
    T: serde::de::DeserializeOwned,
{
    let bytes = fs::read(path).unwrap_or_else(|e| {
        eprintln!("error: failed to read {label} at {path}: {e}");
        std::process::exit(1);
    });
    serde_json::from_slice::<T>(&bytes).unwrap_or_else(|e| {
        eprintln!("error: failed to parse {label} JSON at {path}: {e}");
        std::process::exit(1);
    })
}

pub fn load_document_or_exit(path: &str) -> CompiledDocument {
    CompiledDocument::load(Path::new(path)).unwrap_or_else(|e| {
        eprintln!("error: failed to load mapping document {path}: {e}");
        std::process::exit(1);
    })
}

pub fn class_or_exit(document: &CompiledDocument, name: &str) -> TypeRef {
    document.class(name).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    })
}

/// Decode an object of `declared` type, or of its own `"$type"` when no
/// declared type is given.
pub fn decode_object_or_exit(
    document: &CompiledDocument,
    declared: Option<&str>,
    json: &Value,
    label: &str,
) -> ObjectRef {
    let type_name = match declared {
        Some(name) => name,
        None => json.get(TYPE_KEY).and_then(Value::as_str).unwrap_or_else(|| {
            eprintln!("error: {label} has no \"{TYPE_KEY}\"; pass its type explicitly");
            std::process::exit(1);
        }),
    };
    let ty = class_or_exit(document, type_name);
    document.decode_object(ty, json).unwrap_or_else(|e| {
        eprintln!("error: failed to decode {label}: {e}");
        std::process::exit(1);
    })
}

pub fn print_json_or_exit(payload: &Value, label: &str) {
    let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|err| {
        eprintln!("error: failed to render {label} payload: {err}");
        std::process::exit(2);
    });
    println!("{rendered}");
}
