use crate::support::{
    class_or_exit, decode_object_or_exit, load_document_or_exit, print_json_or_exit,
    read_json_file_or_exit,
};
use omap_kernel::{MappingError, Value};
use serde_json::json;
use tracing::debug;

pub struct Args {
    pub document: String,
    pub input: String,
    pub target: String,
    pub source: Option<String>,
    pub into: Option<String>,
    pub json: bool,
}

pub fn run(args: Args) {
    let compiled = load_document_or_exit(&args.document);
    let mapper = compiled.mapper();
    let target_ty = class_or_exit(&compiled, &args.target);

    let input_json: serde_json::Value = read_json_file_or_exit(&args.input, "input");
    let source = decode_object_or_exit(&compiled, args.source.as_deref(), &input_json, "input");

    let (mode, result) = match &args.into {
        Some(into_path) => {
            let into_json: serde_json::Value = read_json_file_or_exit(into_path, "target");
            let target =
                decode_object_or_exit(&compiled, Some(&args.target), &into_json, "target");
            let outcome = mapper.map_into(&source, &target).map(|()| target);
            ("explicit", outcome)
        }
        None => ("implicit", mapper.map(&source, target_ty)),
    };
    debug!(mode, target = args.target.as_str(), "mapped input");

    let mapped = result.unwrap_or_else(|err| {
        report_failure(&err);
        std::process::exit(1);
    });
    let encoded = compiled
        .encode(&Value::Object(mapped))
        .unwrap_or_else(|err| {
            eprintln!("error: failed to encode result: {err}");
            std::process::exit(1);
        });

    if args.json {
        let payload = json!({
            "schema": 1,
            "documentPath": args.document,
            "mode": mode,
            "target": args.target,
            "result": encoded,
        });
        print_json_or_exit(&payload, "map");
    } else {
        print_json_or_exit(&encoded, "map");
    }
}

fn report_failure(err: &MappingError) {
    eprintln!("error: {err}");
    let trail = err.entry_trail();
    for description in trail.iter().skip(1) {
        eprintln!("  while mapping {description}");
    }
    if !trail.is_empty() {
        eprintln!("  cause: {}", err.root_cause());
    }
}
