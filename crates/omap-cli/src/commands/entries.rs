use crate::support::{load_document_or_exit, print_json_or_exit};
use serde_json::json;

pub fn run(document: String, json_output: bool) {
    let compiled = load_document_or_exit(&document);
    let rules = compiled.rules();
    let rows = rules.rows();

    if json_output {
        let payload = json!({
            "schema": 1,
            "documentPath": document,
            "fingerprint": rules.fingerprint(),
            "entries": rows,
        });
        print_json_or_exit(&payload, "entries");
        return;
    }

    println!("omap entries {document}");
    println!("  Fingerprint: {}", rules.fingerprint());
    for row in &rows {
        println!("  {:>3}  {:<10} {}", row.index, row.kind, row.description);
    }
}
