use crate::support::print_json_or_exit;
use omap_document::{CompiledDocument, DocumentError};
use omap_kernel::ConfigIssue;
use serde_json::json;
use std::path::Path;

const CHECK_KIND: &str = "omap.check.v1";

pub fn run(document: String, json_output: bool) {
    let (accepted, payload) = match CompiledDocument::load(Path::new(&document)) {
        Ok(compiled) => {
            let rules = compiled.rules();
            let payload = json!({
                "schema": 1,
                "checkKind": CHECK_KIND,
                "documentPath": document,
                "result": "accepted",
                "entryCount": rules.len(),
                "fingerprint": rules.fingerprint(),
                "issues": Vec::<ConfigIssue>::new(),
            });
            (true, payload)
        }
        Err(DocumentError::Config(config)) => {
            let payload = json!({
                "schema": 1,
                "checkKind": CHECK_KIND,
                "documentPath": document,
                "result": "rejected",
                "entryCount": 0,
                "fingerprint": null,
                "issues": config.issues(),
            });
            (false, payload)
        }
        Err(other) => {
            eprintln!("error: failed to load mapping document {document}: {other}");
            std::process::exit(1);
        }
    };

    if json_output {
        print_json_or_exit(&payload, "check");
    } else {
        println!("omap check {document}");
        println!("  Result: {}", payload["result"].as_str().unwrap_or_default());
        println!("  Entries: {}", payload["entryCount"]);
        if let Some(fingerprint) = payload["fingerprint"].as_str() {
            println!("  Fingerprint: {fingerprint}");
        }
        if let Some(issues) = payload["issues"].as_array()
            && !issues.is_empty()
        {
            println!("  Issues ({}):", issues.len());
            for issue in issues {
                println!(
                    "    - [{}] {}",
                    issue["kind"].as_str().unwrap_or_default(),
                    issue["message"].as_str().unwrap_or_default()
                );
            }
        }
    }

    if !accepted {
        std::process::exit(1);
    }
}
