//! Prints the Colmeia OpenAPI document as JSON.
//!
//! Usage:
//!   cargo run -p colmeia-api --bin generate-openapi --features openapi > openapi.json

use colmeia_api::ApiDoc;

fn main() {
    match ApiDoc::to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize OpenAPI document: {}", e);
            std::process::exit(1);
        }
    }
}
