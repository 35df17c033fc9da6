//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions of every resource served by the
//! controller as a multi-document YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/all.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use composition_controller::crd::{Composite, Connection, Network, Provider};
use kube::core::CustomResourceExt;

fn main() -> Result<()> {
    let crds = [
        Provider::crd(),
        Network::crd(),
        Connection::crd(),
        Composite::crd(),
    ];

    for crd in &crds {
        let yaml = serde_yaml::to_string(crd).with_context(|| {
            format!(
                "Failed to serialize CRD {}",
                crd.metadata.name.as_deref().unwrap_or_default()
            )
        })?;
        println!("---");
        print!("{yaml}");
    }
    Ok(())
}
