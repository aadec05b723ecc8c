//! Prints the CustomResourceDefinitions as a multi-document YAML stream.

use crds::{NodeOverlayIp, StaticRoute};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [NodeOverlayIp::crd(), StaticRoute::crd()] {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
