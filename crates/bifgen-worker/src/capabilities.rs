//! Parse the accelerator spec into pool capabilities.
//!
//! The spec is a comma-separated list of `kind[:device]` entries, e.g.
//! `cuda` or `vaapi:/dev/dri/renderD128,vaapi:/dev/dri/renderD129`.
//! An empty spec means software decoding only.

use bifgen_models::{AccelKind, Capability};

use crate::error::{WorkerError, WorkerResult};

pub fn parse_accel_spec(spec: &str) -> WorkerResult<Vec<Capability>> {
    let mut capabilities = Vec::new();

    for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, device) = match entry.split_once(':') {
            Some((name, device)) => (name, Some(device)),
            None => (entry, None),
        };

        let kind = match name.to_ascii_lowercase().as_str() {
            "cuda" | "nvidia" => AccelKind::Cuda,
            "vaapi" => AccelKind::Vaapi,
            "videotoolbox" => AccelKind::VideoToolbox,
            "d3d11va" => AccelKind::D3d11va,
            other => return Err(WorkerError::UnknownAccel(other.to_string())),
        };

        capabilities.push(Capability::accelerated(kind, device.map(Into::into)));
    }

    Ok(capabilities)
}
