use anyhow::Result;
use tempfile::{tempdir, TempDir};

use crate::{instance::Instance, tuple::Tuple};

/// Opens a fresh two-space instance. Keep the returned directory alive for
/// as long as the instance is used.
pub fn setup_test_instance() -> Result<(TempDir, Instance)> {
    let dir = tempdir()?;
    let data_dir = dir.path().join("data");
    let instance = Instance::new(data_dir.to_str().unwrap(), true, 2)?;
    Ok((dir, instance))
}

pub fn tuple(fields: &[&str]) -> Tuple {
    Tuple::from(
        fields
            .iter()
            .map(|f| f.as_bytes().to_vec())
            .collect::<Vec<_>>(),
    )
}
