// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::JobDefinition;
use crate::errors::Result;
use crate::factory::JobFactory;
use crate::job::JobModel;

/// Load a job definition from a TOML file.
///
/// This only performs TOML deserialization; structural validation of the
/// task flow happens when the definition goes through the [`JobFactory`].
pub fn load_definition(path: impl AsRef<Path>) -> Result<JobDefinition> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let definition: JobDefinition = toml::from_str(&contents)?;
    debug!(
        path = %path.display(),
        job = %definition.job.name,
        tasks = definition.tasks.len(),
        "job definition loaded"
    );
    Ok(definition)
}

/// Load a job definition and turn it into a validated job.
pub fn load_and_build(
    path: impl AsRef<Path>,
    factory: &mut JobFactory,
    owner: &str,
) -> Result<JobModel> {
    let definition = load_definition(path)?;
    factory.create_job(&definition, owner)
}
