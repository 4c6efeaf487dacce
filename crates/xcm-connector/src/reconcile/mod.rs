//! Ordered, partial-failure tolerant create-or-update of resource objects
//!
//! [`apply`] walks the objects strictly in the order given, because later
//! objects may live inside or reference earlier ones (a service account
//! inside a namespace, a Klusterlet after its CRD). A failed object does not
//! stop the batch; every failure is collected into one [`ApplyError`] so the
//! caller sees the whole picture.

mod client;
pub mod strategy;

pub use client::{KubeResourceClient, ResourceClient};

#[cfg(test)]
pub use client::MockResourceClient;

use std::fmt;

use tracing::{debug, info, warn};

use crate::resource::{ObjectKey, ResourceObject};
use crate::{Error, Result};

/// What happened to one object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The object did not exist and was created
    Created,
    /// The object existed and its spec changed
    Updated,
    /// The object already matched
    Unchanged,
    /// Kind outside the supported set
    Skipped,
}

/// Per-object outcomes of a successful [`apply`]
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Display name and outcome of each object, in apply order
    pub outcomes: Vec<(String, Outcome)>,
}

impl ApplyReport {
    /// Number of objects that ended with `outcome`
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    /// True when nothing was written
    pub fn is_noop(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| matches!(o, Outcome::Unchanged | Outcome::Skipped))
    }
}

/// One object that could not be applied
#[derive(Debug)]
pub struct ObjectFailure {
    /// Object that failed
    pub key: ObjectKey,
    /// Why it failed
    pub error: Error,
}

/// Aggregate of every per-object failure in a batch
#[derive(Debug)]
pub struct ApplyError {
    /// Each failed object with its error
    pub failures: Vec<ObjectFailure>,
    /// Objects that were applied before and after the failures
    pub applied: usize,
}

impl ApplyError {
    /// True when every failure is a 404: the target namespace, CRD or
    /// cluster is not there yet and the batch is worth retrying
    pub fn is_not_yet_available(&self) -> bool {
        !self.failures.is_empty() && self.failures.iter().all(|f| f.error.is_not_found())
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to apply {} object(s): [", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", failure.key, failure.error)?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for ApplyError {}

async fn apply_one(client: &dyn ResourceClient, desired: &ResourceObject) -> Result<Outcome> {
    let Some(key) = desired.key() else {
        warn!(object = %desired.describe(), "skipping object of unsupported kind");
        return Ok(Outcome::Skipped);
    };

    match client.get(&key).await? {
        None => {
            client.create(&strategy::for_create(desired)?).await?;
            Ok(Outcome::Created)
        }
        Some(existing) => match strategy::merge(desired, existing)? {
            Some(updated) => {
                client.update(&updated).await?;
                Ok(Outcome::Updated)
            }
            None => Ok(Outcome::Unchanged),
        },
    }
}

/// Create or update each object in order.
///
/// Partial application is expected: on failure the successfully applied
/// objects stay applied and the error lists every object that failed.
pub async fn apply(
    client: &dyn ResourceClient,
    objects: &[ResourceObject],
) -> std::result::Result<ApplyReport, ApplyError> {
    let mut report = ApplyReport::default();
    let mut failures = Vec::new();

    for object in objects {
        match apply_one(client, object).await {
            Ok(outcome) => {
                debug!(object = %object.describe(), ?outcome, "applied");
                report.outcomes.push((object.describe(), outcome));
            }
            Err(error) => {
                // key() is only None for skipped objects, which never fail
                if let Some(key) = object.key() {
                    debug!(object = %key, error = %error, "apply failed");
                    failures.push(ObjectFailure { key, error });
                }
            }
        }
    }

    if failures.is_empty() {
        info!(
            created = report.count(Outcome::Created),
            updated = report.count(Outcome::Updated),
            unchanged = report.count(Outcome::Unchanged),
            "applied {} object(s)",
            objects.len()
        );
        Ok(report)
    } else {
        Err(ApplyError {
            applied: report.outcomes.len(),
            failures,
        })
    }
}
