//! Preference-ordered delivery of exported bytes.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::ExportError;

/// A sink the exported document can be handed to.
///
/// Targets sit in a preference-ordered chain; when one refuses the
/// bytes the next is tried, so a fancy destination can always degrade
/// to a plain file write.
pub trait DeliveryTarget {
    fn name(&self) -> &str;
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<(), String>;
}

/// Default target: write the document into a directory.
pub struct FileTarget {
    directory: PathBuf,
}

impl FileTarget {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl DeliveryTarget for FileTarget {
    fn name(&self) -> &str {
        "file"
    }

    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<(), String> {
        fs::write(self.directory.join(filename), bytes).map_err(|error| error.to_string())
    }
}

/// Try each target in order, returning the name of the first one that
/// accepted the bytes. Per-target failures are logged and fall through.
pub fn deliver_with_fallback(
    targets: &mut [Box<dyn DeliveryTarget>],
    filename: &str,
    bytes: &[u8],
) -> Result<String, ExportError> {
    for target in targets.iter_mut() {
        match target.deliver(filename, bytes) {
            Ok(()) => return Ok(target.name().to_owned()),
            Err(reason) => {
                warn!(sink = target.name(), %reason, "delivery target failed, falling through");
            }
        }
    }
    Err(ExportError::AllTargetsFailed)
}
