//! Helpers for STIX object identifiers (`<type-prefix>--<uuid>`).
//!
//! Identifiers are owned by the upstream catalog and are stored verbatim; these
//! helpers only inspect them.

use uuid::Uuid;

use crate::{Error, Result};

pub const ATTACK_PATTERN: &str = "attack-pattern";
pub const INTRUSION_SET: &str = "intrusion-set";
pub const MALWARE: &str = "malware";
pub const TOOL: &str = "tool";
pub const COURSE_OF_ACTION: &str = "course-of-action";
pub const DATA_COMPONENT: &str = "x-mitre-data-component";

/// The type prefix of `id`, or `None` if it has no `--` separator.
pub fn type_prefix(id: &str) -> Option<&str> {
  id.split_once("--").map(|(prefix, _)| prefix)
}

/// Split `id` into its type prefix and UUID, validating both.
pub fn split(id: &str) -> Result<(&str, Uuid)> {
  let (prefix, rest) = id
    .split_once("--")
    .ok_or_else(|| Error::InvalidObjectId(id.to_owned()))?;
  if prefix.is_empty() {
    return Err(Error::InvalidObjectId(id.to_owned()));
  }
  let uuid = Uuid::parse_str(rest).map_err(|_| Error::InvalidObjectId(id.to_owned()))?;
  Ok((prefix, uuid))
}
