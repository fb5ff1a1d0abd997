//! Catalog domains, the partitions of the ATT&CK knowledge base.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A named partition of the knowledge base. Every stored row is keyed by one.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CatalogDomain {
  Enterprise,
  Mobile,
  Ics,
}

impl CatalogDomain {
  pub const ALL: [CatalogDomain; 3] = [Self::Enterprise, Self::Mobile, Self::Ics];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Enterprise => "enterprise",
      Self::Mobile => "mobile",
      Self::Ics => "ics",
    }
  }

  /// External-reference `source_name` values that carry this domain's short
  /// codes, most specific first.
  pub fn authority_tags(self) -> &'static [&'static str] {
    match self {
      Self::Enterprise => &["mitre-attack"],
      Self::Mobile => &["mitre-mobile-attack", "mitre-attack"],
      Self::Ics => &["mitre-ics-attack", "mitre-attack"],
    }
  }

  /// Kill-chain names whose phases map techniques onto this domain's tactics.
  ///
  /// Upstream uses the same strings for kill chains and external references.
  pub fn kill_chain_names(self) -> &'static [&'static str] { self.authority_tags() }
}

impl fmt::Display for CatalogDomain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for CatalogDomain {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "enterprise" | "enterprise-attack" => Ok(Self::Enterprise),
      "mobile" | "mobile-attack" => Ok(Self::Mobile),
      "ics" | "ics-attack" => Ok(Self::Ics),
      _ => Err(Error::UnknownDomain(s.to_owned())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_case_insensitively() {
    assert_eq!("Enterprise".parse::<CatalogDomain>().unwrap(), CatalogDomain::Enterprise);
    assert_eq!("ics-attack".parse::<CatalogDomain>().unwrap(), CatalogDomain::Ics);
  }

  #[test]
  fn unknown_domain_is_rejected() {
    let err = "pre-attack".parse::<CatalogDomain>().unwrap_err();
    assert!(matches!(err, Error::UnknownDomain(d) if d == "pre-attack"));
  }

  #[test]
  fn display_round_trips_through_from_str() {
    for d in CatalogDomain::ALL {
      assert_eq!(d.to_string().parse::<CatalogDomain>().unwrap(), d);
    }
  }
}
