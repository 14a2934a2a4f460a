// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource naming convention and SQL identifier sanitizing.
//!
//! Every container and network the control plane creates carries [`PREFIX`].
//! Listing, reconciliation and cleanup only ever look at prefixed resources,
//! so unrelated containers on the same host are never touched.

use std::fmt;

use crate::error::{Error, Result};

/// Prefix applied to every owned container and network name.
pub const PREFIX: &str = "netpart-";

/// Longest accepted bare instance name.
pub const MAX_BARE_NAME_LEN: usize = 48;

/// PostgreSQL truncates identifiers beyond this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Label attached to every owned resource.
pub const MANAGED_LABEL: &str = "netpart.managed=true";

/// Apply the naming convention to a bare name.
pub fn owned_name(bare: &str) -> String {
    format!("{}{}", PREFIX, bare)
}

/// Whether a runtime resource name belongs to this control plane.
pub fn is_owned(name: &str) -> bool {
    name.len() > PREFIX.len() && name.starts_with(PREFIX)
}

/// Strip the prefix from an owned name.
pub fn bare_name(name: &str) -> &str {
    name.strip_prefix(PREFIX).unwrap_or(name)
}

/// Validate a bare instance name.
///
/// Names become container names, network names and DNS hosts inside the
/// instance networks, and map one-to-one onto subscription identifiers, so
/// only `[a-z0-9-]` is accepted and the first character must be a letter or
/// digit.
pub fn validate_bare_name(bare: &str) -> Result<()> {
    if bare.is_empty() {
        return Err(Error::InvalidName("instance name must not be empty".to_string()));
    }
    if bare.len() > MAX_BARE_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "instance name is longer than {} characters",
            MAX_BARE_NAME_LEN
        )));
    }
    if !bare.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(Error::InvalidName(format!(
            "instance name {:?} must start with a letter or digit",
            bare
        )));
    }
    if let Some(bad) = bare
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(Error::InvalidName(format!(
            "instance name {:?} contains invalid character {:?}",
            bare, bad
        )));
    }
    Ok(())
}

/// Normalize a caller-supplied name (bare or prefixed) into an owned name.
pub fn resolve_name(name: &str) -> Result<String> {
    let bare = bare_name(name);
    validate_bare_name(bare)?;
    Ok(owned_name(bare))
}

/// A SQL identifier that passed the allow-list and is safe to interpolate
/// into DDL, which cannot take bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlIdentifier(String);

impl SqlIdentifier {
    /// Normalize `raw` (`-` becomes `_`) and check it against
    /// `[a-z_][a-z0-9_]{0,62}`. No case folding: an uppercase character is
    /// rejected rather than merged with its lowercase twin.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .map(|c| if c == '-' { '_' } else { c })
            .collect();

        if normalized.is_empty() || normalized.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::InvalidName(format!(
                "identifier {:?} must be 1 to {} bytes",
                raw, MAX_IDENTIFIER_LEN
            )));
        }
        if normalized.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::InvalidName(format!(
                "identifier {:?} must not start with a digit",
                raw
            )));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(Error::InvalidName(format!(
                "identifier {:?} contains characters outside [a-z0-9_]",
                raw
            )));
        }

        Ok(Self(normalized))
    }

    /// Subscription name for a standby instance.
    pub fn subscription_for(instance_name: &str) -> Result<Self> {
        Self::parse(&format!("sub_{}", instance_name))
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}
