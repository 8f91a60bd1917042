use crate::errors::WardenError;
use anyhow::Result;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Width of the `ip_or_cidr` column.
pub const MAX_ADDRESS_LEN: usize = 45;
pub const MAX_COMMENT_LEN: usize = 255;

/// One row of the `fail2ban_whitelist` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub id: i64,
    pub ip_or_cidr: String,
    pub comment: Option<String>,
    /// Attribution only.
    pub created_by: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWhitelistEntry {
    pub ip_or_cidr: String,
    pub comment: Option<String>,
    pub created_by: Option<String>,
}

impl NewWhitelistEntry {
    /// Validate and normalize user input (trimmed address, empty comment -> None).
    pub fn new(
        ip_or_cidr: &str,
        comment: Option<&str>,
        created_by: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            ip_or_cidr: validate_ip_or_cidr(ip_or_cidr)?,
            comment: normalize_comment(comment)?,
            created_by: created_by.map(str::to_string),
        })
    }
}

/// Accept a bare IPv4/IPv6 address or a CIDR block.
pub fn validate_ip_or_cidr(input: &str) -> Result<String> {
    let value = input.trim();
    if value.is_empty() || value.len() > MAX_ADDRESS_LEN {
        return Err(WardenError::InvalidAddress(value.to_string()).into());
    }
    let valid = if value.contains('/') {
        value.parse::<IpNet>().is_ok()
    } else {
        value.parse::<IpAddr>().is_ok()
    };
    if !valid {
        return Err(WardenError::InvalidAddress(value.to_string()).into());
    }
    Ok(value.to_string())
}

pub fn normalize_comment(comment: Option<&str>) -> Result<Option<String>> {
    let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(WardenError::ValidationFailed(format!(
            "comment longer than {} characters",
            MAX_COMMENT_LEN
        ))
        .into());
    }
    Ok(Some(comment.to_string()))
}
