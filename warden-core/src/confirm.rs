//! Confirmation tokens for irreversible jail operations.
//!
//! `unban --all` drops every active ban at once. The controller only accepts it together with an
//! [`UnbanAllToken`], which can only be minted from an explicit operator confirmation.

use crate::errors::WardenError;
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
pub struct UnbanAllToken(());

impl UnbanAllToken {
    pub fn try_new(yes_i_know: bool) -> Result<Self> {
        if !yes_i_know {
            return Err(WardenError::MissingYesIKnow.into());
        }
        Ok(Self(()))
    }
}
