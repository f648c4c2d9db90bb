//! Common types for WaPulse

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for contact groups (campaign audiences)
pub type AudienceId = Uuid;

/// Unique identifier for message templates
pub type TemplateId = Uuid;

/// Unique identifier for uploaded media
pub type MediaId = Uuid;

/// Identifier of the WhatsApp Business account that owns sends and reports
pub type OwnerId = String;

/// Credentials and identity for calls to the messaging provider.
///
/// Passed explicitly into every dispatch and poll call instead of being read
/// from ambient session state.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Business account the sends are billed to and reports are fetched for
    pub owner_id: OwnerId,
    /// Bearer token for the provider API
    pub access_token: String,
}

impl SessionContext {
    /// Create a new session context
    pub fn new(owner_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("owner_id", &self.owner_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}
