use crate::whatsapp::WhatsAppError;
use thiserror::Error;
use wapulse_common::types::{CampaignId, MediaId, TemplateId};
use wapulse_storage::models::CampaignStatus;

/// Campaign lifecycle errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("Template not found: {0}")]
    TemplateNotFound(TemplateId),

    #[error("Media not found: {0}")]
    MediaNotFound(MediaId),

    #[error("Cannot move campaign from {from} to {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("Campaign {0} is already being processed")]
    AlreadyRunning(CampaignId),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] wapulse_common::Error),

    #[error("Report feed error: {0}")]
    Feed(#[from] WhatsAppError),
}

impl From<CampaignError> for wapulse_common::Error {
    fn from(err: CampaignError) -> Self {
        match err {
            CampaignError::NotFound(_)
            | CampaignError::TemplateNotFound(_)
            | CampaignError::MediaNotFound(_) => wapulse_common::Error::NotFound(err.to_string()),
            CampaignError::InvalidTransition { .. } | CampaignError::AlreadyRunning(_) => {
                wapulse_common::Error::InvalidState(err.to_string())
            }
            CampaignError::Validation(msg) => wapulse_common::Error::Validation(msg),
            CampaignError::Store(inner) => inner,
            CampaignError::Feed(_) => wapulse_common::Error::Upstream(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_http_statuses() {
        let id = uuid::Uuid::new_v4();
        let not_found: wapulse_common::Error = CampaignError::NotFound(id).into();
        assert_eq!(not_found.status_code(), 404);

        let conflict: wapulse_common::Error = CampaignError::InvalidTransition {
            from: CampaignStatus::Sent,
            to: CampaignStatus::Scheduled,
        }
        .into();
        assert_eq!(conflict.status_code(), 409);
        assert!(conflict.to_string().contains("from sent to scheduled"));

        let feed: wapulse_common::Error =
            CampaignError::Feed(WhatsAppError::Malformed("eof".into())).into();
        assert_eq!(feed.status_code(), 502);
    }
}
