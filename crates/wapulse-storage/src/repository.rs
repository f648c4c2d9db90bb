//! Repository layer for data access

pub mod campaigns;
pub mod contacts;
pub mod media;
pub mod templates;

// Re-export concrete repository implementations with simple names
pub use campaigns::DbCampaignRepository as CampaignRepository;
pub use contacts::DbContactRepository as ContactRepository;
pub use media::DbMediaRepository as MediaRepository;
pub use templates::DbTemplateRepository as TemplateRepository;

// Re-export store traits
pub use campaigns::CampaignStore;
pub use contacts::ContactStore;
pub use media::MediaStore;
pub use templates::TemplateStore;
