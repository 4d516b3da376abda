pub mod auth;
pub mod factory;
pub mod resilient;
pub mod services;

pub use auth::ServiceTokenSigner;
pub use factory::ClientFactory;
pub use resilient::{CallOptions, ClientSettings, ResilientClient};
pub use services::{
    AudioIntelligenceClient, EmbeddingsClient, PdfParserClient, RecommenderClient, ServiceClient,
    ServiceId,
};
