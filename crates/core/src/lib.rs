pub mod config;
pub mod domain;
pub mod errors;

pub use domain::commerce::{
    CustomerId, CustomerOrders, OrderId, OrderLineItem, OrderSummary, ProductHit,
    ProductSearchResult, SearchPagination,
};
pub use domain::intent::{Classification, DetectionMethod, IntentKind};
pub use domain::knowledge::{KnowledgeBase, KnowledgeBaseEntry, PolicyId};
pub use domain::profile::{AssistantProfile, Identity, IntentBehavior};
pub use errors::{ApplicationError, DomainError, InterfaceError};
