//! Business Card Aggregate

pub mod entity;
pub mod repository;
pub mod api;

pub use entity::{ActionType, BusinessCard, CardAction, CardConfig, CardStats, QrPosition};
pub use repository::BusinessCardRepository;
pub use api::{business_cards_router, BusinessCardsState};
