//! Core types and utilities for searchbot.
//!
//! This crate provides the foundational types shared by the storage layer and
//! the operator tooling:
//!
//! - **Identifiers**: `TelegramId`, `SearchId`
//! - **Users**: `User`, `NewUser`, `AllowanceKind`
//! - **Searches**: `Search`, `NewSearch`
//! - **Payments**: `Payment`, `NewPayment`
//! - **Gift cards**: `GiftCardCode`, `GiftCard`, `GiftCardRedemption`, `RedemptionStats`
//!
//! # Search allowances
//!
//! Every user starts with one free search. Paid searches are granted by
//! payments in the in-platform currency or by redeeming a gift card, and are
//! only spent once the free allowance is exhausted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod gift_card;
pub mod ids;
pub mod payment;
pub mod search;
pub mod user;

pub use error::{CoreError, Result};
pub use gift_card::{
    default_batch_id, format_code, GiftCard, GiftCardCode, GiftCardRedemption, NewGiftCard,
    RedemptionStats, CODE_ALPHABET, CODE_LENGTH,
};
pub use ids::{IdError, SearchId, TelegramId};
pub use payment::{NewPayment, Payment};
pub use search::{NewSearch, Search};
pub use user::{AllowanceKind, NewUser, User, DEFAULT_FREE_SEARCHES, DEFAULT_PAID_SEARCHES};
