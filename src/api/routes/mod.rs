//! API Routes
//!
//! Route handlers organized by functionality.

pub mod ai;
pub mod health;
