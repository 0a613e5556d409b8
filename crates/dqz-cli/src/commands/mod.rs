pub mod account;
pub mod admin;
pub mod common;
pub mod payments;
pub mod quiz;
pub mod vip;
