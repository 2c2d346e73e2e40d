pub mod admin;
pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod event;
pub mod mongodb;
pub mod password;
pub mod results;
pub mod voter;
