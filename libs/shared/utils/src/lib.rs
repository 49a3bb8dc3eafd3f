pub mod auth;
pub mod jwt;
pub mod test_utils;
