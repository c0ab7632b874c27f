pub mod key_minifier;
pub mod property_filter;
pub mod prune;
pub mod truncate;
