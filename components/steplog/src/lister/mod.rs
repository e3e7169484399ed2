/// Newest-first run listing.
pub mod run_lister;
