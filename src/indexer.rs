pub(crate) mod db;
pub(crate) mod deposits;
pub(crate) mod models;
pub(crate) mod types;
