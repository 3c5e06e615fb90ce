pub(crate) mod confirm;
pub(crate) mod dispatch;
pub(crate) mod errors;
pub(crate) mod evaluator;
pub(crate) mod policy;
