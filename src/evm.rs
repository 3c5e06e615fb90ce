pub(crate) mod client;
pub(crate) mod events;
#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod signer;
pub(crate) mod types;
pub(crate) mod units;
