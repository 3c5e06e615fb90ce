pub(crate) mod oracle;
pub(crate) mod token_list;
