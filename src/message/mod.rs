pub(crate) mod current_message;
