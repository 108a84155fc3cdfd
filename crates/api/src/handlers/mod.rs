pub mod push;
pub mod rules;
