pub mod build;
pub mod cat;
