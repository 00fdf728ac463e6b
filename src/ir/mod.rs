pub mod binding;
pub mod build;
pub mod kind;
pub mod node;
pub mod printer;
pub mod site;
pub mod types;
pub mod visitor;
