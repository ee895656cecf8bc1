pub mod appearance;
pub mod selector;
pub mod stylesheet;
