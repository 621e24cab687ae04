pub mod builder;
pub mod window;
