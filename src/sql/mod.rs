pub mod ast;
pub mod catalog;
pub mod compiler;

pub use catalog::Catalog;
pub use compiler::QueryCompiler;
