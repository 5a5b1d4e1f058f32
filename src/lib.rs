pub mod isa;
pub mod loader;
pub mod machine;
pub mod mem;
