pub mod cpp;
pub mod java;
pub mod javascript;
pub mod python;
