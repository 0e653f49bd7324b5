mod tools;

pub use tools::EntityTools;
