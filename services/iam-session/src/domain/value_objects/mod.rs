mod username;

pub use username::*;
