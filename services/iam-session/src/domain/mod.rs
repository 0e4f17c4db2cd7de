pub mod repositories;
pub mod services;
pub mod session;
pub mod value_objects;
