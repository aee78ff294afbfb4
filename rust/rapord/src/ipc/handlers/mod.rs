pub mod backup;
pub mod categories;
pub mod core;
pub mod rapor;
pub mod scores;
pub mod session;
pub mod settings;
pub mod setup;
pub mod students;
pub mod subjects;
