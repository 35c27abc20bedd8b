pub mod backup;
pub mod calc;
pub mod core;
pub mod grades;
pub mod settings;
pub mod subjects;
