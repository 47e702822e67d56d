pub mod analytics;
pub mod core;
pub mod courses;
pub mod enrollments;
pub mod results;
pub mod scale;
pub mod students;
