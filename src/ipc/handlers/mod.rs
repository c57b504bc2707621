pub mod classrooms;
pub mod core;
pub mod exams;
pub mod seating;
pub mod students;
