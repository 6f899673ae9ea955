/// Attendance marks
pub mod attendance;
/// Event posters
pub mod poster;
/// Registered users
pub mod user;

pub use attendance::*;
pub use poster::*;
pub use user::*;
